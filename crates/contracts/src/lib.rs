//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Actor Model
//! - Every actor owns a bounded FIFO mailbox and runs on its own task
//! - Actors talk only through [`Message`]s sent to an [`ActorRef`]
//! - Shutdown is an end-of-stream cascade, see [`EndMessage`]

mod actor;
mod actor_name;
mod blueprint;
mod database;
mod error;
mod processor;
mod producer;
mod report;
mod runtime;

pub use actor::*;
pub use actor_name::ActorName;
pub use blueprint::*;
pub use database::*;
pub use error::*;
pub use processor::Processor;
pub use producer::ReportProducer;
pub use report::*;
pub use runtime::*;
