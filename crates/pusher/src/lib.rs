//! # Pusher
//!
//! Report persistence module.
//!
//! Responsibilities:
//! - Persist formula results through a `ReportDatabase`
//! - Apply the configured save-failure policy, never crash on a single failure
//! - Acknowledge end-of-stream to the supervisor, then flush and close

pub mod backends;
pub mod error;
pub mod metrics;
pub mod pusher;

pub use backends::{create_database, Backend, JsonLinesDatabase, LogDatabase, MemoryDatabase, MemoryStore};
pub use contracts::{ReportDatabase, SaveFailurePolicy};
pub use error::PusherError;
pub use metrics::{PusherMetrics, PusherMetricsSnapshot};
pub use pusher::PusherActor;
