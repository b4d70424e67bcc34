//! # Ingestion
//!
//! Report ingestion module.
//!
//! Responsibilities:
//! - Read reports from external producers (`ReportProducer`)
//! - Forward them through an ordered, first-match report filter
//! - Start the end-of-stream cascade when a producer is exhausted
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{ChannelProducer, PullerActor, ReportFilter, ReportPredicate};
//!
//! let (producer, tx) = ChannelProducer::new("feed", 64);
//! let filter = ReportFilter::new().filter(ReportPredicate::always(), dispatcher_ref);
//! let puller = PullerActor::new("puller", Box::new(producer), filter);
//! let handle = contracts::spawn_actor(puller, cell, Some(supervisor_ref));
//! ```

mod config;
mod error;
mod filter;
mod producers;
mod puller;

// Re-exports
pub use config::{PullerMetrics, PullerMetricsSnapshot};
pub use error::{IngestionError, Result};
pub use filter::{ReportFilter, ReportPredicate};
pub use producers::{
    create_producer, ChannelProducer, JsonLinesProducer, SyntheticConfig, SyntheticProducer,
};
pub use puller::PullerActor;
