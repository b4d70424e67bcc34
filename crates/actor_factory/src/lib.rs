//! # Actor Factory
//!
//! Pipeline assembly module.
//!
//! Responsibilities:
//! - Launch pushers, dispatcher, processors and pullers from a `PipelineBlueprint`
//! - Rebind pullers to pre-processors (`PreProcessorBindingManager`)
//! - Supervise the running actors, drain and tear them down
//! - Roll back everything launched when a step fails

pub mod binding;
pub mod error;
pub mod factory;
pub mod processor;
pub mod supervisor;

pub use binding::PreProcessorBindingManager;
pub use error::{ActorFactoryError, Result};
pub use factory::{ActorFactory, Topology, TopologyStats};
pub use processor::{create_processor, MetadataProcessor, ProcessorActor};
pub use supervisor::Supervisor;
