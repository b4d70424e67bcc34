//! # Dispatcher
//!
//! Report routing module.
//!
//! Responsibilities:
//! - Map each report to a `RoutingKey` through the `RouteTable`
//! - Own the formula population, one formula per routing key
//! - Coordinate the end-of-stream drain towards the pushers

pub mod dispatcher;
pub mod error;
pub mod formula;
pub mod metrics;
pub mod route;

pub use contracts::HwpcDepthLevel;
pub use dispatcher::{DispatcherActor, DispatcherSettings};
pub use error::DispatcherError;
pub use formula::{
    dummy_formula_factory, DummyFormula, Formula, FormulaActor, FormulaContext, FormulaFactory,
};
pub use metrics::{DispatcherMetrics, DispatcherMetricsSnapshot};
pub use route::{DispatchRule, RouteTable, RoutingKey};
