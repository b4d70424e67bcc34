//! Processor trait - report enrichment step between a puller and the dispatcher

use crate::Report;

/// Pure report transformation.
///
/// Input reports are never modified; the processor returns a (possibly enriched)
/// copy.
pub trait Processor: Send {
    fn name(&self) -> &str;

    fn process(&mut self, report: &Report) -> Report;
}
