//! Report filter - ordered (predicate, target) list, first match wins

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use contracts::{ActorName, ActorRef, Report, ReportKind};

/// Predicate over a report
#[derive(Clone)]
pub struct ReportPredicate {
    label: String,
    test: Arc<dyn Fn(&Report) -> bool + Send + Sync>,
}

impl ReportPredicate {
    /// Matches every report
    pub fn always() -> Self {
        Self::custom("always", |_| true)
    }

    /// Matches reports of one type
    pub fn kind(kind: ReportKind) -> Self {
        Self::custom(format!("kind == {kind}"), move |r| r.kind() == kind)
    }

    pub fn custom<F>(label: impl Into<String>, test: F) -> Self
    where
        F: Fn(&Report) -> bool + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            test: Arc::new(test),
        }
    }

    pub fn matches(&self, report: &Report) -> bool {
        (self.test)(report)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for ReportPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReportPredicate({})", self.label)
    }
}

/// Ordered filter of a puller
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    entries: Vec<(ReportPredicate, ActorRef)>,
}

impl ReportFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, evaluated after the existing ones
    pub fn filter(mut self, predicate: ReportPredicate, target: ActorRef) -> Self {
        self.entries.push((predicate, target));
        self
    }

    /// First target whose predicate matches
    pub fn route(&self, report: &Report) -> Option<&ActorRef> {
        self.entries
            .iter()
            .find(|(predicate, _)| predicate.matches(report))
            .map(|(_, target)| target)
    }

    pub fn entries(&self) -> &[(ReportPredicate, ActorRef)] {
        &self.entries
    }

    /// Distinct targets, by name
    pub fn targets(&self) -> Vec<ActorRef> {
        let unique: BTreeMap<&ActorName, &ActorRef> = self
            .entries
            .iter()
            .map(|(_, target)| (target.name(), target))
            .collect();
        unique.into_values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point every rebindable entry at `target`, keeping predicates and order.
    ///
    /// Returns the distinct targets that were replaced.
    pub(crate) fn retarget(&mut self, target: &ActorRef) -> Vec<ActorRef> {
        let mut replaced: BTreeMap<ActorName, ActorRef> = BTreeMap::new();
        for (_, current) in self.entries.iter_mut() {
            if current.kind().is_rebindable() {
                let previous = std::mem::replace(current, target.clone());
                replaced.insert(previous.name().clone(), previous);
            }
        }
        replaced.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::{ActorCell, ActorKind, ReportPayload};

    fn report(payload: ReportPayload) -> Report {
        Report::new(Utc::now(), "s", "t", payload)
    }

    #[test]
    fn first_match_wins() {
        let power = ActorCell::new("power", ActorKind::Dispatcher, 1);
        let any = ActorCell::new("any", ActorKind::Dispatcher, 1);
        let filter = ReportFilter::new()
            .filter(ReportPredicate::kind(ReportKind::Power), power.actor_ref())
            .filter(ReportPredicate::always(), any.actor_ref());

        let target = filter.route(&report(ReportPayload::Power { power: 1.0 })).unwrap();
        assert_eq!(target.name(), "power");
        let target = filter.route(&report(ReportPayload::Generic)).unwrap();
        assert_eq!(target.name(), "any");
    }

    #[test]
    fn unmatched_report_has_no_target() {
        let d = ActorCell::new("d", ActorKind::Dispatcher, 1);
        let filter = ReportFilter::new().filter(ReportPredicate::kind(ReportKind::Hwpc), d.actor_ref());
        assert!(filter.route(&report(ReportPayload::Generic)).is_none());
    }

    #[test]
    fn retarget_keeps_order_and_predicates() {
        let d = ActorCell::new("d", ActorKind::Dispatcher, 1);
        let sink = ActorCell::new("sink", ActorKind::Pusher, 1);
        let processor = ActorCell::new("proc", ActorKind::Processor, 1);
        let mut filter = ReportFilter::new()
            .filter(ReportPredicate::kind(ReportKind::Hwpc), d.actor_ref())
            .filter(ReportPredicate::always(), sink.actor_ref())
            .filter(ReportPredicate::kind(ReportKind::Power), d.actor_ref());

        let replaced = filter.retarget(&processor.actor_ref());
        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced[0].name(), "d");

        let names: Vec<_> = filter.entries().iter().map(|(p, t)| (p.label().to_string(), t.name().to_string())).collect();
        assert_eq!(
            names,
            vec![
                ("kind == hwpc".to_string(), "proc".to_string()),
                ("always".to_string(), "sink".to_string()),
                ("kind == power".to_string(), "proc".to_string()),
            ]
        );
        assert_eq!(filter.targets().len(), 2);
    }
}
