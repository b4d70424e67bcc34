//! Route table - report type to routing key extraction

use std::collections::HashMap;
use std::fmt;

use contracts::{HwpcDepthLevel, IdentityField, IdentityValue, Report, ReportKind};

use crate::error::DispatcherError;

/// Ordered tuple of identity values; equal keys go to the same formula
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutingKey(Vec<IdentityValue>);

impl RoutingKey {
    pub fn new(values: Vec<IdentityValue>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[IdentityValue] {
        &self.0
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

/// Named extraction strategy: which identity fields, in which order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRule {
    name: String,
    fields: Vec<IdentityField>,
    primary: bool,
}

impl DispatchRule {
    pub fn new(name: impl Into<String>, fields: Vec<IdentityField>, primary: bool) -> Self {
        Self {
            name: name.into(),
            fields,
            primary,
        }
    }

    /// HWPC rule routing by sensor, then socket, then core down to `depth`
    pub fn hwpc(depth: HwpcDepthLevel, primary: bool) -> Self {
        let fields = match depth {
            HwpcDepthLevel::Root => vec![IdentityField::Sensor],
            HwpcDepthLevel::Socket => vec![IdentityField::Sensor, IdentityField::Socket],
            HwpcDepthLevel::Core => vec![
                IdentityField::Sensor,
                IdentityField::Socket,
                IdentityField::Core,
            ],
        };
        let name = match depth {
            HwpcDepthLevel::Root => "hwpc-root",
            HwpcDepthLevel::Socket => "hwpc-socket",
            HwpcDepthLevel::Core => "hwpc-core",
        };
        Self::new(name, fields, primary)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[IdentityField] {
        &self.fields
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Extract the routing key in declared field order
    ///
    /// # Errors
    /// `MissingField` when the report is not scoped to one of the fields.
    pub fn extract(&self, report: &Report) -> Result<RoutingKey, DispatcherError> {
        self.fields
            .iter()
            .map(|&field| {
                report
                    .identity(field)
                    .ok_or_else(|| DispatcherError::MissingField {
                        rule: self.name.clone(),
                        field,
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(RoutingKey)
    }
}

/// Report type -> dispatch rule, read-only once the dispatcher starts
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: HashMap<ReportKind, DispatchRule>,
    primary: Option<ReportKind>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// - `DuplicateRule` if `kind` already has a rule
    /// - `PrimaryRuleConflict` if `rule` is primary and another primary rule exists
    pub fn register(&mut self, kind: ReportKind, rule: DispatchRule) -> Result<(), DispatcherError> {
        if self.rules.contains_key(&kind) {
            return Err(DispatcherError::DuplicateRule { kind });
        }
        if rule.is_primary() {
            if let Some(existing) = self.primary.and_then(|k| self.rules.get(&k)) {
                return Err(DispatcherError::PrimaryRuleConflict {
                    existing: existing.name().to_string(),
                    rule: rule.name().to_string(),
                });
            }
            self.primary = Some(kind);
        }
        self.rules.insert(kind, rule);
        Ok(())
    }

    /// Builder-style `register`
    pub fn with_rule(mut self, kind: ReportKind, rule: DispatchRule) -> Result<Self, DispatcherError> {
        self.register(kind, rule)?;
        Ok(self)
    }

    /// # Errors
    /// `NoRule` or `MissingField`
    pub fn resolve(&self, report: &Report) -> Result<RoutingKey, DispatcherError> {
        let kind = report.kind();
        let rule = self
            .rules
            .get(&kind)
            .ok_or(DispatcherError::NoRule { kind })?;
        rule.extract(report)
    }

    pub fn get(&self, kind: ReportKind) -> Option<&DispatchRule> {
        self.rules.get(&kind)
    }

    /// The primary rule and the report type it is bound to
    pub fn primary(&self) -> Option<(ReportKind, &DispatchRule)> {
        let kind = self.primary?;
        self.rules.get(&kind).map(|rule| (kind, rule))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
