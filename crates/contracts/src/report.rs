//! Report - measurement and result records
//!
//! Sources produce `Hwpc` reports, formulas produce `Power` reports. A report is
//! never modified in place once built; enrichment returns a new copy.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::ContractError;

/// Measurement or derived-result record with a hierarchical identity
/// (`sensor` / `target` / `socket` / `core`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Creation time of the measurement
    pub timestamp: DateTime<Utc>,

    /// Sensor that produced the measurement
    pub sensor: String,

    /// Monitored target (process, cgroup, vm...)
    pub target: String,

    /// CPU socket, when the report is scoped to one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<u32>,

    /// CPU core, when the report is scoped to one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core: Option<u32>,

    /// Free-form metadata added by sensors or processors
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,

    /// Typed body
    pub payload: ReportPayload,
}

/// Report body, one variant per report type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportPayload {
    /// Hardware performance counters: group -> event -> value
    Hwpc {
        #[serde(default)]
        groups: BTreeMap<String, BTreeMap<String, u64>>,
    },

    /// Estimated power (watts)
    Power { power: f64 },

    /// Identity-only report
    Generic,
}

/// Report type discriminant, used as the route table key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Hwpc,
    Power,
    Generic,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Hwpc => "hwpc",
            Self::Power => "power",
            Self::Generic => "generic",
        };
        f.write_str(label)
    }
}

/// Identity field of a report that a dispatch rule can extract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityField {
    Sensor,
    Target,
    Socket,
    Core,
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Sensor => "sensor",
            Self::Target => "target",
            Self::Socket => "socket",
            Self::Core => "core",
        };
        f.write_str(label)
    }
}

/// Extracted value of an identity field
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityValue {
    Text(String),
    Index(u32),
}

impl fmt::Display for IdentityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl Report {
    /// Create a report with no socket/core scope and no metadata
    pub fn new(
        timestamp: DateTime<Utc>,
        sensor: impl Into<String>,
        target: impl Into<String>,
        payload: ReportPayload,
    ) -> Self {
        Self {
            timestamp,
            sensor: sensor.into(),
            target: target.into(),
            socket: None,
            core: None,
            metadata: BTreeMap::new(),
            payload,
        }
    }

    /// Scope the report to a socket
    pub fn with_socket(mut self, socket: u32) -> Self {
        self.socket = Some(socket);
        self
    }

    /// Scope the report to a core
    pub fn with_core(mut self, core: u32) -> Self {
        self.core = Some(core);
        self
    }

    pub fn kind(&self) -> ReportKind {
        match self.payload {
            ReportPayload::Hwpc { .. } => ReportKind::Hwpc,
            ReportPayload::Power { .. } => ReportKind::Power,
            ReportPayload::Generic => ReportKind::Generic,
        }
    }

    /// Value of an identity field, `None` when the report is not scoped to it
    pub fn identity(&self, field: IdentityField) -> Option<IdentityValue> {
        match field {
            IdentityField::Sensor => Some(IdentityValue::Text(self.sensor.clone())),
            IdentityField::Target => Some(IdentityValue::Text(self.target.clone())),
            IdentityField::Socket => self.socket.map(IdentityValue::Index),
            IdentityField::Core => self.core.map(IdentityValue::Index),
        }
    }

    /// Copy of this report with one more metadata entry
    pub fn enriched(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut copy = self.clone();
        copy.metadata.insert(key.into(), value.into());
        copy
    }

    /// Power value, for power reports
    pub fn power(&self) -> Option<f64> {
        match self.payload {
            ReportPayload::Power { power } => Some(power),
            _ => None,
        }
    }
}

/// Storage schema a pusher writes reports with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportModel {
    /// Flat power record
    Power,
    /// One record per report with its counter groups
    Hwpc,
    /// Serialized report as-is
    Raw,
}

impl ReportModel {
    /// Report type this model accepts (`None` = any)
    pub fn accepted_kind(&self) -> Option<ReportKind> {
        match self {
            Self::Power => Some(ReportKind::Power),
            Self::Hwpc => Some(ReportKind::Hwpc),
            Self::Raw => None,
        }
    }

    /// Flatten a report into the record shape stored by backends
    ///
    /// # Errors
    /// Returns a database error when the report type does not match the model.
    pub fn to_record(&self, report: &Report) -> Result<Value, ContractError> {
        if let Some(expected) = self.accepted_kind() {
            if report.kind() != expected {
                return Err(ContractError::database(format!(
                    "model {self:?} cannot store a {} report",
                    report.kind()
                )));
            }
        }

        let mut record = Map::new();
        record.insert("timestamp".into(), json!(report.timestamp.to_rfc3339()));
        record.insert("sensor".into(), json!(report.sensor));
        record.insert("target".into(), json!(report.target));
        if let Some(socket) = report.socket {
            record.insert("socket".into(), json!(socket));
        }
        if let Some(core) = report.core {
            record.insert("core".into(), json!(core));
        }

        match (&self, &report.payload) {
            (Self::Power, ReportPayload::Power { power }) => {
                record.insert("power".into(), json!(power));
                for (key, value) in &report.metadata {
                    record.insert(key.clone(), value.clone());
                }
            }
            (Self::Hwpc, ReportPayload::Hwpc { groups }) => {
                record.insert("groups".into(), json!(groups));
                if !report.metadata.is_empty() {
                    record.insert("metadata".into(), json!(report.metadata));
                }
            }
            _ => {
                return serde_json::to_value(report)
                    .map_err(|e| ContractError::database(format!("serialize error: {e}")));
            }
        }

        Ok(Value::Object(record))
    }
}
