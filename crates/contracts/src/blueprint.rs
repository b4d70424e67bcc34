//! PipelineBlueprint - Config Loader output
//!
//! Describes a complete topology: supervisor settings, dispatcher and routing
//! depth, formula, inputs (pullers), outputs (pushers) and processors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

use crate::{ReportKind, ReportModel, DEFAULT_MAILBOX_CAPACITY};

/// Full pipeline blueprint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineBlueprint {
    /// Supervisor settings
    #[validate(nested)]
    pub pipeline: PipelineConfig,

    /// Dispatcher and route table
    #[validate(nested)]
    pub dispatcher: DispatcherConfig,

    /// Formula instantiated per routing key
    #[serde(default)]
    pub formula: FormulaConfig,

    /// Puller definitions
    #[validate(length(min = 1), nested)]
    pub inputs: Vec<InputConfig>,

    /// Pusher definitions
    #[validate(length(min = 1), nested)]
    pub outputs: Vec<OutputConfig>,

    /// Pre-processors bound in front of the dispatcher
    #[serde(default)]
    #[validate(nested)]
    pub processors: Vec<ProcessorConfig>,
}

impl PipelineBlueprint {
    /// Every declared actor name, in declaration order
    pub fn actor_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.dispatcher.name.as_str())
            .chain(self.inputs.iter().map(|i| i.name.as_str()))
            .chain(self.outputs.iter().map(|o| o.name.as_str()))
            .chain(self.processors.iter().map(|p| p.name.as_str()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    /// Supervisor name
    #[validate(length(min = 1))]
    pub name: String,

    /// Capacity of every actor mailbox
    #[serde(default = "default_mailbox_capacity")]
    #[validate(range(min = 1))]
    pub mailbox_capacity: usize,

    /// How long the dispatcher waits for formula acknowledgments
    #[serde(default = "default_drain_timeout_ms")]
    #[validate(range(min = 1))]
    pub drain_timeout_ms: u64,
}

impl PipelineConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

fn default_mailbox_capacity() -> usize {
    DEFAULT_MAILBOX_CAPACITY
}

fn default_drain_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DispatcherConfig {
    #[validate(length(min = 1))]
    pub name: String,

    /// Identity depth of the primary HWPC rule
    #[serde(default)]
    pub depth: HwpcDepthLevel,

    /// Outputs receiving formula results
    #[validate(length(min = 1))]
    pub pushers: Vec<String>,
}

/// How deep into the report identity the HWPC rule routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HwpcDepthLevel {
    /// One formula per sensor
    Root,
    /// One formula per (sensor, socket)
    #[default]
    Socket,
    /// One formula per (sensor, socket, core)
    Core,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaConfig {
    #[serde(default)]
    pub kind: FormulaKind,

    /// Constant produced by the dummy formula (watts)
    #[serde(default = "default_power")]
    pub power: f64,
}

impl Default for FormulaConfig {
    fn default() -> Self {
        Self {
            kind: FormulaKind::default(),
            power: default_power(),
        }
    }
}

fn default_power() -> f64 {
    42.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaKind {
    #[default]
    Dummy,
}

/// Puller configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InputConfig {
    #[validate(length(min = 1))]
    pub name: String,

    pub kind: InputKind,

    /// Report type forwarded to the dispatcher
    #[serde(default = "default_input_model")]
    pub model: ReportKind,

    /// Producer-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_input_model() -> ReportKind {
    ReportKind::Hwpc
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Generated HWPC reports
    Synthetic,
    /// JSON-lines file of reports
    Jsonl,
}

/// Pusher configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OutputConfig {
    #[validate(length(min = 1))]
    pub name: String,

    pub kind: OutputKind,

    #[serde(default = "default_output_model")]
    pub model: ReportModel,

    #[serde(default)]
    pub on_save_error: SaveFailurePolicy,

    /// Backend-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_output_model() -> ReportModel {
    ReportModel::Power
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Log,
    Jsonl,
    Memory,
}

/// What a pusher does when `save` fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveFailurePolicy {
    /// Log, drop the report, keep running
    #[default]
    Continue,
    /// Retry up to `attempts` more times, then drop
    Retry { attempts: u32 },
    /// Report end-of-stream upward and terminate
    Stop,
}

/// Processor configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProcessorConfig {
    #[validate(length(min = 1))]
    pub name: String,

    pub kind: ProcessorKind,

    /// Input whose output this processor takes over
    #[validate(length(min = 1))]
    pub puller: String,

    #[serde(default)]
    pub params: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    /// Adds configured metadata to matching reports
    Metadata,
}
