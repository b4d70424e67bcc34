//! Synthetic HWPC producer
//!
//! For running a pipeline without a real sensor.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, trace};

use contracts::{ContractError, Report, ReportPayload, ReportProducer};

use crate::error::{IngestionError, Result};

/// Synthetic producer configuration
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Sensor name put on every report
    pub sensor: String,

    /// Target name put on every report
    pub target: String,

    /// Sockets per tick
    pub sockets: u32,

    /// Cores per socket
    pub cores: u32,

    /// Number of ticks before end of stream
    pub ticks: u64,

    /// Delay between ticks
    pub interval: Duration,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            sensor: "synthetic".to_string(),
            target: "all".to_string(),
            sockets: 1,
            cores: 1,
            ticks: 10,
            interval: Duration::from_millis(100),
        }
    }
}

impl SyntheticConfig {
    /// Build from input params (`sensor`, `target`, `sockets`, `cores`, `ticks`,
    /// `interval_ms`); absent keys keep their default.
    pub fn from_params(producer: &str, params: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            sensor: params.get("sensor").cloned().unwrap_or(defaults.sensor),
            target: params.get("target").cloned().unwrap_or(defaults.target),
            sockets: parse_param(producer, params, "sockets")?.unwrap_or(defaults.sockets),
            cores: parse_param(producer, params, "cores")?.unwrap_or(defaults.cores),
            ticks: parse_param(producer, params, "ticks")?.unwrap_or(defaults.ticks),
            interval: parse_param::<u64>(producer, params, "interval_ms")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
        })
    }
}

fn parse_param<T>(producer: &str, params: &HashMap<String, String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    params
        .get(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| IngestionError::InvalidParam {
                producer: producer.to_string(),
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            })
        })
        .transpose()
}

/// Emits one HWPC report per (socket, core) per tick
pub struct SyntheticProducer {
    name: String,
    config: SyntheticConfig,
    tick: u64,
    pending: VecDeque<Report>,
}

impl SyntheticProducer {
    pub fn new(name: impl Into<String>, config: SyntheticConfig) -> Self {
        Self {
            name: name.into(),
            config,
            tick: 0,
            pending: VecDeque::new(),
        }
    }

    fn generate_tick(&mut self) {
        let timestamp = Utc::now();
        for socket in 0..self.config.sockets {
            for core in 0..self.config.cores {
                let mut groups = BTreeMap::new();
                groups.insert(
                    "rapl".to_string(),
                    BTreeMap::from([("RAPL_ENERGY_PKG".to_string(), 1_000 * (self.tick + 1))]),
                );
                groups.insert(
                    "core".to_string(),
                    BTreeMap::from([
                        ("CPU_CLK_THREAD_UNHALTED:REF_P".to_string(), 50_000 + u64::from(core)),
                        ("INSTRUCTIONS_RETIRED".to_string(), 80_000 + self.tick),
                    ]),
                );
                let report = Report::new(
                    timestamp,
                    self.config.sensor.as_str(),
                    self.config.target.as_str(),
                    ReportPayload::Hwpc { groups },
                )
                .with_socket(socket)
                .with_core(core);
                self.pending.push_back(report);
            }
        }
        self.tick += 1;
    }
}

#[async_trait]
impl ReportProducer for SyntheticProducer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> std::result::Result<(), ContractError> {
        if self.config.sockets == 0 || self.config.cores == 0 {
            return Err(ContractError::producer(format!(
                "producer {} would emit nothing: sockets and cores must be > 0",
                self.name
            )));
        }
        debug!(producer = %self.name, ticks = self.config.ticks, "Synthetic producer ready");
        Ok(())
    }

    async fn read(&mut self) -> std::result::Result<Option<Report>, ContractError> {
        if self.pending.is_empty() {
            if self.tick >= self.config.ticks {
                return Ok(None);
            }
            if self.tick > 0 {
                tokio::time::sleep(self.config.interval).await;
            }
            self.generate_tick();
            trace!(producer = %self.name, tick = self.tick, "Synthetic tick");
        }
        Ok(self.pending.pop_front())
    }
}
