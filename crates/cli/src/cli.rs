//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// meterflow - actor pipeline turning hardware counter reports into power estimations
#[derive(Parser, Debug)]
#[command(
    name = "meterflow",
    author,
    version,
    about = "Metering data pipeline",
    long_about = "Reads hardware performance counter reports, routes them to one formula \n\
                  per routing key and persists the power estimations to the configured \n\
                  outputs. The topology is described by a TOML or JSON blueprint."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "METERFLOW_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "METERFLOW_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline until every source is exhausted (or Ctrl+C)
    Run(RunArgs),

    /// Validate a blueprint without running it
    Validate(ValidateArgs),

    /// Display the topology described by a blueprint
    Info(InfoArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to the blueprint (TOML or JSON)
    #[arg(short, long, default_value = "meterflow.toml", env = "METERFLOW_CONFIG")]
    pub config: PathBuf,

    /// Stop the sources after this many seconds (0 = run until exhausted)
    #[arg(long, default_value = "0", env = "METERFLOW_TIMEOUT")]
    pub timeout: u64,

    /// Override the mailbox capacity of every actor
    #[arg(long, env = "METERFLOW_MAILBOX_CAPACITY")]
    pub mailbox_capacity: Option<usize>,

    /// Override the formula drain timeout (milliseconds)
    #[arg(long, env = "METERFLOW_DRAIN_TIMEOUT_MS")]
    pub drain_timeout_ms: Option<u64>,

    /// Validate the blueprint and print the topology without running it
    #[arg(long)]
    pub dry_run: bool,

    /// Seconds between two metric samples
    #[arg(long, default_value = "1", env = "METERFLOW_STATS_INTERVAL")]
    pub stats_interval: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "METERFLOW_METRICS_PORT")]
    pub metrics_port: u16,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    #[arg(short, long, default_value = "meterflow.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct InfoArgs {
    #[arg(short, long, default_value = "meterflow.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show input and output parameters
    #[arg(long)]
    pub params: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "meterflow",
            "-v",
            "run",
            "--config",
            "pipeline.toml",
            "--timeout",
            "30",
            "--drain-timeout-ms",
            "250",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("pipeline.toml"));
                assert_eq!(args.timeout, 30);
                assert_eq!(args.drain_timeout_ms, Some(250));
                assert_eq!(args.mailbox_capacity, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["meterflow", "-q", "-v", "validate"]).is_err());
    }
}
