//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

use crate::cli::RunArgs;
use crate::error::ensure_config_exists;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");
    ensure_config_exists(&args.config)?;

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if let Some(capacity) = args.mailbox_capacity {
        info!(capacity, "Overriding mailbox capacity from CLI");
        blueprint.pipeline.mailbox_capacity = capacity;
    }
    if let Some(drain_timeout_ms) = args.drain_timeout_ms {
        info!(drain_timeout_ms, "Overriding drain timeout from CLI");
        blueprint.pipeline.drain_timeout_ms = drain_timeout_ms;
    }
    config_loader::ConfigLoader::validate(&blueprint).context("Invalid CLI overrides")?;

    info!(
        pipeline = %blueprint.pipeline.name,
        inputs = blueprint.inputs.len(),
        outputs = blueprint.outputs.len(),
        processors = blueprint.processors.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        stats_interval: Duration::from_secs(args.stats_interval.max(1)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });

    info!("Starting pipeline...");
    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        duration_secs = stats.duration.as_secs_f64(),
        interrupted = stats.interrupted,
        throughput = format!("{:.2}", stats.throughput()),
        "Pipeline completed"
    );
    stats.print_summary();

    info!("meterflow finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print the topology for dry-run mode
fn print_config_summary(blueprint: &contracts::PipelineBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Pipeline: {}", blueprint.pipeline.name);
    println!("  Mailbox capacity: {}", blueprint.pipeline.mailbox_capacity);
    println!("  Drain timeout: {} ms", blueprint.pipeline.drain_timeout_ms);

    println!(
        "\nDispatcher: {} (depth {:?}, formula {:?})",
        blueprint.dispatcher.name, blueprint.dispatcher.depth, blueprint.formula.kind
    );

    println!("\nInputs ({}):", blueprint.inputs.len());
    for input in &blueprint.inputs {
        let via = blueprint
            .processors
            .iter()
            .find(|p| p.puller == input.name)
            .map(|p| format!(" -> {}", p.name))
            .unwrap_or_default();
        println!("  - {} ({:?}, {}){via}", input.name, input.kind, input.model);
    }

    println!("\nOutputs ({}):", blueprint.outputs.len());
    for output in &blueprint.outputs {
        println!(
            "  - {} ({:?}, {:?}, on error: {:?})",
            output.name, output.kind, output.model, output.on_save_error
        );
    }

    println!();
}
