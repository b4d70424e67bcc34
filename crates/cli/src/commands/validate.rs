//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{InputKind, OutputKind, PipelineBlueprint};

use crate::cli::ValidateArgs;
use crate::error::{ensure_config_exists, CliError};

/// Outcome of `validate`, printed or serialized as is
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    pipeline: String,
    dispatcher: String,
    input_count: usize,
    output_count: usize,
    processor_count: usize,
}

impl ValidationResult {
    fn accepted(config_path: String, blueprint: &PipelineBlueprint) -> Self {
        Self {
            valid: true,
            config_path,
            error: None,
            warnings: collect_warnings(blueprint),
            summary: Some(ConfigSummary {
                pipeline: blueprint.pipeline.name.clone(),
                dispatcher: blueprint.dispatcher.name.clone(),
                input_count: blueprint.inputs.len(),
                output_count: blueprint.outputs.len(),
                processor_count: blueprint.processors.len(),
            }),
        }
    }

    fn rejected(config_path: String, error: impl ToString) -> Self {
        Self {
            valid: false,
            config_path,
            error: Some(error.to_string()),
            warnings: Vec::new(),
            summary: None,
        }
    }
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);
    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{json}");
    } else {
        print_validation_result(&result);
    }

    match result.error {
        None => Ok(()),
        Some(error) => Err(CliError::config_validation(error).into()),
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();
    if let Err(e) = ensure_config_exists(&args.config) {
        return ValidationResult::rejected(config_path, e);
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => ValidationResult::accepted(config_path, &blueprint),
        Err(e) => ValidationResult::rejected(config_path, e),
    }
}

/// Non-fatal issues
fn collect_warnings(blueprint: &PipelineBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    for output in &blueprint.outputs {
        if !blueprint.dispatcher.pushers.contains(&output.name) {
            warnings.push(format!(
                "Output '{}' is not listed in dispatcher.pushers and will receive nothing",
                output.name
            ));
        }
        if output.kind == OutputKind::Jsonl && !output.params.contains_key("path") {
            warnings.push(format!("Output '{}' has no 'path' param and will fail to start", output.name));
        }
    }

    for input in &blueprint.inputs {
        if input.kind == InputKind::Jsonl && !input.params.contains_key("path") {
            warnings.push(format!("Input '{}' has no 'path' param and will fail to start", input.name));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if let Some(error) = &result.error {
        println!("✗ Configuration is invalid: {}", result.config_path);
        println!("\n  Error: {error}");
        return;
    }

    println!("✓ Configuration is valid: {}", result.config_path);
    if let Some(summary) = &result.summary {
        println!(
            "\n  Pipeline {} ({} inputs, {} outputs, {} processors) via dispatcher {}",
            summary.pipeline,
            summary.input_count,
            summary.output_count,
            summary.processor_count,
            summary.dispatcher
        );
    }
    if !result.warnings.is_empty() {
        println!("\n⚠ Warnings:");
        for warning in &result.warnings {
            println!("  - {warning}");
        }
    }
}
