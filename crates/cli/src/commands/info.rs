//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::PipelineBlueprint;

use crate::cli::InfoArgs;
use crate::error::ensure_config_exists;

/// Topology description for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    pipeline: PipelineInfo,
    dispatcher: DispatcherInfo,
    inputs: Vec<ActorInfo>,
    outputs: Vec<ActorInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    processors: Vec<ProcessorInfo>,
}

#[derive(Serialize)]
struct PipelineInfo {
    name: String,
    mailbox_capacity: usize,
    drain_timeout_ms: u64,
}

#[derive(Serialize)]
struct DispatcherInfo {
    name: String,
    depth: String,
    formula: String,
    pushers: Vec<String>,
}

#[derive(Serialize)]
struct ActorInfo {
    name: String,
    kind: String,
    model: String,
    /// Processor standing between this input and the dispatcher
    #[serde(skip_serializing_if = "Option::is_none")]
    via: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct ProcessorInfo {
    name: String,
    kind: String,
    puller: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");
    ensure_config_exists(&args.config)?;

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&blueprint, args.params);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(blueprint: &PipelineBlueprint, with_params: bool) -> ConfigInfo {
    let params = |map: &std::collections::HashMap<String, String>| {
        if with_params {
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        } else {
            BTreeMap::new()
        }
    };

    let inputs = blueprint
        .inputs
        .iter()
        .map(|input| ActorInfo {
            name: input.name.clone(),
            kind: format!("{:?}", input.kind).to_lowercase(),
            model: input.model.to_string(),
            via: blueprint
                .processors
                .iter()
                .find(|p| p.puller == input.name)
                .map(|p| p.name.clone()),
            params: params(&input.params),
        })
        .collect();

    let outputs = blueprint
        .outputs
        .iter()
        .map(|output| ActorInfo {
            name: output.name.clone(),
            kind: format!("{:?}", output.kind).to_lowercase(),
            model: format!("{:?}", output.model).to_lowercase(),
            via: None,
            params: params(&output.params),
        })
        .collect();

    ConfigInfo {
        pipeline: PipelineInfo {
            name: blueprint.pipeline.name.clone(),
            mailbox_capacity: blueprint.pipeline.mailbox_capacity,
            drain_timeout_ms: blueprint.pipeline.drain_timeout_ms,
        },
        dispatcher: DispatcherInfo {
            name: blueprint.dispatcher.name.clone(),
            depth: format!("{:?}", blueprint.dispatcher.depth).to_lowercase(),
            formula: format!("{:?}", blueprint.formula.kind).to_lowercase(),
            pushers: blueprint.dispatcher.pushers.clone(),
        },
        inputs,
        outputs,
        processors: blueprint
            .processors
            .iter()
            .map(|p| ProcessorInfo {
                name: p.name.clone(),
                kind: format!("{:?}", p.kind).to_lowercase(),
                puller: p.puller.clone(),
            })
            .collect(),
    }
}

fn tree_prefix(index: usize, len: usize) -> &'static str {
    if index + 1 == len {
        "└─"
    } else {
        "├─"
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  meterflow Configuration                     ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("⚙️  Pipeline");
    println!("   ├─ Name: {}", info.pipeline.name);
    println!("   ├─ Mailbox capacity: {}", info.pipeline.mailbox_capacity);
    println!("   └─ Drain timeout: {} ms", info.pipeline.drain_timeout_ms);

    println!("\n🔀 Dispatcher");
    println!("   ├─ Name: {}", info.dispatcher.name);
    println!("   ├─ Depth: {}", info.dispatcher.depth);
    println!("   ├─ Formula: {}", info.dispatcher.formula);
    println!("   └─ Pushers: {}", info.dispatcher.pushers.join(", "));

    for (title, actors) in [("📥 Inputs", &info.inputs), ("📤 Outputs", &info.outputs)] {
        println!("\n{title} ({})", actors.len());
        for (i, actor) in actors.iter().enumerate() {
            let via = actor
                .via
                .as_ref()
                .map(|p| format!(" -> {p}"))
                .unwrap_or_default();
            println!(
                "   {} {} ({}, {}){via}",
                tree_prefix(i, actors.len()),
                actor.name,
                actor.kind,
                actor.model
            );
            for (key, value) in &actor.params {
                println!("         {key} = {value}");
            }
        }
    }

    if !info.processors.is_empty() {
        println!("\n🧩 Processors ({})", info.processors.len());
        for (i, processor) in info.processors.iter().enumerate() {
            println!(
                "   {} {} ({}) on {}",
                tree_prefix(i, info.processors.len()),
                processor.name,
                processor.kind,
                processor.puller
            );
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_loader::{ConfigFormat, ConfigLoader};

    #[test]
    fn info_links_inputs_to_processors() {
        let blueprint = ConfigLoader::load_from_str(
            r#"
[pipeline]
name = "p"
[dispatcher]
name = "d"
depth = "core"
pushers = ["out"]
[[inputs]]
name = "in"
kind = "synthetic"
[inputs.params]
sockets = "4"
[[outputs]]
name = "out"
kind = "log"
[[processors]]
name = "tagger"
kind = "metadata"
puller = "in"
"#,
            ConfigFormat::Toml,
        )
        .unwrap();

        let info = build_config_info(&blueprint, false);
        assert_eq!(info.dispatcher.depth, "core");
        assert_eq!(info.inputs[0].via.as_deref(), Some("tagger"));
        assert!(info.inputs[0].params.is_empty());

        let info = build_config_info(&blueprint, true);
        assert_eq!(info.inputs[0].params["sockets"], "4");
    }
}
