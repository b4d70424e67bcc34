//! Blueprint validation
//!
//! Rules:
//! - field-level rules from the `validator` derive (non-empty names,
//!   capacities and timeouts > 0, at least one input and one output)
//! - actor names unique across all sections
//! - dispatcher pushers reference declared outputs
//! - processor pullers reference declared inputs, at most one processor each

use std::collections::{HashMap, HashSet};

use validator::Validate;

use contracts::{ContractError, PipelineBlueprint};

/// Validate a blueprint
///
/// Returns the first error found.
pub fn validate(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    validate_fields(blueprint)?;
    validate_unique_names(blueprint)?;
    validate_dispatcher_pushers(blueprint)?;
    validate_processor_pullers(blueprint)?;
    Ok(())
}

fn validate_fields(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    blueprint.validate().map_err(|errors| {
        let fields: Vec<String> = errors
            .errors()
            .keys()
            .map(|field| field.to_string())
            .collect();
        ContractError::config_validation(fields.join(", "), errors.to_string())
    })
}

fn validate_unique_names(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::from([blueprint.pipeline.name.as_str()]);
    for name in blueprint.actor_names() {
        if !seen.insert(name) {
            return Err(ContractError::config_validation(
                format!("actor[name={name}]"),
                "duplicate actor name",
            ));
        }
    }
    Ok(())
}

fn validate_dispatcher_pushers(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let outputs: HashSet<_> = blueprint.outputs.iter().map(|o| o.name.as_str()).collect();
    for pusher in &blueprint.dispatcher.pushers {
        if !outputs.contains(pusher.as_str()) {
            return Err(ContractError::config_validation(
                "dispatcher.pushers",
                format!("pusher '{pusher}' is not a declared output"),
            ));
        }
    }
    Ok(())
}

fn validate_processor_pullers(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let inputs: HashSet<_> = blueprint.inputs.iter().map(|i| i.name.as_str()).collect();
    let mut bound: HashMap<&str, &str> = HashMap::new();
    for processor in &blueprint.processors {
        let puller = processor.puller.as_str();
        if !inputs.contains(puller) {
            return Err(ContractError::config_validation(
                format!("processors[{}].puller", processor.name),
                format!("puller '{puller}' is not a declared input"),
            ));
        }
        if let Some(first) = bound.insert(puller, processor.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("processors[{}].puller", processor.name),
                format!("puller '{puller}' is already bound to processor '{first}'"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        DispatcherConfig, FormulaConfig, HwpcDepthLevel, InputConfig, InputKind, OutputConfig,
        OutputKind, PipelineConfig, ProcessorConfig, ProcessorKind, ReportKind, ReportModel,
    };

    fn minimal_blueprint() -> PipelineBlueprint {
        PipelineBlueprint {
            pipeline: PipelineConfig {
                name: "meterflow".into(),
                mailbox_capacity: 128,
                drain_timeout_ms: 5000,
            },
            dispatcher: DispatcherConfig {
                name: "dispatcher".into(),
                depth: HwpcDepthLevel::Socket,
                pushers: vec!["out".into()],
            },
            formula: FormulaConfig::default(),
            inputs: vec![InputConfig {
                name: "in".into(),
                kind: InputKind::Synthetic,
                model: ReportKind::Hwpc,
                params: Default::default(),
            }],
            outputs: vec![OutputConfig {
                name: "out".into(),
                kind: OutputKind::Log,
                model: ReportModel::Power,
                on_save_error: Default::default(),
                params: Default::default(),
            }],
            processors: vec![],
        }
    }

    fn processor(name: &str, puller: &str) -> ProcessorConfig {
        ProcessorConfig {
            name: name.into(),
            kind: ProcessorKind::Metadata,
            puller: puller.into(),
            params: Default::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&minimal_blueprint()).is_ok());
    }

    #[test]
    fn test_zero_mailbox_capacity() {
        let mut bp = minimal_blueprint();
        bp.pipeline.mailbox_capacity = 0;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("pipeline"), "got: {err}");
    }

    #[test]
    fn test_no_outputs() {
        let mut bp = minimal_blueprint();
        bp.outputs.clear();
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("outputs"), "got: {err}");
    }

    #[test]
    fn test_empty_input_name() {
        let mut bp = minimal_blueprint();
        bp.inputs[0].name = String::new();
        assert!(matches!(
            validate(&bp),
            Err(ContractError::ConfigValidation { .. })
        ));
    }

    #[test]
    fn test_duplicate_actor_name_across_sections() {
        let mut bp = minimal_blueprint();
        bp.inputs[0].name = "out".into();
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("duplicate actor name"), "got: {err}");
    }

    #[test]
    fn test_actor_named_like_pipeline() {
        let mut bp = minimal_blueprint();
        bp.dispatcher.name = "meterflow".into();
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("duplicate actor name"), "got: {err}");
    }

    #[test]
    fn test_unknown_dispatcher_pusher() {
        let mut bp = minimal_blueprint();
        bp.dispatcher.pushers.push("nowhere".into());
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("not a declared output"), "got: {err}");
    }

    #[test]
    fn test_processor_unknown_puller() {
        let mut bp = minimal_blueprint();
        bp.processors.push(processor("tagger", "ghost"));
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("not a declared input"), "got: {err}");
    }

    #[test]
    fn test_puller_bound_twice() {
        let mut bp = minimal_blueprint();
        bp.processors.push(processor("a", "in"));
        bp.processors.push(processor("b", "in"));
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("already bound"), "got: {err}");
    }
}
