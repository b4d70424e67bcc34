//! # Integration Tests
//!
//! End-to-end runs of whole pipelines built from configuration text:
//! sources, pre-processors, routing, formulas and persistence together.

#[cfg(test)]
mod support {
    use std::time::Duration;

    use actor_factory::{ActorFactory, Topology};
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::PipelineBlueprint;

    pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

    /// Parse and validate a TOML pipeline
    pub fn blueprint(toml: &str) -> PipelineBlueprint {
        ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap()
    }

    pub async fn launch(blueprint: &PipelineBlueprint) -> Topology {
        ActorFactory::spawn_from_blueprint(blueprint, ActorFactory::formula_factory(blueprint))
            .await
            .unwrap()
    }

    /// Launch and wait until every source is exhausted
    pub async fn run_to_completion(blueprint: &PipelineBlueprint) -> Topology {
        let mut topology = launch(blueprint).await;
        topology.join(JOIN_TIMEOUT).await.unwrap();
        topology
    }
}

#[cfg(test)]
mod routing_tests {
    use super::support::*;
    use pusher::MemoryStore;

    fn synthetic_pipeline(store: &str, depth: &str) -> String {
        format!(
            r#"
[pipeline]
name = "routing"

[dispatcher]
name = "dispatcher"
depth = "{depth}"
pushers = ["out"]

[[inputs]]
name = "rapl"
kind = "synthetic"
[inputs.params]
sockets = "2"
cores = "2"
ticks = "3"
interval_ms = "0"

[[outputs]]
name = "out"
kind = "memory"
[outputs.params]
store = "{store}"
"#
        )
    }

    #[tokio::test]
    async fn root_depth_uses_one_formula_per_sensor() {
        let topology = run_to_completion(&blueprint(&synthetic_pipeline("e2e-root", "root"))).await;

        let stats = topology.stats();
        assert_eq!(stats.dispatcher.formulas_created, 1);
        assert_eq!(stats.dispatcher.reports_routed, 12);
        assert_eq!(MemoryStore::shared("e2e-root").len(), 12);
    }

    #[tokio::test]
    async fn core_depth_uses_one_formula_per_core() {
        let topology = run_to_completion(&blueprint(&synthetic_pipeline("e2e-core", "core"))).await;

        let stats = topology.stats();
        assert_eq!(stats.dispatcher.formulas_created, 4);
        assert_eq!(stats.pushers[0].1.saved, 12);
        assert!(MemoryStore::shared("e2e-core")
            .records()
            .iter()
            .all(|r| r["power"] == 42.0 && r["core"].is_u64()));
    }

    #[tokio::test]
    async fn every_input_must_end_before_the_pipeline_drains() {
        let topology = run_to_completion(&blueprint(
            r#"
[pipeline]
name = "two-sensors"

[dispatcher]
name = "dispatcher"
pushers = ["out"]

[formula]
power = 10.5

[[inputs]]
name = "fast"
kind = "synthetic"
[inputs.params]
sensor = "fast"
sockets = "2"
cores = "1"
ticks = "2"
interval_ms = "0"

[[inputs]]
name = "slow"
kind = "synthetic"
[inputs.params]
sensor = "slow"
sockets = "2"
cores = "1"
ticks = "4"
interval_ms = "20"

[[outputs]]
name = "out"
kind = "memory"
[outputs.params]
store = "e2e-two-sensors"
"#,
        ))
        .await;

        let stats = topology.stats();
        assert_eq!(stats.dispatcher.formulas_created, 4);

        let records = MemoryStore::shared("e2e-two-sensors").records();
        assert_eq!(records.len(), 12);
        assert_eq!(records.iter().filter(|r| r["sensor"] == "slow").count(), 8);
        assert!(records.iter().all(|r| r["power"] == 10.5));
    }
}

#[cfg(test)]
mod processor_tests {
    use super::support::*;
    use pusher::MemoryStore;

    #[tokio::test]
    async fn processor_only_touches_its_own_puller() {
        let topology = run_to_completion(&blueprint(
            r#"
[pipeline]
name = "tagging"

[dispatcher]
name = "dispatcher"
pushers = ["out"]

[[inputs]]
name = "vms"
kind = "synthetic"
[inputs.params]
sensor = "vms"
target = "vm-7"
sockets = "1"
cores = "1"
ticks = "3"
interval_ms = "0"

[[inputs]]
name = "hosts"
kind = "synthetic"
[inputs.params]
sensor = "hosts"
target = "host-1"
sockets = "1"
cores = "1"
ticks = "3"
interval_ms = "0"

[[outputs]]
name = "out"
kind = "memory"
[outputs.params]
store = "e2e-tagging"

[[processors]]
name = "vm-tagger"
kind = "metadata"
puller = "vms"
[processors.params]
target_pattern = "^vm-"
cluster = "paris"
"#,
        ))
        .await;

        let records = MemoryStore::shared("e2e-tagging").records();
        assert_eq!(records.len(), 6);
        for record in &records {
            if record["target"] == "vm-7" {
                assert_eq!(record["cluster"], "paris");
            } else {
                assert!(record.get("cluster").is_none());
            }
        }

        let supervisor = &topology.supervisor;
        assert!(supervisor.registry().contains("vm-tagger"));
    }

    #[test]
    fn processor_on_unknown_input_is_a_validation_error() {
        let err = config_loader::ConfigLoader::load_from_str(
            r#"
[pipeline]
name = "bad"

[dispatcher]
name = "dispatcher"
pushers = ["out"]

[[inputs]]
name = "in"
kind = "synthetic"

[[outputs]]
name = "out"
kind = "log"

[[processors]]
name = "tagger"
kind = "metadata"
puller = "elsewhere"
"#,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap_err();
        assert!(err.to_string().contains("elsewhere"));
    }
}

#[cfg(test)]
mod file_tests {
    use super::support::*;
    use chrono::Utc;
    use contracts::{Report, ReportPayload};
    use std::collections::BTreeMap;
    use std::io::Write;

    fn hwpc(target: &str, socket: u32) -> Report {
        Report::new(
            Utc::now(),
            "replay",
            target,
            ReportPayload::Hwpc {
                groups: BTreeMap::from([(
                    "rapl".to_string(),
                    BTreeMap::from([("RAPL_ENERGY_PKG".to_string(), 1000 + socket as u64)]),
                )]),
            },
        )
        .with_socket(socket)
    }

    #[tokio::test]
    async fn jsonl_replay_to_jsonl_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("reports.jsonl");
        let output = dir.path().join("out").join("power.jsonl");

        let mut file = std::fs::File::create(&input).unwrap();
        for socket in [0, 1, 0, 1] {
            writeln!(file, "{}", serde_json::to_string(&hwpc("all", socket)).unwrap()).unwrap();
        }
        writeln!(file, "{{ broken").unwrap();
        drop(file);

        let toml = format!(
            r#"
[pipeline]
name = "replay"

[dispatcher]
name = "dispatcher"
pushers = ["file"]

[[inputs]]
name = "replay"
kind = "jsonl"
[inputs.params]
path = "{}"

[[outputs]]
name = "file"
kind = "jsonl"
[outputs.params]
path = "{}"
"#,
            input.display(),
            output.display()
        );

        let topology = run_to_completion(&blueprint(&toml)).await;

        let stats = topology.stats();
        assert_eq!(stats.pullers[0].1.received, 4);
        assert_eq!(stats.dispatcher.formulas_created, 2);

        let written = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<serde_json::Value> = written
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|l| l["sensor"] == "replay" && l["power"] == 42.0));
    }
}

#[cfg(test)]
mod failure_tests {
    use std::time::Duration;

    use super::support::*;
    use actor_factory::{ActorFactory, ActorFactoryError};
    use contracts::LifecycleState;
    use pusher::MemoryStore;

    fn pipeline(store: &str, policy: &str, ticks: u32, interval_ms: u32) -> String {
        format!(
            r#"
[pipeline]
name = "failures"
drain_timeout_ms = 500

[dispatcher]
name = "dispatcher"
pushers = ["out"]

[[inputs]]
name = "in"
kind = "synthetic"
[inputs.params]
sockets = "1"
cores = "1"
ticks = "{ticks}"
interval_ms = "{interval_ms}"

[[outputs]]
name = "out"
kind = "memory"
on_save_error = {policy}
[outputs.params]
store = "{store}"
"#
        )
    }

    #[tokio::test]
    async fn retry_policy_recovers_from_transient_failures() {
        let store = MemoryStore::shared("e2e-retry");
        store.fail_next_saves(2);

        let topology = run_to_completion(&blueprint(&pipeline(
            "e2e-retry",
            r#"{ retry = { attempts = 3 } }"#,
            4,
            0,
        )))
        .await;

        let snapshot = topology.stats().pushers[0].1;
        assert_eq!(snapshot.saved, 4);
        assert_eq!(snapshot.failed, 0);
        assert_eq!(snapshot.retried, 2);
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn continue_policy_drops_failed_reports() {
        let store = MemoryStore::shared("e2e-continue");
        store.fail_next_saves(1);

        let topology =
            run_to_completion(&blueprint(&pipeline("e2e-continue", r#""continue""#, 4, 0))).await;

        let snapshot = topology.stats().pushers[0].1;
        assert_eq!(snapshot.saved, 3);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn unreachable_output_aborts_the_launch() {
        MemoryStore::shared("e2e-refused").refuse_connections(true);
        let blueprint = blueprint(&pipeline("e2e-refused", r#""continue""#, 1, 0));

        let err =
            ActorFactory::spawn_from_blueprint(&blueprint, ActorFactory::formula_factory(&blueprint))
                .await
                .unwrap_err();
        assert!(matches!(err, ActorFactoryError::LaunchFailed { ref name, .. } if name == "out"));
    }

    #[tokio::test]
    async fn shutdown_drains_reports_already_in_flight() {
        let blueprint = blueprint(&pipeline("e2e-shutdown", r#""continue""#, 1_000_000, 2));
        let mut topology = launch(&blueprint).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        topology.shutdown(JOIN_TIMEOUT).await.unwrap();

        let stats = topology.stats();
        assert!(stats.pullers[0].1.received > 0);
        assert_eq!(stats.dispatcher.reports_routed, stats.pushers[0].1.saved);
        assert_eq!(MemoryStore::shared("e2e-shutdown").len() as u64, stats.pushers[0].1.saved);
        assert!(topology
            .supervisor
            .states()
            .iter()
            .all(|(_, _, state)| *state == LifecycleState::Terminated));
    }
}
