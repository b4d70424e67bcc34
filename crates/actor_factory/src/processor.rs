//! Pre-processors sitting between a puller and the dispatcher

use std::collections::BTreeMap;

use regex::Regex;
use tracing::{debug, info, instrument};

use contracts::{
    Actor, ActorContext, ActorKind, ActorName, ActorRef, ContractError, EndMessage, Flow,
    Processor, ProcessorConfig, ProcessorKind, Report,
};

/// Actor running a [`Processor`] on the stream of one puller
///
/// Its targets are assigned by the binding manager: they are the targets the
/// puller pointed at before being rebound to this processor.
pub struct ProcessorActor {
    name: ActorName,
    puller: ActorName,
    myself: ActorRef,
    processor: Box<dyn Processor>,
    targets: Vec<ActorRef>,
    processed: u64,
}

impl ProcessorActor {
    /// `myself` is the reference of the mailbox this actor will be launched on
    pub fn new(
        puller: impl Into<ActorName>,
        processor: Box<dyn Processor>,
        myself: ActorRef,
    ) -> Self {
        Self {
            name: myself.name().clone(),
            puller: puller.into(),
            myself,
            processor,
            targets: Vec::new(),
            processed: 0,
        }
    }

    /// Puller this processor takes over
    pub fn puller(&self) -> &ActorName {
        &self.puller
    }

    pub fn actor_ref(&self) -> &ActorRef {
        &self.myself
    }

    pub fn targets(&self) -> &[ActorRef] {
        &self.targets
    }

    pub fn set_targets(&mut self, targets: Vec<ActorRef>) {
        self.targets = targets;
    }
}

impl Actor for ProcessorActor {
    fn name(&self) -> &ActorName {
        &self.name
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Processor
    }

    #[instrument(name = "processor_initialize", skip(self, _ctx), fields(processor = %self.name))]
    async fn initialize(&mut self, _ctx: &ActorContext) -> Result<(), ContractError> {
        if self.targets.is_empty() {
            return Err(ContractError::initialization(
                self.name.as_str(),
                format!("not bound to puller '{}'", self.puller),
            ));
        }
        info!(
            puller = %self.puller,
            step = self.processor.name(),
            targets = self.targets.len(),
            "Processor ready"
        );
        Ok(())
    }

    async fn on_report(&mut self, report: Report, _ctx: &ActorContext) -> Flow {
        self.processed += 1;
        let processed = self.processor.process(&report);
        for target in &self.targets {
            target.send_report(processed.clone()).await;
        }
        Flow::Continue
    }

    async fn on_end(&mut self, end: EndMessage, _ctx: &ActorContext) -> Flow {
        for target in &self.targets {
            target.send_end(&self.name).await;
        }
        debug!(
            processor = %self.name,
            from = %end.sender,
            processed = self.processed,
            "End-of-stream forwarded"
        );
        Flow::Stop
    }

    async fn on_drain_timeout(&mut self, _ctx: &ActorContext) -> Flow {
        Flow::Stop
    }

    async fn on_terminate(&mut self, _ctx: &ActorContext) {}
}

const TARGET_PATTERN: &str = "target_pattern";

/// Adds fixed metadata to reports whose target matches a pattern
#[derive(Debug, Clone)]
pub struct MetadataProcessor {
    name: String,
    target_pattern: Option<Regex>,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl MetadataProcessor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_pattern: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_target_pattern(mut self, pattern: Regex) -> Self {
        self.target_pattern = Some(pattern);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// `target_pattern` is a regex over the report target; every other
    /// parameter becomes a metadata entry.
    ///
    /// # Errors
    /// Invalid `target_pattern`.
    pub fn from_params(
        name: impl Into<String>,
        params: &std::collections::HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let mut processor = Self::new(name.as_str());
        for (key, value) in params {
            if key == TARGET_PATTERN {
                let pattern = Regex::new(value).map_err(|e| {
                    ContractError::config_validation(
                        format!("processors.{name}.params.{TARGET_PATTERN}"),
                        e.to_string(),
                    )
                })?;
                processor = processor.with_target_pattern(pattern);
            } else {
                processor = processor.with_metadata(key.as_str(), value.as_str());
            }
        }
        Ok(processor)
    }

    fn applies_to(&self, report: &Report) -> bool {
        self.target_pattern
            .as_ref()
            .is_none_or(|pattern| pattern.is_match(&report.target))
    }
}

impl Processor for MetadataProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, report: &Report) -> Report {
        if !self.applies_to(report) {
            return report.clone();
        }
        self.metadata
            .iter()
            .fold(report.clone(), |acc, (key, value)| acc.enriched(key.as_str(), value.clone()))
    }
}

/// Build the processing step of a processor config
///
/// # Errors
/// Invalid parameters.
pub fn create_processor(config: &ProcessorConfig) -> Result<Box<dyn Processor>, ContractError> {
    match config.kind {
        ProcessorKind::Metadata => Ok(Box::new(MetadataProcessor::from_params(
            config.name.as_str(),
            &config.params,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::{spawn_actor, ActorCell, Message, ReportPayload};
    use std::collections::HashMap;

    fn report(target: &str) -> Report {
        Report::new(Utc::now(), "sensor", target, ReportPayload::Generic)
    }

    #[test]
    fn metadata_only_on_matching_targets() {
        let mut processor = MetadataProcessor::new("meta")
            .with_target_pattern(Regex::new("^vm-").unwrap())
            .with_metadata("cluster", "paris");

        let enriched = processor.process(&report("vm-1"));
        assert_eq!(enriched.metadata["cluster"], "paris");

        let untouched = processor.process(&report("host"));
        assert!(untouched.metadata.is_empty());
    }

    #[test]
    fn params_build_pattern_and_metadata() {
        let params = HashMap::from([
            ("target_pattern".to_string(), "web".to_string()),
            ("tier".to_string(), "front".to_string()),
        ]);
        let mut processor = MetadataProcessor::from_params("meta", &params).unwrap();
        assert_eq!(processor.process(&report("web-3")).metadata["tier"], "front");
        assert!(processor.process(&report("db-1")).metadata.is_empty());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let params = HashMap::from([("target_pattern".to_string(), "(".to_string())]);
        let err = MetadataProcessor::from_params("meta", &params).unwrap_err();
        assert!(matches!(err, ContractError::ConfigValidation { .. }));
    }

    #[tokio::test]
    async fn unbound_processor_fails_to_start() {
        let cell = ActorCell::new("proc", ActorKind::Processor, 4);
        let actor = ProcessorActor::new("puller", Box::new(MetadataProcessor::new("meta")), cell.actor_ref());

        let mut handle = spawn_actor(actor, cell, None);
        assert!(handle.started().await.is_err());
    }

    #[tokio::test]
    async fn forwards_processed_reports_and_end() {
        let mut dispatcher = ActorCell::new("dispatcher", ActorKind::Dispatcher, 8);
        let cell = ActorCell::new("proc", ActorKind::Processor, 8);
        let mut actor = ProcessorActor::new(
            "puller",
            Box::new(MetadataProcessor::new("meta").with_metadata("site", "lille")),
            cell.actor_ref(),
        );
        actor.set_targets(vec![dispatcher.actor_ref()]);

        let mut handle = spawn_actor(actor, cell, None);
        handle.started().await.unwrap();
        handle.actor_ref().send_report(report("vm-1")).await;
        handle.actor_ref().send_end(&"puller".into()).await;

        match dispatcher.recv().await {
            Some(Message::Report(r)) => assert_eq!(r.metadata["site"], "lille"),
            other => panic!("expected report, got {other:?}"),
        }
        match dispatcher.recv().await {
            Some(Message::End(end)) => assert_eq!(end.sender, "proc"),
            other => panic!("expected end, got {other:?}"),
        }
        handle.terminated().await;
    }
}
