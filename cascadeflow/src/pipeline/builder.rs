//! Pipeline builder with construction-time validation.

use super::FallbackPipeline;
use crate::errors::{ContractErrorInfo, ContractSuggestions, PipelineValidationError};
use crate::events::{EventSink, NoOpEventSink};
use crate::stages::Stage;
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for fallback pipelines.
///
/// Stages run in the order they are added. `build` rejects a pipeline
/// that could return without an answer.
#[derive(Debug)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    event_sink: Arc<dyn EventSink>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(self, stage: impl Stage + 'static) -> Self {
        self.add_stage(Arc::new(stage))
    }

    /// Appends a shared stage.
    #[must_use]
    pub fn add_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Sets the sink receiving lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the stage names in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Validates the pipeline without building it.
    ///
    /// # Errors
    ///
    /// Returns `PipelineValidationError` if the pipeline is empty, has a
    /// duplicate stage name, or does not end with a terminal stage.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        let Some(last) = self.stages.last() else {
            return Err(contract_error(
                "CONTRACT-004-EMPTY",
                format!("Pipeline '{}' has no stages", self.name),
                Vec::new(),
            ));
        };

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name()) {
                return Err(contract_error(
                    "CONTRACT-002-DUPLICATE",
                    format!("Stage '{}' appears more than once", stage.name()),
                    vec![stage.name().to_string()],
                ));
            }
        }

        if !last.is_terminal() {
            return Err(contract_error(
                "CONTRACT-001-TERMINAL",
                format!(
                    "Pipeline '{}' ends with non-terminal stage '{}'",
                    self.name,
                    last.name()
                ),
                vec![last.name().to_string()],
            ));
        }

        Ok(())
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `PipelineValidationError` if validation fails.
    pub fn build(self) -> Result<FallbackPipeline, PipelineValidationError> {
        self.validate()?;
        tracing::debug!(pipeline = %self.name, stages = self.stages.len(), "Built fallback pipeline");
        Ok(FallbackPipeline::new(self.name, self.stages, self.event_sink))
    }
}

fn contract_error(code: &str, summary: String, stages: Vec<String>) -> PipelineValidationError {
    let mut info = ContractErrorInfo::new(code, summary.clone());
    if let Some(hint) = ContractSuggestions::get(code) {
        info = info.with_fix_hint(hint);
    }
    if let Some(stage) = stages.first() {
        info = info.with_context_entry("stage", stage.clone());
    }
    PipelineValidationError::new(summary)
        .with_stages(stages)
        .with_error_info(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::core::Outcome;
    use crate::errors::StageError;
    use crate::stages::{FnStage, StaticAnswerStage};

    fn deferring(name: &str) -> FnStage<impl Fn(&mut Context) -> Result<Outcome, StageError> + Send + Sync> {
        FnStage::new(name, |_: &mut Context| Ok(Outcome::deferred_silently()))
    }

    #[test]
    fn test_builder_creation() {
        let builder = PipelineBuilder::new("test");
        assert_eq!(builder.name(), "test");
        assert!(builder.stage_names().is_empty());
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        let err = PipelineBuilder::new("empty").build().unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-004-EMPTY"));
        assert!(err.error_info.unwrap().fix_hint.is_some());
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let err = PipelineBuilder::new("dup")
            .stage(deferring("rag"))
            .stage(deferring("rag"))
            .stage(StaticAnswerStage::new("default", "n/a"))
            .build()
            .unwrap_err();

        assert_eq!(err.code(), Some("CONTRACT-002-DUPLICATE"));
        assert_eq!(err.stages, vec!["rag".to_string()]);
    }

    #[test]
    fn test_non_terminal_last_stage_rejected() {
        let err = PipelineBuilder::new("open")
            .stage(deferring("rag"))
            .stage(deferring("web"))
            .build()
            .unwrap_err();

        assert_eq!(err.code(), Some("CONTRACT-001-TERMINAL"));
        assert!(err.message.contains("'web'"));
        assert_eq!(
            err.error_info.unwrap().context.get("stage"),
            Some(&"web".to_string())
        );
    }

    #[test]
    fn test_terminal_stage_need_not_be_unique() {
        let pipeline = PipelineBuilder::new("ok")
            .stage(StaticAnswerStage::new("first", "a"))
            .stage(deferring("unreachable_in_practice"))
            .stage(StaticAnswerStage::new("last", "b"))
            .build()
            .unwrap();

        assert_eq!(pipeline.stage_names(), vec!["first", "unreachable_in_practice", "last"]);
    }
}
