//! Lifecycle events emitted by pipelines and workflows.
//!
//! Runners emit through an injected [`EventSink`]; the default is
//! [`NoOpEventSink`]. Event payloads always carry the `run_id`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A pipeline run started.
pub const PIPELINE_STARTED: &str = "pipeline.started";
/// A stage produced the answer.
pub const STAGE_SATISFIED: &str = "stage.satisfied";
/// A stage handed over to the next stage.
pub const STAGE_DEFERRED: &str = "stage.deferred";
/// A stage's upstream service failed.
pub const STAGE_ERROR: &str = "stage.error";
/// A pipeline run finished with an answer.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
/// A pipeline run failed.
pub const PIPELINE_FAILED: &str = "pipeline.failed";
/// A workflow node ran.
pub const NODE_COMPLETED: &str = "node.completed";
