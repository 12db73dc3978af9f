//! Error types for the cascadeflow crate.
//!
//! The taxonomy separates failures of upstream services (which a fallback
//! pipeline absorbs as deferrals) from caller mistakes (which abort before
//! any stage runs) and from construction-time contract violations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type for cascadeflow operations.
#[derive(Debug, Error)]
pub enum CascadeError {
    /// Required caller input was missing or malformed.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A pipeline or workflow failed structural validation.
    #[error("{0}")]
    PipelineValidation(#[from] PipelineValidationError),

    /// A context field was written twice within one run.
    #[error("{0}")]
    DataConflict(#[from] DataConflictError),

    /// A workflow graph contains a cycle.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// An upstream service failed where the failure cannot be absorbed.
    #[error("{0}")]
    ExternalService(#[from] ExternalServiceError),

    /// The terminal stage did not produce an answer.
    #[error("Terminal stage '{stage}' failed: {reason}")]
    TerminalStage {
        /// The terminal stage name.
        stage: String,
        /// Why it failed.
        reason: String,
    },

    /// A workflow node selected a branch with no matching edge.
    #[error("Node '{node}' routed to unknown branch '{label}'")]
    UnknownBranch {
        /// The node that produced the label.
        node: String,
        /// The label that had no edge.
        label: String,
    },

    /// A vector store operation failed.
    #[error("{0}")]
    VectorStore(#[from] VectorStoreError),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CascadeError {
    /// Creates a terminal stage failure.
    #[must_use]
    pub fn terminal(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TerminalStage {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error was caused by caller input.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<serde_json::Error> for CascadeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error returned from a stage or node attempt.
///
/// External failures are absorbed by a fallback pipeline as a deferral
/// unless the failing stage is terminal. Data conflicts always abort.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// An upstream service call failed.
    #[error("{0}")]
    External(#[from] ExternalServiceError),

    /// The stage tried to overwrite a field already written in this run.
    #[error("{0}")]
    DataConflict(#[from] DataConflictError),
}

impl StageError {
    /// Returns true if the failure was a rate limit.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::External(e) if e.is_rate_limited())
    }
}

impl From<StageError> for CascadeError {
    fn from(err: StageError) -> Self {
        match err {
            StageError::External(e) => Self::ExternalService(e),
            StageError::DataConflict(e) => Self::DataConflict(e),
        }
    }
}

impl From<VectorStoreError> for StageError {
    fn from(err: VectorStoreError) -> Self {
        Self::External(err.into())
    }
}

/// The category of an upstream service failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    /// The provider asked us to slow down; eligible for bounded retry.
    RateLimited,
    /// The provider returned an error response.
    Provider,
    /// The provider could not be reached.
    Unreachable,
    /// The provider answered with data we could not interpret.
    Malformed,
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limited"),
            Self::Provider => write!(f, "provider error"),
            Self::Unreachable => write!(f, "unreachable"),
            Self::Malformed => write!(f, "malformed response"),
        }
    }
}

/// Failure of a network call, database, or hosted model behind a stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{service} {kind}: {message}")]
pub struct ExternalServiceError {
    /// The service that failed (e.g. "openai", "tavily", "vectorstore").
    pub service: String,
    /// The failure category.
    pub kind: ServiceErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl ExternalServiceError {
    /// Creates a new external service error.
    #[must_use]
    pub fn new(service: impl Into<String>, kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            kind,
            message: message.into(),
        }
    }

    /// Creates a rate-limit error.
    #[must_use]
    pub fn rate_limited(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(service, ServiceErrorKind::RateLimited, message)
    }

    /// Creates a provider error.
    #[must_use]
    pub fn provider(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(service, ServiceErrorKind::Provider, message)
    }

    /// Creates an unreachable error.
    #[must_use]
    pub fn unreachable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(service, ServiceErrorKind::Unreachable, message)
    }

    /// Creates a malformed-response error.
    #[must_use]
    pub fn malformed(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(service, ServiceErrorKind::Malformed, message)
    }

    /// Returns true if this is a rate-limit error.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.kind == ServiceErrorKind::RateLimited
    }

    /// Renders the error as `{service, kind, message}`.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::json!({ "service": self.service, "kind": self.kind, "message": self.message })
    }
}

/// A required input field was missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// The offending field.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates the error for a missing required field.
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("Missing '{field}' in request");
        Self { field, message }
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-001-TERMINAL").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Renders the info as JSON, omitting the hint and context when empty.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        let mut dict = serde_json::json!({ "code": self.code, "summary": self.summary });
        if let Some(hint) = &self.fix_hint {
            dict["fix_hint"] = hint.as_str().into();
        }
        if !self.context.is_empty() {
            let mut context: Vec<_> = self.context.iter().collect();
            context.sort();
            dict["context"] = context
                .into_iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::from(v.as_str())))
                .collect::<serde_json::Map<_, _>>()
                .into();
        }
        dict
    }
}

/// Error raised when pipeline or workflow validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }

    /// Renders the error as JSON with its contract info, if any.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::json!({
            "message": self.message,
            "code": self.code(),
            "stages": self.stages,
            "error_info": self.error_info.as_ref().map(ContractErrorInfo::to_dict),
        })
    }
}

/// Error raised when a cycle is detected in a workflow graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in workflow: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of nodes forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "CONTRACT-004-CYCLE",
            format!("Workflow contains a cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the edges in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for PipelineValidationError {
    fn from(err: CycleDetectedError) -> Self {
        Self {
            message: err.to_string(),
            stages: err.cycle_path.clone(),
            error_info: Some(err.error_info),
        }
    }
}

/// Error raised when a context field is written twice in one run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Data conflict: field '{key}' was already written in this run")]
pub struct DataConflictError {
    /// The conflicting key.
    pub key: String,
}

impl DataConflictError {
    /// Creates a new data conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Errors raised by vector store backends.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VectorStoreError {
    /// A vector did not match the collection dimension.
    #[error("Dimension mismatch: collection has {expected} dimensions, got {actual}")]
    DimensionMismatch {
        /// The collection dimension.
        expected: usize,
        /// The supplied vector dimension.
        actual: usize,
    },

    /// An empty vector was supplied.
    #[error("Vector for '{id}' is empty")]
    EmptyVector {
        /// The record id.
        id: String,
    },

    /// A metadata filter could not be parsed.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Metadata was not a JSON object.
    #[error("Metadata for '{id}' must be a JSON object")]
    InvalidMetadata {
        /// The record id.
        id: String,
    },

    /// The backing store failed.
    #[error("{0}")]
    Backend(#[from] ExternalServiceError),
}

impl From<VectorStoreError> for ExternalServiceError {
    fn from(err: VectorStoreError) -> Self {
        match err {
            VectorStoreError::Backend(e) => e,
            other => Self::provider("vectorstore", other.to_string()),
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required key was not set.
    #[error("Missing required configuration key '{key}'")]
    Missing {
        /// The missing key.
        key: String,
    },

    /// A key had an invalid value.
    #[error("Invalid value for '{key}': {message}")]
    Invalid {
        /// The key.
        key: String,
        /// Why the value is invalid.
        message: String,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// IO error while reading the configuration file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Provides default suggestions for contract error codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "CONTRACT-001-TERMINAL" => Some(
                "End every fallback pipeline with a stage that always answers, \
                 such as a completion or static default stage.",
            ),
            "CONTRACT-002-DUPLICATE" => Some(
                "Stage and node names must be unique within a pipeline or workflow.",
            ),
            "CONTRACT-003-UNKNOWN_NODE" => Some(
                "Ensure every edge references a node that was added to the workflow. \
                 Check for typos in node names.",
            ),
            "CONTRACT-004-CYCLE" => Some(
                "Workflows must be acyclic. Route back-edges through a new pipeline run instead.",
            ),
            "CONTRACT-004-EMPTY" => Some("Add at least one stage before building."),
            "CONTRACT-005-ENTRY" => Some("Call set_entry with the name of an added node."),
            "CONTRACT-006-CONFLICT" => Some(
                "A node may have either one fixed edge or a set of labelled branches, not both.",
            ),
            "CONTRACT-007-UNREACHABLE" => Some(
                "Every path from the entry node must end at a finish node.",
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_info_dict_omits_empty_parts() {
        let bare = ContractErrorInfo::new("CONTRACT-003-UNKNOWN_NODE", "Edge references unknown node");
        assert_eq!(
            bare.to_dict(),
            serde_json::json!({"code": "CONTRACT-003-UNKNOWN_NODE", "summary": "Edge references unknown node"})
        );

        let info = bare
            .with_fix_hint("Register the node before adding edges to it.")
            .with_context_entry("node", "Fallback");
        let dict = info.to_dict();
        assert_eq!(dict["fix_hint"], "Register the node before adding edges to it.");
        assert_eq!(dict["context"], serde_json::json!({"node": "Fallback"}));
    }

    #[test]
    fn test_pipeline_validation_error_to_dict() {
        let err = PipelineValidationError::new("Pipeline 'rates' has no stages")
            .with_error_info(ContractErrorInfo::new("CONTRACT-004-EMPTY", "Pipeline has no stages"));

        let dict = err.to_dict();
        assert_eq!(dict["message"], "Pipeline 'rates' has no stages");
        assert_eq!(dict["code"], "CONTRACT-004-EMPTY");
        assert_eq!(dict["stages"], serde_json::json!([]));
        assert_eq!(dict["error_info"]["summary"], "Pipeline has no stages");
        assert_eq!(PipelineValidationError::new("x").to_dict()["error_info"], serde_json::Value::Null);
    }

    #[test]
    fn test_cycle_becomes_validation_error() {
        let path: Vec<String> = ["Plan", "Retrieve", "Plan"].map(String::from).to_vec();
        let err = CycleDetectedError::new(path.clone());
        assert_eq!(err.to_string(), "Cycle detected in workflow: Plan -> Retrieve -> Plan");

        let validation: PipelineValidationError = err.into();
        assert_eq!(validation.code(), Some("CONTRACT-004-CYCLE"));
        assert_eq!(validation.stages, path);
    }

    #[test]
    fn test_external_service_error_kinds() {
        let err = ExternalServiceError::rate_limited("openai", "429 Too Many Requests");
        assert!(err.is_rate_limited());
        assert_eq!(err.to_string(), "openai rate limited: 429 Too Many Requests");

        let err = ExternalServiceError::unreachable("tavily", "connection refused");
        assert!(!err.is_rate_limited());
        assert_eq!(err.to_dict()["kind"], "unreachable");
    }

    #[test]
    fn test_validation_error_missing() {
        let err = ValidationError::missing("topic");
        assert_eq!(err.field, "topic");
        assert_eq!(err.to_string(), "Missing 'topic' in request");

        let cascade: CascadeError = err.into();
        assert!(cascade.is_client_error());
    }

    #[test]
    fn test_terminal_error_display() {
        let err = CascadeError::terminal("llm", "openai provider error: 500");
        assert_eq!(err.to_string(), "Terminal stage 'llm' failed: openai provider error: 500");
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_stage_error_conversions() {
        let err: StageError = ExternalServiceError::rate_limited("openai", "slow down").into();
        assert!(err.is_rate_limited());
        assert!(matches!(CascadeError::from(err), CascadeError::ExternalService(_)));

        let err: StageError = DataConflictError::new("answer").into();
        assert!(!err.is_rate_limited());
        assert!(matches!(CascadeError::from(err), CascadeError::DataConflict(_)));
    }

    #[test]
    fn test_vector_store_error_into_service_error() {
        let backend = ExternalServiceError::unreachable("qdrant", "timeout");
        let err: ExternalServiceError = VectorStoreError::Backend(backend.clone()).into();
        assert_eq!(err, backend);

        let err: ExternalServiceError =
            VectorStoreError::DimensionMismatch { expected: 2, actual: 3 }.into();
        assert_eq!(err.service, "vectorstore");
        assert_eq!(err.kind, ServiceErrorKind::Provider);
    }

    #[test]
    fn test_every_contract_code_has_a_suggestion() {
        for code in [
            "CONTRACT-001-TERMINAL",
            "CONTRACT-002-DUPLICATE",
            "CONTRACT-003-UNKNOWN_NODE",
            "CONTRACT-004-CYCLE",
            "CONTRACT-004-EMPTY",
            "CONTRACT-005-ENTRY",
            "CONTRACT-006-CONFLICT",
            "CONTRACT-007-UNREACHABLE",
        ] {
            assert!(ContractSuggestions::get(code).is_some(), "{code}");
        }
        assert!(ContractSuggestions::get("CONTRACT-999").is_none());
    }
}
