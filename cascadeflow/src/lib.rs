//! # Cascadeflow
//!
//! Fallback pipelines for LLM-backed services.
//!
//! A pipeline is an ordered list of stages. Each stage either answers the
//! question or defers to the next one, and the last stage always answers.
//! Cascadeflow provides:
//!
//! - **Fallback pipelines**: first satisfied stage wins, with a per-run trace
//! - **Workflow graphs**: named nodes joined by fixed and labelled edges
//! - **Retrieval stages**: vector store, web search, and chat completion
//! - **Recipes**: a bank rates agent, a research workflow, and a chat agent
//! - **HTTP server**: the recipes behind axum (feature `server`)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cascadeflow::prelude::*;
//!
//! let pipeline = PipelineBuilder::new("rates")
//!     .stage(RetrievalStage::new("rag", store, embedder).with_answer(summarize))
//!     .stage(SearchStage::new("web", search).with_answer(parse))
//!     .stage(CompletionStage::new("llm", model))
//!     .build()?;
//!
//! let run = pipeline.run(Context::new().with_field("country", "India")).await?;
//! println!("{} (from {:?})", run.answer(), run.satisfied_by());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod graph;
pub mod memory;
pub mod observability;
pub mod pipeline;
pub mod providers;
pub mod recipes;
pub mod retry;
pub mod stages;
pub mod testing;
pub mod vectorstore;

#[cfg(feature = "server")]
pub mod server;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::CascadeConfig;
    pub use crate::context::{Context, RunIdentity, Trace, TraceEntry, ANSWER_KEY};
    pub use crate::core::{Outcome, Route, TraceStatus};
    pub use crate::errors::{
        CascadeError, ConfigError, ContractErrorInfo, CycleDetectedError, DataConflictError,
        ExternalServiceError, PipelineValidationError, StageError, ValidationError,
        VectorStoreError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::graph::{GraphBuilder, Node, Workflow, WorkflowRun};
    pub use crate::memory::{InMemorySessionStore, SessionStore};
    pub use crate::pipeline::{FallbackPipeline, PipelineBuilder, PipelineRun};
    pub use crate::providers::{CompletionProvider, EmbeddingProvider, SearchProvider};
    pub use crate::retry::RetryPolicy;
    pub use crate::stages::{
        ChatStage, CompletionStage, FnStage, RetrievalStage, SearchStage, Stage,
        StaticAnswerStage,
    };
    pub use crate::vectorstore::{InMemoryVectorStore, MetadataFilter, VectorStore};
}
