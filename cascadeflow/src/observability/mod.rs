//! Observability utilities.

mod tracing;
mod wide_events;

pub use tracing::{init_tracing, SpanTimer, DEFAULT_LOG_FILTER};
pub use wide_events::{has_failures, pipeline_payload, stage_payload};
