//! Testing utilities for cascadeflow pipelines.
//!
//! This module provides:
//! - Scripted, recording and panicking stages
//! - Scripted completion and search providers
//! - Assertions over outcomes and traces
//! - Sample data and seeded vector stores

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_answer, assert_deferred, assert_satisfied, assert_single_answer, assert_stage_status,
    assert_trace_stages,
};
pub use fixtures::{sample_bank_rates, seeded_rates_store, seeded_research_store};
pub use mocks::{
    MockStage, PanickingStage, RecordingStage, ScriptedCompletion, ScriptedSearch,
};
