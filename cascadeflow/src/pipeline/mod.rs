//! Fallback pipeline building and execution.
//!
//! A pipeline is an ordered list of stages. Each run walks the list until
//! one stage answers; everything written along the way stays in the
//! context so the caller can inspect it.

mod builder;
mod runner;


pub use builder::PipelineBuilder;
pub use runner::{FallbackPipeline, PipelineRun};
