//! Core domain model types for cascadeflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - The tagged stage outcome (`Satisfied` / `Deferred`)
//! - The workflow route returned by graph nodes
//! - The trace status enum

mod outcome;
mod status;

pub use outcome::{Outcome, Route};
pub use status::TraceStatus;
