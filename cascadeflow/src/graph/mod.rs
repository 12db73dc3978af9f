//! Branching workflow graphs.
//!
//! A workflow is a set of named nodes joined by fixed edges and labelled
//! branch edges. Each node returns a [`Route`]; the executor follows the
//! fixed edge on [`Route::Next`] and the matching labelled edge on
//! [`Route::Branch`]. Nodes run strictly one at a time.

mod builder;
mod executor;
mod nodes;

pub use builder::GraphBuilder;
pub use executor::{Workflow, WorkflowRun};
pub use nodes::{FnNode, PromptNode, StageNode, DEFERRED_LABEL, SATISFIED_LABEL};

use crate::context::Context;
use crate::core::Route;
use crate::errors::StageError;
use async_trait::async_trait;
use std::fmt::Debug;

/// A step in a workflow graph.
#[async_trait]
pub trait Node: Send + Sync + Debug {
    /// Returns the node name.
    fn name(&self) -> &str;

    /// Runs the node and picks the outgoing edge.
    ///
    /// # Errors
    ///
    /// Any error aborts the workflow.
    async fn run(&self, ctx: &mut Context) -> Result<Route, StageError>;
}
