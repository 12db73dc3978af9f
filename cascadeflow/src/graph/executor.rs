//! Workflow execution.

use super::Node;
use crate::context::{Context, Trace, TraceEntry};
use crate::core::{Route, TraceStatus};
use crate::errors::CascadeError;
use crate::events::{EventSink, NODE_COMPLETED, PIPELINE_COMPLETED, PIPELINE_FAILED, PIPELINE_STARTED};
use crate::observability::{pipeline_payload, stage_payload, SpanTimer};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::Instrument;

/// Label reported when a branching node returns [`Route::Next`].
const NEXT_LABEL: &str = "next";

/// Outgoing edges of one node.
#[derive(Debug, Clone)]
pub(crate) enum Edges {
    /// The workflow ends after this node.
    Finish,
    /// A single edge followed on `Route::Next`.
    Fixed(String),
    /// Labelled edges keyed by branch label.
    Branches(BTreeMap<String, String>),
}

impl Edges {
    pub(crate) fn targets(&self) -> Vec<&str> {
        match self {
            Self::Finish => Vec::new(),
            Self::Fixed(to) => vec![to.as_str()],
            Self::Branches(labels) => labels.values().map(String::as_str).collect(),
        }
    }
}

/// The result of a completed workflow.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    /// The final context.
    pub context: Context,
    /// Every node visited, in order.
    pub trace: Trace,
}

impl WorkflowRun {
    /// Returns a field of the final context.
    #[must_use]
    pub fn field(&self, key: &str) -> &serde_json::Value {
        self.context.get(key)
    }

    /// Returns the names of the visited nodes.
    #[must_use]
    pub fn path(&self) -> Vec<&str> {
        self.trace.stages()
    }
}

/// A validated workflow graph, built with [`super::GraphBuilder`].
///
/// Cheap to clone and safe to share across concurrent runs.
#[derive(Debug, Clone)]
pub struct Workflow {
    name: String,
    nodes: Arc<HashMap<String, Arc<dyn Node>>>,
    routes: Arc<HashMap<String, Edges>>,
    entry: String,
    event_sink: Arc<dyn EventSink>,
}

impl Workflow {
    pub(crate) fn new(
        name: String,
        nodes: HashMap<String, Arc<dyn Node>>,
        routes: HashMap<String, Edges>,
        entry: String,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            name,
            nodes: Arc::new(nodes),
            routes: Arc::new(routes),
            entry,
            event_sink,
        }
    }

    /// Returns the workflow name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the entry node name.
    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the workflow has no nodes. Never true once built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Runs the workflow from its entry node until a finish node completes.
    ///
    /// # Errors
    ///
    /// Any node error aborts the run, as does a route with no matching edge
    /// (`CascadeError::UnknownBranch`).
    pub async fn run(&self, ctx: Context) -> Result<WorkflowRun, CascadeError> {
        let span = tracing::info_span!(
            "workflow",
            workflow = %self.name,
            run_id = %ctx.identity().run_id,
        );
        self.execute(ctx).instrument(span).await
    }

    async fn execute(&self, mut ctx: Context) -> Result<WorkflowRun, CascadeError> {
        let mut trace = Trace::new();
        self.event_sink
            .emit(
                PIPELINE_STARTED,
                Some(serde_json::json!({
                    "pipeline": self.name,
                    "run_id": ctx.identity().run_id.to_string(),
                    "entry": self.entry,
                })),
            )
            .await;

        let mut current = self.entry.clone();
        loop {
            match self.step(&current, &mut ctx, &mut trace).await {
                Ok(Some(next)) => current = next,
                Ok(None) => break,
                Err(e) => {
                    let message = e.to_string();
                    tracing::error!(node = %current, error = %message, "Workflow failed");
                    self.event_sink
                        .emit(
                            PIPELINE_FAILED,
                            Some(pipeline_payload(&self.name, ctx.identity(), &trace, Some(&message))),
                        )
                        .await;
                    return Err(e);
                }
            }
        }

        self.event_sink
            .emit(
                PIPELINE_COMPLETED,
                Some(pipeline_payload(&self.name, ctx.identity(), &trace, None)),
            )
            .await;
        tracing::info!(
            visited = trace.len(),
            duration_ms = trace.total_duration_ms(),
            "Workflow completed"
        );
        Ok(WorkflowRun { context: ctx, trace })
    }

    /// Runs one node and returns the next node name, or `None` at a finish node.
    async fn step(
        &self,
        name: &str,
        ctx: &mut Context,
        trace: &mut Trace,
    ) -> Result<Option<String>, CascadeError> {
        let (node, edges) = match (self.nodes.get(name), self.routes.get(name)) {
            (Some(node), Some(edges)) => (node, edges),
            _ => {
                return Err(CascadeError::UnknownBranch {
                    node: name.to_string(),
                    label: NEXT_LABEL.to_string(),
                })
            }
        };

        let timer = SpanTimer::start(name);
        let result = node.run(ctx).await;
        let (started_at, duration_ms) = timer.finish();

        let route = match result {
            Ok(route) => route,
            Err(e) => {
                let entry = TraceEntry::new(name, TraceStatus::Failed)
                    .with_note(Some(e.to_string()))
                    .with_timing(started_at, duration_ms);
                trace.push(entry);
                return Err(e.into());
            }
        };

        let entry = TraceEntry::new(name, TraceStatus::Completed)
            .with_note(route.label())
            .with_timing(started_at, duration_ms);
        tracing::debug!(node = name, route = ?route, duration_ms, "Node completed");
        self.event_sink
            .emit(NODE_COMPLETED, Some(stage_payload(&self.name, ctx.identity(), &entry)))
            .await;
        trace.push(entry);

        let unknown = |label: &str| CascadeError::UnknownBranch {
            node: name.to_string(),
            label: label.to_string(),
        };
        match (edges, &route) {
            (Edges::Finish, _) => Ok(None),
            (Edges::Fixed(to), Route::Next) => Ok(Some(to.clone())),
            (Edges::Fixed(_), Route::Branch(label)) => Err(unknown(label)),
            (Edges::Branches(labels), Route::Branch(label)) => labels
                .get(label)
                .cloned()
                .map(Some)
                .ok_or_else(|| unknown(label)),
            (Edges::Branches(_), Route::Next) => Err(unknown(NEXT_LABEL)),
        }
    }
}
