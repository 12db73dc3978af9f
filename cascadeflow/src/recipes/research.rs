//! Research workflow: plan, retrieve or search, find gaps, propose, write code.

use super::{Providers, RecipeSettings};
use crate::context::{Context, Trace};
use crate::core::Route;
use crate::errors::{CascadeError, PipelineValidationError, ValidationError};
use crate::events::{EventSink, NoOpEventSink};
use crate::graph::{
    FnNode, GraphBuilder, PromptNode, StageNode, Workflow, WorkflowRun, DEFERRED_LABEL, SATISFIED_LABEL,
};
use crate::stages::{RetrievalStage, SearchStage};
use crate::vectorstore::VectorStore;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

const PLAN_PROMPT: &str = "Given the research topic '{input}', outline research steps.";
const GAPS_PROMPT: &str = "Identify research gaps from these works:\n{docs|fallback_docs}";
const SOLUTION_PROMPT: &str = "Propose a solution for gaps:\n{gaps}";
const CODE_PROMPT: &str = "Write sample code for solution:\n{solution}";

/// Builds the research workflow graph.
///
/// ```text
/// Plan -> Retrieve -satisfied-> GapAnalysis -> Solution -> CodeGen -> Final
///                  -deferred--> Fallback -> GapAnalysis
/// ```
///
/// Retrieval routes to the web search fallback when the store returns no
/// documents or fails. Model and search failures leave empty values behind
/// instead of aborting, so the run always reaches `Final`, which writes
/// `output = {Plan, Gaps, Solution, Code}`.
///
/// # Errors
///
/// Returns `PipelineValidationError` if the graph is malformed.
pub fn research_workflow(
    store: Arc<dyn VectorStore>,
    providers: &Providers,
    settings: &RecipeSettings,
    sink: Arc<dyn EventSink>,
) -> Result<Workflow, PipelineValidationError> {
    let prompt = |name: &str, template: &str, field: &str| {
        PromptNode::new(name, providers.completion.clone(), template, field)
            .with_retry(settings.retry.clone())
            .absorb_errors()
    };

    let retrieve = RetrievalStage::new("Retrieve", store, providers.embedder.clone())
        .with_top_k(settings.research_top_k)
        .with_retry(settings.retry.clone())
        .with_answer(|ctx| Ok(Some(json!(ctx.get_array("docs").len()))));

    let fallback = SearchStage::new("Fallback", providers.search.clone())
        .with_max_results(settings.max_results)
        .with_retry(settings.retry.clone())
        .with_output_field("fallback_docs");

    let finish = FnNode::new("Final", |ctx: &mut Context| {
        let output = json!({
            "Plan": ctx.get("plan"),
            "Gaps": ctx.get("gaps"),
            "Solution": ctx.get("solution"),
            "Code": ctx.get("code"),
        });
        ctx.set("output", output)?;
        Ok(Route::Next)
    });

    GraphBuilder::new("research")
        .node(prompt("Plan", PLAN_PROMPT, "plan"))
        .node(StageNode::new(retrieve).branching().absorb_errors())
        .node(StageNode::new(fallback).absorb_errors())
        .node(prompt("GapAnalysis", GAPS_PROMPT, "gaps"))
        .node(prompt("Solution", SOLUTION_PROMPT, "solution"))
        .node(prompt("CodeGen", CODE_PROMPT, "code"))
        .node(finish)
        .set_entry("Plan")
        .add_edge("Plan", "Retrieve")
        .add_branch("Retrieve", SATISFIED_LABEL, "GapAnalysis")
        .add_branch("Retrieve", DEFERRED_LABEL, "Fallback")
        .add_edge("Fallback", "GapAnalysis")
        .add_edge("GapAnalysis", "Solution")
        .add_edge("Solution", "CodeGen")
        .add_edge("CodeGen", "Final")
        .set_finish("Final")
        .with_event_sink(sink)
        .build()
}

/// The result of one research run.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchReport {
    /// The researched topic.
    pub topic: String,
    /// `{Plan, Gaps, Solution, Code}`.
    pub output: Value,
    /// True when web search stood in for the vector store.
    pub used_fallback: bool,
    /// Identifier of the workflow run.
    pub run_id: String,
    /// Nodes visited, in order.
    pub trace: Trace,
}

impl From<WorkflowRun> for ResearchReport {
    fn from(run: WorkflowRun) -> Self {
        Self {
            topic: run.context.get_str("input").to_string(),
            output: run.field("output").clone(),
            used_fallback: run.trace.attempted("Fallback"),
            run_id: run.context.identity().run_id.to_string(),
            trace: run.trace,
        }
    }
}

/// Runs the research workflow for a topic.
#[derive(Debug, Clone)]
pub struct ResearchWorkflow {
    workflow: Workflow,
}

impl ResearchWorkflow {
    /// Builds the workflow over a store of reference documents.
    ///
    /// # Errors
    ///
    /// Returns `PipelineValidationError` if the graph is malformed.
    pub fn new(
        store: Arc<dyn VectorStore>,
        providers: &Providers,
        settings: &RecipeSettings,
    ) -> Result<Self, PipelineValidationError> {
        Self::with_event_sink(store, providers, settings, Arc::new(NoOpEventSink))
    }

    /// Builds the workflow, sending lifecycle events to `sink`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineValidationError` if the graph is malformed.
    pub fn with_event_sink(
        store: Arc<dyn VectorStore>,
        providers: &Providers,
        settings: &RecipeSettings,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, PipelineValidationError> {
        Ok(Self {
            workflow: research_workflow(store, providers, settings, sink)?,
        })
    }

    /// Returns the underlying workflow.
    #[must_use]
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Researches `topic`.
    ///
    /// # Errors
    ///
    /// `CascadeError::Validation` for a blank topic, otherwise any run failure.
    pub async fn research(&self, topic: &str) -> Result<ResearchReport, CascadeError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ValidationError::missing("topic").into());
        }
        let run = self
            .workflow
            .run(Context::new().with_field("input", topic))
            .await?;
        Ok(run.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExternalServiceError;
    use crate::providers::HashingEmbedder;
    use crate::testing::{seeded_research_store, ScriptedCompletion, ScriptedSearch};
    use crate::vectorstore::InMemoryVectorStore;
    use pretty_assertions::assert_eq;

    fn scripted_llm() -> Arc<ScriptedCompletion> {
        Arc::new(
            ScriptedCompletion::new("unused")
                .then_reply("1. Survey\n2. Compare")
                .then_reply("No benchmarks exist.")
                .then_reply("Build a benchmark suite.")
                .then_reply("fn main() {}"),
        )
    }

    fn research(store: Arc<dyn VectorStore>, llm: Arc<ScriptedCompletion>, search: Arc<ScriptedSearch>) -> ResearchWorkflow {
        let providers = Providers::new(llm, Arc::new(HashingEmbedder::default()), search);
        ResearchWorkflow::new(store, &providers, &RecipeSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn test_documents_skip_fallback() {
        let store = seeded_research_store(&HashingEmbedder::default()).await;
        let llm = scripted_llm();
        let search = Arc::new(ScriptedSearch::hits(&["unused"]));
        let report = research(store, llm.clone(), search.clone())
            .research("vector databases")
            .await
            .unwrap();

        assert_eq!(
            report.trace.stages(),
            vec!["Plan", "Retrieve", "GapAnalysis", "Solution", "CodeGen", "Final"]
        );
        assert!(!report.used_fallback);
        assert!(search.queries().is_empty());
        assert_eq!(
            report.output,
            json!({
                "Plan": "1. Survey\n2. Compare",
                "Gaps": "No benchmarks exist.",
                "Solution": "Build a benchmark suite.",
                "Code": "fn main() {}",
            })
        );

        let prompts = llm.prompts();
        assert_eq!(prompts[0], "Given the research topic 'vector databases', outline research steps.");
        assert!(prompts[1].starts_with("Identify research gaps from these works:\n"));
        assert!(prompts[1].len() > "Identify research gaps from these works:\n".len());
        assert_eq!(prompts[2], "Propose a solution for gaps:\nNo benchmarks exist.");
        assert_eq!(prompts[3], "Write sample code for solution:\nBuild a benchmark suite.");
        assert_eq!(report.trace.entries()[1].note.as_deref(), Some(SATISFIED_LABEL));
    }

    #[tokio::test]
    async fn test_empty_store_uses_search_results() {
        let llm = scripted_llm();
        let search = Arc::new(ScriptedSearch::hits(&["Paper A: indexes", "Paper B: quantization"]));
        let report = research(Arc::new(InMemoryVectorStore::new()), llm.clone(), search.clone())
            .research("vector databases")
            .await
            .unwrap();

        assert!(report.used_fallback);
        assert_eq!(search.queries(), vec!["vector databases"]);
        assert_eq!(
            llm.prompts()[1],
            "Identify research gaps from these works:\nPaper A: indexes\nPaper B: quantization"
        );
        assert_eq!(report.trace.len(), 7);
    }

    #[tokio::test]
    async fn test_outages_leave_empty_values() {
        let llm = Arc::new(
            ScriptedCompletion::new("fallback reply")
                .then_fail(ExternalServiceError::provider("openai", "HTTP 500")),
        );
        let search = Arc::new(ScriptedSearch::failing(ExternalServiceError::unreachable("tavily", "dns")));
        let report = research(Arc::new(InMemoryVectorStore::new()), llm.clone(), search)
            .research("vector databases")
            .await
            .unwrap();

        assert_eq!(report.output["Plan"], json!(""));
        assert_eq!(report.output["Code"], json!("fallback reply"));
        assert_eq!(llm.prompts()[1], "Identify research gaps from these works:\n");
        assert_eq!(report.topic, "vector databases");
    }

    #[tokio::test]
    async fn test_blank_topic_rejected() {
        let workflow = research(
            Arc::new(InMemoryVectorStore::new()),
            scripted_llm(),
            Arc::new(ScriptedSearch::hits(&[])),
        );
        let err = workflow.research("").await.unwrap_err();
        assert_eq!(err.to_string(), ValidationError::missing("topic").to_string());
    }
}
