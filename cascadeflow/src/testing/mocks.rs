//! Mock stages and providers for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::context::Context;
use crate::core::Outcome;
use crate::errors::{ExternalServiceError, StageError};
use crate::memory::ChatMessage;
use crate::providers::{CompletionOptions, CompletionProvider, ProviderError, SearchHit, SearchProvider};
use crate::stages::Stage;

/// A stage that returns a configurable result and counts calls.
#[derive(Debug)]
pub struct MockStage {
    name: String,
    result: Mutex<Result<Outcome, StageError>>,
    terminal: bool,
    call_count: Mutex<usize>,
}

impl MockStage {
    /// Creates a mock stage that defers.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            result: Mutex::new(Ok(Outcome::deferred_silently())),
            terminal: false,
            call_count: Mutex::new(0),
        }
    }

    /// Creates a mock stage that answers with `value`.
    #[must_use]
    pub fn satisfied(name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        let stage = Self::new(name);
        stage.set_outcome(Outcome::satisfied(value));
        stage
    }

    /// Creates a mock stage whose upstream service fails.
    #[must_use]
    pub fn failing(name: impl Into<String>, error: ExternalServiceError) -> Self {
        let stage = Self::new(name);
        stage.set_error(error.into());
        stage
    }

    /// Marks the stage as terminal.
    #[must_use]
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    /// Sets the outcome to return.
    pub fn set_outcome(&self, outcome: Outcome) {
        *self.result.lock() = Ok(outcome);
    }

    /// Sets the error to return.
    pub fn set_error(&self, error: StageError) {
        *self.result.lock() = Err(error);
    }

    /// Returns the number of times the stage was attempted.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl Stage for MockStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, _ctx: &mut Context) -> Result<Outcome, StageError> {
        *self.call_count.lock() += 1;
        self.result.lock().clone()
    }

    fn is_terminal(&self) -> bool {
        self.terminal
    }
}

/// A stage that panics if it is ever attempted.
///
/// It reports itself as terminal so it can close a pipeline.
#[derive(Debug)]
pub struct PanickingStage {
    name: String,
}

impl PanickingStage {
    /// Creates a panicking stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for PanickingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, _ctx: &mut Context) -> Result<Outcome, StageError> {
        panic!("stage '{}' must not be attempted", self.name);
    }

    fn is_terminal(&self) -> bool {
        true
    }
}

/// A stage that appends its name to a shared log, then defers.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingStage {
    /// Creates a recording stage writing to `log`.
    #[must_use]
    pub fn new(name: impl Into<String>, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.into(),
            log,
        }
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, _ctx: &mut Context) -> Result<Outcome, StageError> {
        self.log.lock().push(self.name.clone());
        Ok(Outcome::deferred("recorded"))
    }
}

/// A completion provider that replays queued replies.
///
/// Once the queue is empty it answers with the fallback reply. Every
/// conversation it receives is recorded.
#[derive(Debug)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    fallback: String,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedCompletion {
    /// Creates a provider that always answers `fallback`.
    #[must_use]
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues a reply.
    #[must_use]
    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        self.replies.lock().push_back(Ok(reply.into()));
        self
    }

    /// Queues an error.
    #[must_use]
    pub fn then_fail(self, error: ProviderError) -> Self {
        self.replies.lock().push_back(Err(error));
        self
    }

    /// Returns the number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the last user message of each call.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|messages| messages.last().map(|m| m.content.clone()))
            .collect()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn chat(&self, messages: &[ChatMessage], _options: &CompletionOptions) -> Result<String, ProviderError> {
        self.calls.lock().push(messages.to_vec());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// A search provider returning fixed hits, or a fixed error.
#[derive(Debug)]
pub struct ScriptedSearch {
    result: Result<Vec<SearchHit>, ProviderError>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedSearch {
    /// Returns these hits for every query.
    #[must_use]
    pub fn hits(contents: &[&str]) -> Self {
        Self {
            result: Ok(contents.iter().map(|c| SearchHit::new(*c)).collect()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Fails every query.
    #[must_use]
    pub fn failing(error: ProviderError) -> Self {
        Self {
            result: Err(error),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Returns the queries received.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ProviderError> {
        self.queries.lock().push(query.to_string());
        self.result
            .clone()
            .map(|hits| hits.into_iter().take(max_results).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_stage_counts_calls() {
        let stage = MockStage::satisfied("s", "v").terminal();
        assert!(stage.is_terminal());
        let outcome = stage.attempt(&mut Context::new()).await.unwrap();
        assert!(outcome.is_satisfied());
        assert_eq!(stage.call_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_completion_replays_then_falls_back() {
        let provider = ScriptedCompletion::new("default")
            .then_reply("first")
            .then_fail(ExternalServiceError::rate_limited("openai", "429"));

        let opts = CompletionOptions::default();
        assert_eq!(provider.complete("a", &opts).await.unwrap(), "first");
        assert!(provider.complete("b", &opts).await.unwrap_err().is_rate_limited());
        assert_eq!(provider.complete("c", &opts).await.unwrap(), "default");
        assert_eq!(provider.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_scripted_search_limits_results() {
        let search = ScriptedSearch::hits(&["one", "two", "three"]);
        let hits = search.search("q", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(search.queries(), vec!["q"]);
    }
}
