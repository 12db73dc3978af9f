//! Fixed-deposit rates agent: vector store, then web search, then the model.

use super::{Providers, RecipeSettings};
use crate::context::{Context, Trace};
use crate::errors::{CascadeError, PipelineValidationError, ValidationError};
use crate::events::{EventSink, NoOpEventSink};
use crate::pipeline::{FallbackPipeline, PipelineBuilder, PipelineRun};
use crate::providers::{CompletionOptions, EmbeddingProvider};
use crate::stages::{CompletionStage, RetrievalStage, SearchStage};
use crate::vectorstore::{VectorRecord, VectorStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::sync::Arc;

/// First line of every rates answer.
pub const RATES_HEADER: &str = "Here are the Fixed Deposit (FD) rates by country and bank:";

const RATES_PROMPT: &str = "what are the FD, Home loans and Personal loans rates for country {country} ?";
const RATES_SYSTEM_PROMPT: &str = "Answer clearly with country-wise, bank-wise FD rates if available.";
const RATES_MAX_TOKENS: u32 = 600;

/// One row of the bank rates table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankRate {
    /// Country name, matched against the question.
    pub country: String,
    /// Bank name.
    pub bank: String,
    /// Fixed-deposit rate, e.g. `6.8%`.
    pub fd_rate: String,
    /// Home loan rate.
    pub home_loan: String,
    /// Personal loan rate.
    pub personal_loan: String,
}

impl BankRate {
    /// The sentence that gets embedded and stored as the document.
    #[must_use]
    pub fn document_text(&self) -> String {
        format!(
            "{} in {} offers FD rate {}, Home Loan rate {}, and Personal Loan rate {}.",
            self.bank, self.country, self.fd_rate, self.home_loan, self.personal_loan
        )
    }
}

/// Embeds bank rates and stores them as `rec-1`, `rec-2`, ...
///
/// The full row is kept as metadata. Returns how many rows were stored.
///
/// # Errors
///
/// Returns an error if embedding or the store fails.
pub async fn ingest_bank_rates(
    store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    rates: &[BankRate],
) -> Result<usize, CascadeError> {
    for (i, rate) in rates.iter().enumerate() {
        let document = rate.document_text();
        let vector = embedder.embed(&document).await?;
        store
            .upsert(
                VectorRecord::new(format!("rec-{}", i + 1), vector)
                    .with_metadata(serde_json::to_value(rate)?)
                    .with_document(document),
            )
            .await?;
    }
    tracing::info!(count = rates.len(), "Ingested bank rates");
    Ok(rates.len())
}

/// A bank and its fixed-deposit rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankQuote {
    /// Bank name.
    pub bank: String,
    /// Fixed-deposit rate as written by the source.
    pub fd_rate: String,
}

/// Quotes grouped by country, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateTable {
    countries: Vec<(String, Vec<BankQuote>)>,
}

impl RateTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a quote under `country`.
    pub fn push(&mut self, country: impl Into<String>, quote: BankQuote) {
        let country = country.into();
        match self.countries.iter_mut().find(|(name, _)| *name == country) {
            Some((_, quotes)) => quotes.push(quote),
            None => self.countries.push((country, vec![quote])),
        }
    }

    /// Appends every quote of `other`.
    pub fn merge(&mut self, other: &Self) {
        for (country, quotes) in &other.countries {
            for quote in quotes {
                self.push(country.clone(), quote.clone());
            }
        }
    }

    /// Returns true if the table has no quotes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }

    /// Returns the quotes for one country.
    #[must_use]
    pub fn quotes(&self, country: &str) -> &[BankQuote] {
        self.countries
            .iter()
            .find(|(name, _)| name == country)
            .map(|(_, quotes)| quotes.as_slice())
            .unwrap_or_default()
    }

    /// Returns `{country: [{bank, fd_rate}]}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .countries
            .iter()
            .map(|(country, quotes)| (country.clone(), json!(quotes)))
            .collect();
        Value::Object(map)
    }
}

fn metadata_text(metadata: &Value, key: &str) -> Option<String> {
    match metadata.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Groups retrieved rate documents by country.
///
/// Reads `country`, `bank` and `fd_rate` from each hit's metadata and skips
/// hits missing any of them.
#[must_use]
pub fn format_rag_results(docs: &[Value]) -> RateTable {
    let mut table = RateTable::new();
    for doc in docs {
        let metadata = &doc["metadata"];
        if let (Some(country), Some(bank), Some(fd_rate)) = (
            metadata_text(metadata, "country"),
            metadata_text(metadata, "bank"),
            metadata_text(metadata, "fd_rate"),
        ) {
            table.push(country, BankQuote { bank, fd_rate });
        }
    }
    table
}

/// Parses search text with lines like `China ICBC: 1.8%`.
///
/// The first word before the colon is the country and the rest the bank.
/// Lines without a colon or with a single word before it are skipped.
#[must_use]
pub fn parse_search_rates(text: &str) -> RateTable {
    let mut table = RateTable::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut parts = line.split(':');
        let (Some(left), Some(right)) = (parts.next(), parts.next()) else {
            continue;
        };
        let tokens: Vec<&str> = left.split_whitespace().collect();
        if let [country, bank @ ..] = tokens.as_slice() {
            if !bank.is_empty() {
                table.push(
                    *country,
                    BankQuote {
                        bank: bank.join(" "),
                        fd_rate: right.trim().to_string(),
                    },
                );
            }
        }
    }
    table
}

/// Builds the final answer text.
///
/// Lists the merged quotes per country. When both tables are empty the
/// model text follows the header instead.
#[must_use]
pub fn format_final_answer(rag: &RateTable, web: &RateTable, llm_text: Option<&str>) -> String {
    let mut combined = rag.clone();
    combined.merge(web);

    let mut text = format!("{RATES_HEADER}\n\n");
    if combined.is_empty() {
        if let Some(llm_text) = llm_text {
            text.push_str(llm_text);
        }
    } else {
        for (country, quotes) in &combined.countries {
            let _ = writeln!(text, "{country}:");
            for quote in quotes {
                let _ = writeln!(text, "  {}: {}", quote.bank, quote.fd_rate);
            }
            text.push('\n');
        }
    }
    text.trim().to_string()
}

/// The answer to one rates question.
#[derive(Debug, Clone, Serialize)]
pub struct RatesAnswer {
    /// The formatted answer.
    pub answer: String,
    /// Documents retrieved from the vector store.
    pub rag_docs: Vec<Value>,
    /// Quotes parsed from web search, `{}` when search did not run.
    pub tavily_data: Value,
    /// Raw model text, when the model was asked.
    pub llm_fallback: Option<String>,
    /// The stage that answered.
    pub satisfied_by: Option<String>,
    /// Identifier of the pipeline run.
    pub run_id: String,
    /// Every stage attempted.
    pub trace: Trace,
}

impl From<PipelineRun> for RatesAnswer {
    fn from(run: PipelineRun) -> Self {
        let ctx = &run.context;
        let tavily_data = match ctx.get("tavily_data") {
            Value::Null => json!({}),
            data => data.clone(),
        };
        Self {
            answer: run.answer().as_str().unwrap_or_default().to_string(),
            rag_docs: ctx.get_array("rag_docs").to_vec(),
            tavily_data,
            llm_fallback: ctx.get("llm_fallback").as_str().map(str::to_string),
            satisfied_by: run.satisfied_by().map(str::to_string),
            run_id: ctx.identity().run_id.to_string(),
            trace: run.trace.clone(),
        }
    }
}

/// Answers bank rate questions by country.
///
/// Tries the vector store first, then web search, then the model.
#[derive(Debug, Clone)]
pub struct RatesAgent {
    pipeline: FallbackPipeline,
}

impl RatesAgent {
    /// Builds the agent over a store of ingested bank rates.
    ///
    /// # Errors
    ///
    /// Returns `PipelineValidationError` if the pipeline is malformed.
    pub fn new(
        store: Arc<dyn VectorStore>,
        providers: &Providers,
        settings: &RecipeSettings,
    ) -> Result<Self, PipelineValidationError> {
        Self::with_event_sink(store, providers, settings, Arc::new(NoOpEventSink))
    }

    /// Builds the agent, sending lifecycle events to `sink`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineValidationError` if the pipeline is malformed.
    pub fn with_event_sink(
        store: Arc<dyn VectorStore>,
        providers: &Providers,
        settings: &RecipeSettings,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, PipelineValidationError> {
        let rag = RetrievalStage::new("rag", store, providers.embedder.clone())
            .with_query(RATES_PROMPT)
            .with_top_k(settings.rates_top_k)
            .with_document_contains_field("country")
            .with_output_field("rag_docs")
            .with_retry(settings.retry.clone())
            .with_answer(|ctx| {
                let table = format_rag_results(ctx.get_array("rag_docs"));
                Ok((!table.is_empty()).then(|| json!(format_final_answer(&table, &RateTable::new(), None))))
            });

        let web = SearchStage::new("web_search", providers.search.clone())
            .with_query(RATES_PROMPT)
            .with_max_results(settings.max_results)
            .with_retry(settings.retry.clone())
            .with_answer(|ctx| {
                let text = ctx
                    .get_array("search_results")
                    .iter()
                    .filter_map(|hit| hit["content"].as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                let table = parse_search_rates(&text);
                ctx.set("tavily_data", table.to_json())?;
                Ok((!table.is_empty()).then(|| json!(format_final_answer(&RateTable::new(), &table, None))))
            });

        let llm = CompletionStage::new("llm", providers.completion.clone())
            .with_system_prompt(RATES_SYSTEM_PROMPT)
            .with_prompt(RATES_PROMPT)
            .with_options(CompletionOptions::new().with_max_tokens(RATES_MAX_TOKENS))
            .with_retry(settings.retry.clone())
            .with_output_field("llm_fallback")
            .with_formatter(|text| format_final_answer(&RateTable::new(), &RateTable::new(), Some(text)));

        let pipeline = PipelineBuilder::new("rates")
            .stage(rag)
            .stage(web)
            .stage(llm)
            .with_event_sink(sink)
            .build()?;
        Ok(Self { pipeline })
    }

    /// Returns the underlying pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &FallbackPipeline {
        &self.pipeline
    }

    /// Answers the rates question for `country`.
    ///
    /// # Errors
    ///
    /// `CascadeError::Validation` for a blank country, otherwise any run failure.
    pub async fn ask(&self, country: &str) -> Result<RatesAnswer, CascadeError> {
        let country = country.trim();
        if country.is_empty() {
            return Err(ValidationError::missing("country").into());
        }
        let run = self
            .pipeline
            .run(Context::new().with_field("country", country))
            .await?;
        Ok(run.into())
    }
}
