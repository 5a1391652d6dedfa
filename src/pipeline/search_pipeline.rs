use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{PipelineConfig, PipelineStage, Task};
use crate::{
    agent::{Agent, AgentConfig, AgentError, NormalizedResult, PromptAgentBuilder},
    console::ConsoleReporter,
    language_models::ProviderRegistry,
    monitoring::{MonitoringTrace, TraceClose, TraceRecorder},
    prompt::{PromptArgs, PromptRenderer},
    prompt_args,
    tools::{extract_urls, SearchProvider, SearchResult},
};

/// What a successful run found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub query: String,
    pub refined_query: String,
    pub urls: Vec<String>,
}

impl SearchOutcome {
    pub fn trace_output(&self) -> Value {
        json!({
            "query": self.query,
            "refined_query": self.refined_query,
            "urls": self.urls,
        })
    }
}

/// The three agents a search run chains.
#[derive(Clone)]
pub struct SearchAgents {
    pub terms_to_search: Arc<dyn Agent>,
    pub results_selection: Arc<dyn Agent>,
    pub results_urls: Arc<dyn Agent>,
}

impl SearchAgents {
    pub fn new(
        terms_to_search: Arc<dyn Agent>,
        results_selection: Arc<dyn Agent>,
        results_urls: Arc<dyn Agent>,
    ) -> Self {
        Self {
            terms_to_search,
            results_selection,
            results_urls,
        }
    }

    /// Build the default search agents, resolving their providers from `registry`.
    pub fn from_registry(
        registry: &ProviderRegistry,
        renderer: Arc<PromptRenderer>,
        recorder: &TraceRecorder,
        reporter: ConsoleReporter,
    ) -> Result<Self, AgentError> {
        let build = |config: AgentConfig| -> Result<Arc<dyn Agent>, AgentError> {
            let agent = PromptAgentBuilder::new()
                .config(config)
                .registry(registry)
                .renderer(Arc::clone(&renderer))
                .recorder(recorder.clone())
                .reporter(reporter)
                .build()?;
            Ok(Arc::new(agent))
        };

        Ok(Self::new(
            build(AgentConfig::terms_to_search())?,
            build(AgentConfig::results_selection())?,
            build(AgentConfig::results_urls())?,
        ))
    }
}

/// One run of the search workflow over one request.
///
/// The run opens a trace, turns the request into a query, searches, refines the
/// query from the results, searches again, and extracts the URLs the last agent
/// picked. Every stage is awaited in order. A pipeline runs once.
pub struct SearchPipeline {
    input: String,
    config: PipelineConfig,
    agents: SearchAgents,
    search: Arc<dyn SearchProvider>,
    recorder: TraceRecorder,
    stage: PipelineStage,
}

impl SearchPipeline {
    pub fn new<S: Into<String>>(
        input: S,
        agents: SearchAgents,
        search: Arc<dyn SearchProvider>,
        recorder: TraceRecorder,
    ) -> Self {
        Self {
            input: input.into(),
            config: PipelineConfig::default(),
            agents,
            search,
            recorder,
            stage: PipelineStage::NotStarted,
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub async fn run(&mut self, trace: &MonitoringTrace) -> Result<SearchOutcome, AgentError> {
        if self.stage != PipelineStage::NotStarted {
            return Err(AgentError::InvalidConfiguration(format!(
                "search pipeline already ran (stage {})",
                self.stage
            )));
        }

        let opened = self
            .recorder
            .open(trace, &self.config.trace_name, json!(self.input))
            .await;
        if let Err(e) = opened {
            self.stage = PipelineStage::Failed;
            return Err(e.into());
        }
        self.advance(PipelineStage::TraceOpened);

        let result = self.run_stages(trace).await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.stage = PipelineStage::Failed;
                log::info!("Search pipeline failed: {}", e);
                if let Err(close_err) = self
                    .recorder
                    .close(trace, TraceClose::error(e.to_string()))
                    .await
                {
                    log::warn!("Failed to close trace after error: {}", close_err);
                }
                return Err(e);
            }
        };

        let closed = self
            .recorder
            .close(trace, TraceClose::success(outcome.trace_output()))
            .await;
        if let Err(e) = closed {
            self.stage = PipelineStage::Failed;
            return Err(e.into());
        }
        self.advance(PipelineStage::Completed);
        Ok(outcome)
    }

    async fn run_stages(&mut self, trace: &MonitoringTrace) -> Result<SearchOutcome, AgentError> {
        let reply = self
            .agents
            .terms_to_search
            .run(trace, &prompt_args! {"input" => self.input})
            .await?;
        let reply = text_reply(self.agents.terms_to_search.as_ref(), reply)?;
        let query = strip_outer_delimiters(&reply).to_string();
        self.advance(PipelineStage::Stage1Done);

        let results = self.search(&query).await?;
        let reply = self
            .agents
            .results_selection
            .run(trace, &self.results_context(&results))
            .await?;
        let refined_query = text_reply(self.agents.results_selection.as_ref(), reply)?
            .trim()
            .to_string();
        self.advance(PipelineStage::Stage2Done);

        let results = self.search(&refined_query).await?;
        let reply = self
            .agents
            .results_urls
            .run(trace, &self.results_context(&results))
            .await?;
        let urls = extract_urls(&text_reply(self.agents.results_urls.as_ref(), reply)?);
        self.advance(PipelineStage::Stage3Done);

        Ok(SearchOutcome {
            query,
            refined_query,
            urls,
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, AgentError> {
        log::info!("Searching for {:?}", query);
        let results = self
            .search
            .search(query, self.config.result_count, self.config.extended_metadata)
            .await?;
        Ok(results)
    }

    fn results_context(&self, results: &[SearchResult]) -> PromptArgs {
        prompt_args! {
            "input" => self.input,
            "results" => results,
        }
    }

    fn advance(&mut self, stage: PipelineStage) {
        log::info!("Search pipeline: {} -> {}", self.stage, stage);
        self.stage = stage;
    }
}

#[async_trait]
impl Task for SearchPipeline {
    type Output = SearchOutcome;

    fn title(&self) -> String {
        "Searching the web ...".to_string()
    }

    fn context(&self) -> String {
        format!("Request: {}", self.input)
    }

    fn finished_success(&self) -> String {
        "Search finished".to_string()
    }

    fn finished_failed(&self) -> String {
        format!("Search failed for {:?}:", self.input)
    }

    async fn resolve(&mut self, trace: &MonitoringTrace) -> Result<SearchOutcome, AgentError> {
        self.run(trace).await
    }
}

impl std::fmt::Debug for SearchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchPipeline")
            .field("input", &self.input)
            .field("config", &self.config)
            .field("stage", &self.stage)
            .finish()
    }
}

fn text_reply(agent: &dyn Agent, result: NormalizedResult) -> Result<String, AgentError> {
    result.into_text().ok_or_else(|| {
        AgentError::InvalidConfiguration(format!(
            "{} must use raw normalization in the search pipeline",
            agent.name()
        ))
    })
}

const DELIMITERS: [(char, char); 7] = [
    ('"', '"'),
    ('\'', '\''),
    ('`', '`'),
    ('[', ']'),
    ('(', ')'),
    ('<', '>'),
    ('{', '}'),
];

/// Trim `reply` and drop one matching pair of wrapping delimiters, if present.
pub fn strip_outer_delimiters(reply: &str) -> &str {
    let trimmed = reply.trim();
    let mut chars = trimmed.chars();
    let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
        return trimmed;
    };

    if DELIMITERS.contains(&(first, last)) {
        &trimmed[first.len_utf8()..trimmed.len() - last.len_utf8()]
    } else {
        trimmed
    }
}
