use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::json;

use super::*;
use crate::{
    agent::{Agent, AgentError, NormalizedResult},
    console::ConsoleReporter,
    language_models::{
        LLMError, ModelFamily, ModelParams, ProviderClient, ProviderRegistry, ProviderReply,
    },
    monitoring::{InMemoryBackend, MonitoringTrace, TraceRecorder, TraceStatus},
    prompt::{PromptArgs, PromptRenderer},
    tools::{SearchError, SearchProvider, SearchResult},
};

/// Returns a fixed reply (or error) and keeps every context it was given.
struct StubAgent {
    name: String,
    reply: Result<String, String>,
    contexts: Mutex<Vec<PromptArgs>>,
}

impl StubAgent {
    fn replying(name: &str, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            reply: Ok(reply.to_string()),
            contexts: Mutex::new(Vec::new()),
        })
    }

    fn failing(name: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            reply: Err(message.to_string()),
            contexts: Mutex::new(Vec::new()),
        })
    }

    fn contexts(&self) -> Vec<PromptArgs> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for StubAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        _trace: &MonitoringTrace,
        context: &PromptArgs,
    ) -> Result<NormalizedResult, AgentError> {
        self.contexts.lock().unwrap().push(context.clone());
        match &self.reply {
            Ok(reply) => Ok(NormalizedResult::Text(reply.clone())),
            Err(message) => Err(AgentError::ProviderInvocationError(LLMError::OtherError(
                message.clone(),
            ))),
        }
    }
}

/// Serves one canned result list per call, in order.
struct StubSearch {
    pages: Mutex<VecDeque<Result<Vec<SearchResult>, SearchError>>>,
    calls: Mutex<Vec<(String, usize, bool)>>,
}

impl StubSearch {
    fn new(pages: Vec<Result<Vec<SearchResult>, SearchError>>) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(pages.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, usize, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for StubSearch {
    async fn search(
        &self,
        query: &str,
        result_count: usize,
        extended_metadata: bool,
    ) -> Result<Vec<SearchResult>, SearchError> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), result_count, extended_metadata));
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Chat provider answering with queued replies.
struct QueuedProvider {
    replies: Mutex<VecDeque<String>>,
}

#[async_trait]
impl ProviderClient for QueuedProvider {
    fn family(&self) -> ModelFamily {
        ModelFamily::BedrockChat
    }

    async fn invoke(
        &self,
        _model_id: &str,
        _prompt: &str,
        _params: &ModelParams,
    ) -> Result<ProviderReply, LLMError> {
        let content = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LLMError::OtherError("no reply queued".into()))?;
        Ok(ProviderReply {
            content,
            response_metadata: json!({"usage": {"input_tokens": 100, "output_tokens": 10}}),
        })
    }
}

const INPUT: &str = "no encuentro el precio de llama 3 en bedrock";

fn first_results() -> Vec<SearchResult> {
    vec![
        SearchResult::new("https://aws.amazon.com/bedrock/pricing/")
            .with_title("Amazon Bedrock Pricing")
            .with_description("Llama 3 {8B} and {70B} prices"),
        SearchResult::new("https://www.reddit.com/r/aws/llama3").with_title("Llama 3 on Bedrock"),
    ]
}

fn second_results() -> Vec<SearchResult> {
    vec![SearchResult::new("https://llama.meta.com/").with_title("Meta Llama")]
}

fn trace() -> MonitoringTrace {
    MonitoringTrace::new("1", "1", ["test"])
}

#[tokio::test]
async fn test_stages_receive_fresh_contexts() {
    let backend = InMemoryBackend::new();
    let terms = StubAgent::replying("TermsToSearchAgent", " \"llama 3 bedrock price\"\n");
    let selection = StubAgent::replying("ResultsSelectionAgent", "  bedrock llama 3 pricing per token \n");
    let urls = StubAgent::replying(
        "ResultsUrlsAgent",
        "1. https://aws.amazon.com/bedrock/pricing/\n2. www.example.com/llama",
    );
    let search = StubSearch::new(vec![Ok(first_results()), Ok(second_results())]);

    let mut pipeline = SearchPipeline::new(
        INPUT,
        SearchAgents::new(terms.clone(), selection.clone(), urls.clone()),
        search.clone(),
        TraceRecorder::from_backend(backend.clone()),
    );
    let trace = trace();
    let outcome = pipeline.run(&trace).await.unwrap();

    assert_eq!(outcome.query, "llama 3 bedrock price");
    assert_eq!(outcome.refined_query, "bedrock llama 3 pricing per token");
    assert_eq!(
        outcome.urls,
        vec![
            "https://aws.amazon.com/bedrock/pricing/",
            "http://www.example.com/llama",
        ]
    );
    assert_eq!(pipeline.stage(), PipelineStage::Completed);

    let terms_contexts = terms.contexts();
    assert_eq!(terms_contexts.len(), 1);
    assert_eq!(terms_contexts[0].len(), 1);
    assert_eq!(terms_contexts[0]["input"], json!(INPUT));

    let selection_contexts = selection.contexts();
    assert_eq!(selection_contexts.len(), 1);
    let mut keys: Vec<&String> = selection_contexts[0].keys().collect();
    keys.sort();
    assert_eq!(keys, ["input", "results"]);
    assert_eq!(selection_contexts[0]["input"], json!(INPUT));
    assert_eq!(
        selection_contexts[0]["results"],
        serde_json::to_value(first_results()).unwrap()
    );

    let urls_contexts = urls.contexts();
    assert_eq!(urls_contexts[0].len(), 2);
    assert_eq!(
        urls_contexts[0]["results"],
        serde_json::to_value(second_results()).unwrap()
    );

    assert_eq!(
        search.calls(),
        vec![
            ("llama 3 bedrock price".to_string(), 15, true),
            ("bedrock llama 3 pricing per token".to_string(), 15, true),
        ]
    );

    let trace_id = trace.trace_id().unwrap();
    let closed = backend.closed(trace_id).unwrap();
    assert_eq!(closed.status, TraceStatus::Success);
    assert_eq!(closed.output, outcome.trace_output());
}

#[tokio::test]
async fn test_each_agent_records_one_generation() {
    let backend = InMemoryBackend::new();
    let recorder = TraceRecorder::from_backend(backend.clone());
    let provider = QueuedProvider {
        replies: Mutex::new(
            vec![
                "\"llama 3 bedrock price\"".to_string(),
                "bedrock llama 3 pricing".to_string(),
                "https://aws.amazon.com/bedrock/pricing/".to_string(),
            ]
            .into(),
        ),
    };
    let registry = ProviderRegistry::new().with_client(provider);
    let agents = SearchAgents::from_registry(
        &registry,
        Arc::new(PromptRenderer::default()),
        &recorder,
        ConsoleReporter::quiet(),
    )
    .unwrap();
    let search = StubSearch::new(vec![Ok(first_results()), Ok(second_results())]);

    let mut pipeline = SearchPipeline::new(INPUT, agents, search, recorder);
    let trace = trace();
    let outcome = pipeline.run(&trace).await.unwrap();
    assert_eq!(outcome.urls, vec!["https://aws.amazon.com/bedrock/pricing/"]);

    assert_eq!(backend.trace_ids().len(), 1);
    let trace_id = trace.trace_id().unwrap();
    let names: Vec<String> = backend
        .generations(trace_id)
        .into_iter()
        .map(|g| g.name)
        .collect();
    assert_eq!(
        names,
        ["TermsToSearchAgent", "ResultsSelectionAgent", "ResultsUrlsAgent"]
    );
    assert!(backend
        .generations(trace_id)
        .iter()
        .all(|g| g.model == "claude-3-sonnet-20240229"));
    assert_eq!(backend.finished_generations(trace_id).len(), 3);
}

#[tokio::test]
async fn test_failure_closes_trace_with_error() {
    let backend = InMemoryBackend::new();
    let urls = StubAgent::replying("ResultsUrlsAgent", "https://never.used");
    let mut pipeline = SearchPipeline::new(
        INPUT,
        SearchAgents::new(
            StubAgent::replying("TermsToSearchAgent", "\"q\""),
            StubAgent::failing("ResultsSelectionAgent", "model unavailable"),
            urls.clone(),
        ),
        StubSearch::new(vec![Ok(first_results())]),
        TraceRecorder::from_backend(backend.clone()),
    );
    let trace = trace();

    let err = pipeline.run(&trace).await.unwrap_err();
    assert!(matches!(err, AgentError::ProviderInvocationError(_)));
    assert_eq!(pipeline.stage(), PipelineStage::Failed);
    assert!(urls.contexts().is_empty());

    let closed = backend.closed(trace.trace_id().unwrap()).unwrap();
    match closed.status {
        TraceStatus::Error(message) => assert!(message.contains("model unavailable")),
        other => panic!("Expected error status, got {:?}", other),
    }
}

#[tokio::test]
async fn test_search_failure_is_a_collaborator_error() {
    let backend = InMemoryBackend::new();
    let mut pipeline = SearchPipeline::new(
        INPUT,
        SearchAgents::new(
            StubAgent::replying("TermsToSearchAgent", "\"q\""),
            StubAgent::replying("ResultsSelectionAgent", "r"),
            StubAgent::replying("ResultsUrlsAgent", "u"),
        ),
        StubSearch::new(vec![Err(SearchError::BlockedError("429".into()))]),
        TraceRecorder::from_backend(backend.clone()),
    );
    let trace = trace();

    let err = pipeline.run(&trace).await.unwrap_err();
    assert!(matches!(
        err,
        AgentError::SearchCollaboratorError(SearchError::BlockedError(_))
    ));
    assert!(!backend
        .closed(trace.trace_id().unwrap())
        .unwrap()
        .status
        .is_success());
}

#[tokio::test]
async fn test_pipeline_runs_once() {
    let backend = InMemoryBackend::new();
    let mut pipeline = SearchPipeline::new(
        INPUT,
        SearchAgents::new(
            StubAgent::replying("TermsToSearchAgent", "\"q\""),
            StubAgent::replying("ResultsSelectionAgent", "r"),
            StubAgent::replying("ResultsUrlsAgent", "u"),
        ),
        StubSearch::new(vec![]),
        TraceRecorder::from_backend(backend.clone()),
    )
    .with_config(PipelineConfig::default().with_result_count(3));

    pipeline.run(&trace()).await.unwrap();
    let err = pipeline.run(&trace()).await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidConfiguration(_)));
    assert_eq!(backend.trace_ids().len(), 1);
}

#[tokio::test]
async fn test_trace_already_opened_fails_before_any_stage() {
    let backend = InMemoryBackend::new();
    let terms = StubAgent::replying("TermsToSearchAgent", "\"q\"");
    let mut pipeline = SearchPipeline::new(
        INPUT,
        SearchAgents::new(
            terms.clone(),
            StubAgent::replying("ResultsSelectionAgent", "r"),
            StubAgent::replying("ResultsUrlsAgent", "u"),
        ),
        StubSearch::new(vec![]),
        TraceRecorder::from_backend(backend.clone()),
    );
    let trace = trace();
    trace.set_trace_id("existing").unwrap();

    let err = pipeline.run(&trace).await.unwrap_err();
    assert!(matches!(err, AgentError::MonitoringError(_)));
    assert!(terms.contexts().is_empty());
    assert!(backend.events().is_empty());
}

#[tokio::test]
async fn test_run_task_reports_and_returns() {
    let backend = InMemoryBackend::new();
    let mut pipeline = SearchPipeline::new(
        INPUT,
        SearchAgents::new(
            StubAgent::replying("TermsToSearchAgent", "'q'"),
            StubAgent::replying("ResultsSelectionAgent", "r"),
            StubAgent::replying("ResultsUrlsAgent", "see https://a.b"),
        ),
        StubSearch::new(vec![]),
        TraceRecorder::from_backend(backend),
    );
    assert_eq!(pipeline.context(), format!("Request: {}", INPUT));
    assert_ne!(pipeline.finished_success(), pipeline.finished_failed());

    let outcome = run_task(&mut pipeline, &trace(), &ConsoleReporter::quiet())
        .await
        .unwrap();
    assert_eq!(outcome.query, "q");
    assert_eq!(outcome.urls, vec!["https://a.b"]);
    assert_eq!(pipeline.stage().to_string(), "Completed");
}
