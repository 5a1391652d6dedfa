use std::{process::ExitCode, sync::Arc};

use search_agents::{
    agent::AgentError,
    console::ConsoleReporter,
    language_models::ProviderRegistry,
    monitoring::{InMemoryBackend, LangfuseClient, MonitoringTrace, TraceRecorder},
    pipeline::{run_task, SearchAgents, SearchPipeline},
    prompt::{FileSystemTemplateStore, PromptRenderer, PROMPTS_DIR_ENV},
    tools::{GoogleSearch, GoogleSearchConfig},
};

const INPUT: &str = "no encuentro el precio de llama 3 en bedrock";

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    match run().await {
        Ok(urls) => {
            println!("{:?}", urls);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<Vec<String>, AgentError> {
    let reporter = ConsoleReporter::default();
    let registry = ProviderRegistry::from_env();

    let recorder = match LangfuseClient::from_env() {
        Ok(client) => TraceRecorder::from_backend(client),
        Err(e) => {
            log::warn!("Langfuse unavailable ({}), keeping traces in memory", e);
            TraceRecorder::from_backend(InMemoryBackend::new())
        }
    };

    let renderer = if std::env::var(PROMPTS_DIR_ENV).is_ok() {
        PromptRenderer::new(FileSystemTemplateStore::from_env())
    } else {
        PromptRenderer::default()
    };

    let agents = SearchAgents::from_registry(&registry, Arc::new(renderer), &recorder, reporter)?;
    let search = GoogleSearch::new(GoogleSearchConfig::default())?;

    let mut pipeline = SearchPipeline::new(INPUT, agents, Arc::new(search), recorder);
    let trace = MonitoringTrace::new("1", "1", ["test"]);
    let outcome = run_task(&mut pipeline, &trace, &reporter).await?;

    Ok(outcome.urls)
}
