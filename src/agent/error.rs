use thiserror::Error;

use crate::{
    language_models::LLMError, monitoring::MonitoringError, prompt::PromptError,
    tools::SearchError,
};

#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error("Unsupported model family: {0}")]
    UnsupportedModelFamily(String),

    #[error("Provider invocation failed: {0}")]
    ProviderInvocationError(#[from] LLMError),

    #[error("Search failed: {0}")]
    SearchCollaboratorError(#[from] SearchError),

    #[error("Monitoring error: {0}")]
    MonitoringError(#[from] MonitoringError),

    #[error("Script execution failed: {0}")]
    ScriptExecutionError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
