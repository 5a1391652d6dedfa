use async_openai::error::OpenAIError;
use reqwest::Error as ReqwestError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("OpenAI error: {0}")]
    OpenAIError(#[from] OpenAIError),

    #[error("Network request failed: {0}")]
    RequestError(#[from] ReqwestError),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeError(#[from] SerdeJsonError),

    #[error("Provider {provider} returned status {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {0}")]
    RateLimited(String),

    #[error("Error parsing provider response: {0}")]
    ParsingError(String),

    #[error("Missing credentials: {0}")]
    CredentialsError(String),

    #[error("Error: {0}")]
    OtherError(String),
}
