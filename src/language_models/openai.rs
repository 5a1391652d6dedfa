//! OpenAI completion and chat clients built on `async-openai`.
//!
//! Both read `OPENAI_API_KEY` (and `OPENAI_BASE_URL`) through
//! [`OpenAIConfig::default`] unless a config is passed explicitly.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::json;

use super::{LLMError, ModelFamily, ModelParams, ProviderClient, ProviderReply};

/// Completion models default to 16 output tokens; the search prompts need more.
const COMPLETION_MAX_TOKENS: u32 = 1024;

#[derive(Clone)]
pub struct OpenAICompletion {
    client: Client<OpenAIConfig>,
}

impl OpenAICompletion {
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::with_config(config),
        }
    }
}

impl Default for OpenAICompletion {
    fn default() -> Self {
        Self::new(OpenAIConfig::default())
    }
}

#[async_trait]
impl ProviderClient for OpenAICompletion {
    fn family(&self) -> ModelFamily {
        ModelFamily::OpenAICompletion
    }

    async fn invoke(
        &self,
        model_id: &str,
        prompt: &str,
        params: &ModelParams,
    ) -> Result<ProviderReply, LLMError> {
        let request = CreateCompletionRequestArgs::default()
            .model(model_id)
            .prompt(prompt)
            .temperature(params.temperature)
            .max_tokens(COMPLETION_MAX_TOKENS)
            .build()?;

        let response = self.client.completions().create(request).await?;
        let choice = response
            .choices
            .first()
            .ok_or_else(|| LLMError::ParsingError("completion response has no choices".into()))?;

        Ok(ProviderReply {
            content: choice.text.clone(),
            response_metadata: json!({
                "model": response.model,
                "usage": serde_json::to_value(&response.usage)?,
            }),
        })
    }
}

#[derive(Clone)]
pub struct OpenAIChat {
    client: Client<OpenAIConfig>,
}

impl OpenAIChat {
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::with_config(config),
        }
    }
}

impl Default for OpenAIChat {
    fn default() -> Self {
        Self::new(OpenAIConfig::default())
    }
}

#[async_trait]
impl ProviderClient for OpenAIChat {
    fn family(&self) -> ModelFamily {
        ModelFamily::OpenAIChat
    }

    async fn invoke(
        &self,
        model_id: &str,
        prompt: &str,
        params: &ModelParams,
    ) -> Result<ProviderReply, LLMError> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(model_id)
            .messages(vec![ChatCompletionRequestMessage::from(message)])
            .temperature(params.temperature)
            .build()?;

        let response = self.client.chat().create(request).await?;
        let choice = response
            .choices
            .first()
            .ok_or_else(|| LLMError::ParsingError("chat response has no choices".into()))?;
        let content = choice
            .message
            .content
            .clone()
            .ok_or_else(|| LLMError::ParsingError("chat response has no text content".into()))?;

        Ok(ProviderReply {
            content,
            response_metadata: json!({
                "model": response.model,
                "finish_reason": serde_json::to_value(&choice.finish_reason)?,
                "token_usage": serde_json::to_value(&response.usage)?,
            }),
        })
    }
}
