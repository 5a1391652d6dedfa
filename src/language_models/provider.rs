use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    bedrock::{BedrockBase, BedrockChat, BedrockConfig},
    openai::{OpenAIChat, OpenAICompletion},
    LLMError, ModelFamily,
};

/// Sampling parameters passed on every call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub temperature: f32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self { temperature: 0.5 }
    }
}

/// Reply text plus the provider-shaped metadata it came with.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    pub content: String,
    pub response_metadata: Value,
}

/// Token counts for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl Usage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }

    /// Read usage from `metadata[family.usage_field()]`.
    ///
    /// Accepts the OpenAI (`prompt_tokens`), Anthropic (`input_tokens`) and Bedrock
    /// invocation metric (`input_token_count`) spellings. Returns `None` when the field
    /// is missing or carries no token counts.
    pub fn from_metadata(family: ModelFamily, metadata: &Value) -> Option<Self> {
        let usage = metadata.get(family.usage_field())?.as_object()?;
        let count = |keys: &[&str]| keys.iter().find_map(|k| usage.get(*k).and_then(Value::as_u64));

        let input = count(&["prompt_tokens", "input_tokens", "input_token_count", "inputTokenCount"])?;
        let output = count(&[
            "completion_tokens",
            "output_tokens",
            "output_token_count",
            "outputTokenCount",
        ])?;
        let total = count(&["total_tokens"]).unwrap_or(input + output);

        Some(Self {
            input,
            output,
            total,
        })
    }
}

/// A client able to run a prompt against one model family.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn family(&self) -> ModelFamily;

    async fn invoke(
        &self,
        model_id: &str,
        prompt: &str,
        params: &ModelParams,
    ) -> Result<ProviderReply, LLMError>;
}

/// Family-keyed provider clients, filled once at startup.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<ModelFamily, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under its own family, replacing any previous one.
    pub fn with_client<C: ProviderClient + 'static>(mut self, client: C) -> Self {
        self.register(Arc::new(client));
        self
    }

    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        self.clients.insert(client.family(), client);
    }

    pub fn get(&self, family: ModelFamily) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(&family).cloned()
    }

    pub fn families(&self) -> Vec<ModelFamily> {
        let mut families: Vec<ModelFamily> = self.clients.keys().copied().collect();
        families.sort_by_key(|f| f.to_string());
        families
    }

    /// OpenAI clients when `OPENAI_API_KEY` is set, Bedrock clients when AWS keys are set.
    pub fn from_env() -> Self {
        let mut registry = Self::new();

        if std::env::var("OPENAI_API_KEY").is_ok() {
            registry.register(Arc::new(OpenAICompletion::default()));
            registry.register(Arc::new(OpenAIChat::default()));
        } else {
            log::debug!("OPENAI_API_KEY not set, OpenAI models unavailable");
        }

        match BedrockConfig::from_env() {
            Ok(config) => match (BedrockBase::new(config.clone()), BedrockChat::new(config)) {
                (Ok(base), Ok(chat)) => {
                    registry.register(Arc::new(base));
                    registry.register(Arc::new(chat));
                }
                (Err(e), _) | (_, Err(e)) => log::warn!("Bedrock client unavailable: {}", e),
            },
            Err(e) => log::debug!("Bedrock models unavailable: {}", e),
        }

        registry
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("families", &self.families())
            .finish()
    }
}
