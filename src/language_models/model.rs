use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::agent::AgentError;

/// How a model is reached and where its client reports token usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ModelFamily {
    /// Hosted text-completion models (OpenAI `completions`).
    #[strum(serialize = "openai-completion")]
    OpenAICompletion,
    /// Hosted chat models (OpenAI `chat/completions`).
    #[strum(serialize = "openai-chat")]
    OpenAIChat,
    /// Cloud-hosted base models (Bedrock text prompt body).
    #[strum(serialize = "bedrock-base")]
    BedrockBase,
    /// Cloud-hosted chat models (Bedrock messages body).
    #[strum(serialize = "bedrock-chat")]
    BedrockChat,
}

impl ModelFamily {
    /// Field of the provider's response metadata that carries token usage.
    pub fn usage_field(&self) -> &'static str {
        match self {
            ModelFamily::OpenAICompletion => "usage",
            ModelFamily::OpenAIChat => "token_usage",
            ModelFamily::BedrockBase => "invocation_metrics",
            ModelFamily::BedrockChat => "usage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LlmModel {
    Gpt4Turbo,
    Gpt4,
    Gpt35Turbo,
    Gpt35Turbo16k,
    Gpt35TurboInstruct,
    Claude3Sonnet,
    Claude3Haiku,
    Mistral7b,
    Mixtral8x7b,
}

/// One row of the model table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub model: LlmModel,
    /// Identifier sent to the provider.
    pub model_id: &'static str,
    pub family: ModelFamily,
    /// Stable name reported to the observability backend.
    pub reporting_name: &'static str,
}

pub const MODEL_TABLE: &[ModelSpec] = &[
    ModelSpec {
        model: LlmModel::Gpt4Turbo,
        model_id: "gpt-4-turbo-preview",
        family: ModelFamily::OpenAIChat,
        reporting_name: "gpt-4-turbo",
    },
    ModelSpec {
        model: LlmModel::Gpt4,
        model_id: "gpt-4",
        family: ModelFamily::OpenAIChat,
        reporting_name: "gpt-4",
    },
    ModelSpec {
        model: LlmModel::Gpt35Turbo,
        model_id: "gpt-3.5-turbo",
        family: ModelFamily::OpenAIChat,
        reporting_name: "gpt-3.5-turbo",
    },
    ModelSpec {
        model: LlmModel::Gpt35Turbo16k,
        model_id: "gpt-3.5-turbo-16k",
        family: ModelFamily::OpenAIChat,
        reporting_name: "gpt-3.5-turbo-16k",
    },
    ModelSpec {
        model: LlmModel::Gpt35TurboInstruct,
        model_id: "gpt-3.5-turbo-instruct",
        family: ModelFamily::OpenAICompletion,
        reporting_name: "gpt-3.5-turbo-instruct",
    },
    ModelSpec {
        model: LlmModel::Claude3Sonnet,
        model_id: "anthropic.claude-3-sonnet-20240229-v1:0",
        family: ModelFamily::BedrockChat,
        reporting_name: "claude-3-sonnet-20240229",
    },
    ModelSpec {
        model: LlmModel::Claude3Haiku,
        model_id: "anthropic.claude-3-haiku-20240307-v1:0",
        family: ModelFamily::BedrockChat,
        reporting_name: "claude-3-haiku-20240307",
    },
    ModelSpec {
        model: LlmModel::Mistral7b,
        model_id: "mistral.mistral-7b-instruct-v0:2",
        family: ModelFamily::BedrockBase,
        reporting_name: "mistral-7b-instruct",
    },
    ModelSpec {
        model: LlmModel::Mixtral8x7b,
        model_id: "mistral.mixtral-8x7b-instruct-v0:1",
        family: ModelFamily::BedrockBase,
        reporting_name: "mixtral-8x7b-instruct",
    },
];

impl LlmModel {
    pub fn spec(&self) -> &'static ModelSpec {
        // Every variant has exactly one row; see `test_every_model_has_one_row`.
        MODEL_TABLE
            .iter()
            .find(|spec| spec.model == *self)
            .unwrap_or(&MODEL_TABLE[0])
    }

    pub fn model_id(&self) -> &'static str {
        self.spec().model_id
    }

    pub fn family(&self) -> ModelFamily {
        self.spec().family
    }

    pub fn reporting_name(&self) -> &'static str {
        self.spec().reporting_name
    }

    /// Look a provider model id up in the table.
    pub fn from_model_id(model_id: &str) -> Result<Self, AgentError> {
        MODEL_TABLE
            .iter()
            .find(|spec| spec.model_id == model_id)
            .map(|spec| spec.model)
            .ok_or_else(|| {
                AgentError::UnsupportedModelFamily(format!("no model family for {}", model_id))
            })
    }
}

impl std::fmt::Display for LlmModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.model_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [LlmModel; 9] = [
        LlmModel::Gpt4Turbo,
        LlmModel::Gpt4,
        LlmModel::Gpt35Turbo,
        LlmModel::Gpt35Turbo16k,
        LlmModel::Gpt35TurboInstruct,
        LlmModel::Claude3Sonnet,
        LlmModel::Claude3Haiku,
        LlmModel::Mistral7b,
        LlmModel::Mixtral8x7b,
    ];

    #[test]
    fn test_every_model_has_one_row() {
        assert_eq!(MODEL_TABLE.len(), ALL.len());
        for model in ALL {
            let rows = MODEL_TABLE.iter().filter(|s| s.model == model).count();
            assert_eq!(rows, 1, "{:?}", model);
            assert_eq!(model.spec().model, model);
        }
    }

    #[test]
    fn test_family_dispatch() {
        assert_eq!(LlmModel::Gpt35TurboInstruct.family(), ModelFamily::OpenAICompletion);
        assert_eq!(LlmModel::Gpt4.family(), ModelFamily::OpenAIChat);
        assert_eq!(LlmModel::Mixtral8x7b.family(), ModelFamily::BedrockBase);
        assert_eq!(LlmModel::Claude3Haiku.family(), ModelFamily::BedrockChat);
    }

    #[test]
    fn test_reporting_names_differ_from_provider_ids() {
        assert_eq!(LlmModel::Claude3Sonnet.reporting_name(), "claude-3-sonnet-20240229");
        assert_eq!(
            LlmModel::Claude3Sonnet.model_id(),
            "anthropic.claude-3-sonnet-20240229-v1:0"
        );
        assert_eq!(LlmModel::Gpt4Turbo.reporting_name(), "gpt-4-turbo");
    }

    #[test]
    fn test_from_model_id() {
        assert_eq!(
            LlmModel::from_model_id("mistral.mistral-7b-instruct-v0:2").unwrap(),
            LlmModel::Mistral7b
        );
        let err = LlmModel::from_model_id("meta.llama3-70b-instruct-v1:0").unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedModelFamily(ref m) if m.contains("llama3")));
    }

    #[test]
    fn test_usage_fields() {
        assert_eq!(ModelFamily::OpenAIChat.usage_field(), "token_usage");
        assert_ne!(
            ModelFamily::OpenAIChat.usage_field(),
            ModelFamily::OpenAICompletion.usage_field()
        );
        assert_eq!(ModelFamily::BedrockChat.to_string(), "bedrock-chat");
    }
}
