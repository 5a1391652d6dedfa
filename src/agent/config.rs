use serde::{Deserialize, Serialize};

use crate::{
    agent::AgentError,
    language_models::LlmModel,
    prompt::{RESULTS_SELECTION_TEMPLATE, RESULTS_URLS_TEMPLATE, TERMS_TO_SEARCH_TEMPLATE},
};

/// How a reply is turned into a [`NormalizedResult`](crate::agent::NormalizedResult).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizationMode {
    #[default]
    Raw,
    Boolean,
    FlatList,
    SingleRecord(Vec<String>),
    MultiRecord(Vec<String>),
}

/// Fixed description of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Reported as the generation name.
    pub name: String,
    pub model: LlmModel,
    pub temperature: f32,
    pub template: String,
    pub mode: NormalizationMode,
}

impl AgentConfig {
    pub fn new<N: Into<String>, T: Into<String>>(name: N, model: LlmModel, template: T) -> Self {
        Self {
            name: name.into(),
            model,
            temperature: 0.5,
            template: template.into(),
            mode: NormalizationMode::Raw,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_mode(mut self, mode: NormalizationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Turns a request into a quoted search query.
    pub fn terms_to_search() -> Self {
        Self::new("TermsToSearchAgent", LlmModel::Claude3Sonnet, TERMS_TO_SEARCH_TEMPLATE)
            .with_temperature(0.4)
    }

    /// Rewrites the query from a first page of results.
    pub fn results_selection() -> Self {
        Self::new(
            "ResultsSelectionAgent",
            LlmModel::Claude3Sonnet,
            RESULTS_SELECTION_TEMPLATE,
        )
        .with_temperature(0.4)
    }

    /// Picks the result URLs worth reading.
    pub fn results_urls() -> Self {
        Self::new("ResultsUrlsAgent", LlmModel::Claude3Sonnet, RESULTS_URLS_TEMPLATE)
            .with_temperature(0.4)
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.name.trim().is_empty() {
            return Err(AgentError::InvalidConfiguration("agent name is empty".into()));
        }
        if self.template.trim().is_empty() {
            return Err(AgentError::InvalidConfiguration(format!(
                "agent {} has no template",
                self.name
            )));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(AgentError::InvalidConfiguration(format!(
                "agent {} has temperature {} outside 0..=2",
                self.name, self.temperature
            )));
        }
        match &self.mode {
            NormalizationMode::SingleRecord(fields) | NormalizationMode::MultiRecord(fields)
                if fields.is_empty() || fields.iter().any(|f| f.trim().is_empty()) =>
            {
                Err(AgentError::InvalidConfiguration(format!(
                    "agent {} has a record mode without field names",
                    self.name
                )))
            }
            _ => Ok(()),
        }
    }
}
