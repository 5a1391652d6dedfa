use std::sync::Arc;

use crate::{
    agent::{AgentConfig, AgentError, PromptAgent, ResponseNormalizer},
    console::ConsoleReporter,
    language_models::{ProviderClient, ProviderRegistry},
    monitoring::TraceRecorder,
    prompt::PromptRenderer,
};

/// Builder for [`PromptAgent`].
///
/// The provider client is looked up once here, by the model's family, so an
/// agent whose family has no client fails at build time rather than on first use.
pub struct PromptAgentBuilder {
    config: Option<AgentConfig>,
    provider: Option<Arc<dyn ProviderClient>>,
    registry: Option<ProviderRegistry>,
    renderer: Option<Arc<PromptRenderer>>,
    recorder: Option<TraceRecorder>,
    reporter: Option<ConsoleReporter>,
}

impl PromptAgentBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            provider: None,
            registry: None,
            renderer: None,
            recorder: None,
            reporter: None,
        }
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use this client instead of looking one up in a registry.
    pub fn provider(mut self, provider: Arc<dyn ProviderClient>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn registry(mut self, registry: &ProviderRegistry) -> Self {
        self.registry = Some(registry.clone());
        self
    }

    /// Defaults to a renderer over the embedded templates.
    pub fn renderer(mut self, renderer: Arc<PromptRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn recorder(mut self, recorder: TraceRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn reporter(mut self, reporter: ConsoleReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn build(self) -> Result<PromptAgent, AgentError> {
        let config = self
            .config
            .ok_or_else(|| AgentError::InvalidConfiguration("agent config must be set".into()))?;
        config.validate()?;

        let family = config.model.family();
        let provider = match (self.provider, self.registry) {
            (Some(provider), _) => provider,
            (None, Some(registry)) => registry.get(family).ok_or_else(|| {
                AgentError::UnsupportedModelFamily(format!(
                    "no {} client registered for {}",
                    family,
                    config.model.model_id()
                ))
            })?,
            (None, None) => {
                return Err(AgentError::InvalidConfiguration(
                    "a provider or a provider registry must be set".into(),
                ))
            }
        };
        if provider.family() != family {
            return Err(AgentError::UnsupportedModelFamily(format!(
                "{} needs a {} client, got {}",
                config.model.model_id(),
                family,
                provider.family()
            )));
        }

        let recorder = self
            .recorder
            .ok_or_else(|| AgentError::InvalidConfiguration("trace recorder must be set".into()))?;
        let normalizer = ResponseNormalizer::new(config.mode.clone())?;

        Ok(PromptAgent {
            config,
            provider,
            renderer: self
                .renderer
                .unwrap_or_else(|| Arc::new(PromptRenderer::default())),
            recorder,
            normalizer,
            reporter: self.reporter.unwrap_or_default(),
        })
    }
}

impl Default for PromptAgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
