use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::{
    agent::{AgentConfig, AgentError, NormalizedResult, ResponseNormalizer},
    console::ConsoleReporter,
    language_models::{ModelParams, ProviderClient, Usage},
    monitoring::{GenerationSpan, GenerationStart, MonitoringTrace, TraceRecorder},
    prompt::{PromptArgs, PromptRenderer},
};

#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// Render, invoke and normalize once, recording the call under `trace`.
    async fn run(
        &self,
        trace: &MonitoringTrace,
        context: &PromptArgs,
    ) -> Result<NormalizedResult, AgentError>;
}

/// Agent driven by a prompt template and one model.
///
/// Built with [`PromptAgentBuilder`](crate::agent::PromptAgentBuilder), which
/// resolves the provider client for the model's family up front.
pub struct PromptAgent {
    pub(crate) config: AgentConfig,
    pub(crate) provider: Arc<dyn ProviderClient>,
    pub(crate) renderer: Arc<PromptRenderer>,
    pub(crate) recorder: TraceRecorder,
    pub(crate) normalizer: ResponseNormalizer,
    pub(crate) reporter: ConsoleReporter,
}

impl PromptAgent {
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Render the template and return the model's raw reply.
    pub async fn reply(
        &self,
        trace: &MonitoringTrace,
        context: &PromptArgs,
    ) -> Result<String, AgentError> {
        let prompt = self.renderer.render(&self.config.template, context)?;
        log::debug!("{} prompt:\n{}", self.config.name, prompt);
        self.reporter.prompt(&prompt);

        self.invoke(trace, &prompt).await
    }

    /// Call the model with `prompt` inside one generation span.
    pub async fn invoke(&self, trace: &MonitoringTrace, prompt: &str) -> Result<String, AgentError> {
        let model = self.config.model;
        let span = self
            .recorder
            .start_generation(
                trace,
                GenerationStart {
                    name: self.config.name.clone(),
                    model: model.reporting_name().to_string(),
                    model_parameters: json!({ "temperature": reported_temperature(self.config.temperature) }),
                    input: json!([{ "role": "system", "content": prompt }]),
                },
            )
            .await?;

        let params = ModelParams {
            temperature: self.config.temperature,
        };
        let reply = match self.provider.invoke(model.model_id(), prompt, &params).await {
            Ok(reply) => reply,
            Err(e) => return Err(fail_span(span, e.into()).await),
        };

        let Some(usage) = Usage::from_metadata(model.family(), &reply.response_metadata) else {
            let err = AgentError::UnsupportedModelFamily(format!(
                "{} reply for {} has no usage under `{}`",
                model.family(),
                model.model_id(),
                model.family().usage_field()
            ));
            return Err(fail_span(span, err).await);
        };

        span.end(reply.content.clone(), usage).await?;

        log::debug!(
            "{} reply ({} tokens):\n{}",
            self.config.name,
            usage.total,
            reply.content
        );
        self.reporter.response(&reply.content);
        Ok(reply.content)
    }
}

#[async_trait]
impl Agent for PromptAgent {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn run(
        &self,
        trace: &MonitoringTrace,
        context: &PromptArgs,
    ) -> Result<NormalizedResult, AgentError> {
        let reply = self.reply(trace, context).await?;
        Ok(self.normalizer.normalize(&reply))
    }
}

impl std::fmt::Debug for PromptAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptAgent")
            .field("config", &self.config)
            .field("family", &self.provider.family())
            .finish()
    }
}

/// Mark the span failed and hand back `err`. A failure to record it is only logged.
async fn fail_span(span: GenerationSpan, err: AgentError) -> AgentError {
    let name = span.name().to_string();
    if let Err(e) = span.fail(err.to_string()).await {
        log::warn!("Failed to end generation {}: {}", name, e);
    }
    err
}

/// `0.4f32` as `0.4`, not `0.4000000059604645`.
fn reported_temperature(temperature: f32) -> f64 {
    temperature
        .to_string()
        .parse()
        .unwrap_or_else(|_| f64::from(temperature))
}
