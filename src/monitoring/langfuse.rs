//! Langfuse backend over the public ingestion API.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    GenerationEnd, GenerationStart, MonitoringError, ObservabilityBackend, SpanHandle,
    TraceClose, TraceRequest, TraceStatus,
};

pub const DEFAULT_LANGFUSE_HOST: &str = "https://cloud.langfuse.com";

#[derive(Debug, Clone)]
pub struct LangfuseConfig {
    pub public_key: String,
    pub secret_key: SecretString,
    pub host: String,
    pub timeout: Duration,
}

impl LangfuseConfig {
    pub fn new<P: Into<String>, S: Into<String>>(public_key: P, secret_key: S) -> Self {
        Self {
            public_key: public_key.into(),
            secret_key: SecretString::from(secret_key.into()),
            host: DEFAULT_LANGFUSE_HOST.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Reads `LANGFUSE_PUBLIC_KEY`, `LANGFUSE_SECRET_KEY` and `LANGFUSE_HOST`.
    pub fn from_env() -> Result<Self, MonitoringError> {
        let public_key = std::env::var("LANGFUSE_PUBLIC_KEY")
            .map_err(|_| MonitoringError::ConfigError("LANGFUSE_PUBLIC_KEY is not set".into()))?;
        let secret_key = std::env::var("LANGFUSE_SECRET_KEY")
            .map_err(|_| MonitoringError::ConfigError("LANGFUSE_SECRET_KEY is not set".into()))?;

        let mut config = Self::new(public_key, secret_key);
        if let Ok(host) = std::env::var("LANGFUSE_HOST") {
            config = config.with_host(host);
        }
        Ok(config)
    }

    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ingestion_url(&self) -> String {
        format!("{}/api/public/ingestion", self.host.trim_end_matches('/'))
    }

    fn authorization(&self) -> String {
        let credentials = format!("{}:{}", self.public_key, self.secret_key.expose_secret());
        format!("Basic {}", STANDARD.encode(credentials))
    }
}

#[derive(Debug, Clone)]
pub struct LangfuseClient {
    config: LangfuseConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct IngestionResponse {
    #[serde(default)]
    errors: Vec<IngestionError>,
}

#[derive(Debug, Deserialize)]
struct IngestionError {
    #[serde(default)]
    id: String,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    message: Option<String>,
}

impl LangfuseClient {
    pub fn new(config: LangfuseConfig) -> Result<Self, MonitoringError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> Result<Self, MonitoringError> {
        Self::new(LangfuseConfig::from_env()?)
    }

    pub fn config(&self) -> &LangfuseConfig {
        &self.config
    }

    /// Send one batch of events. Any per-event error fails the whole call.
    async fn ingest(&self, events: Vec<Value>) -> Result<(), MonitoringError> {
        let response = self
            .client
            .post(self.config.ingestion_url())
            .header("Authorization", self.config.authorization())
            .json(&json!({ "batch": events }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MonitoringError::BackendError(format!(
                "Langfuse returned status {}: {}",
                status, body
            )));
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(());
        }
        let parsed: IngestionResponse = serde_json::from_str(&body)
            .map_err(|e| MonitoringError::BackendError(format!("invalid ingestion response: {}", e)))?;
        if let Some(error) = parsed.errors.first() {
            return Err(MonitoringError::BackendError(format!(
                "event {} rejected with status {}: {}",
                error.id,
                error.status,
                error.message.as_deref().unwrap_or("unknown error")
            )));
        }
        Ok(())
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn event(event_type: &str, body: Value) -> Value {
    json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "type": event_type,
        "timestamp": now(),
        "body": body,
    })
}

#[async_trait]
impl ObservabilityBackend for LangfuseClient {
    async fn open_trace(&self, request: TraceRequest) -> Result<String, MonitoringError> {
        let trace_id = uuid::Uuid::new_v4().to_string();
        self.ingest(vec![event(
            "trace-create",
            json!({
                "id": trace_id,
                "name": request.name,
                "sessionId": request.session_id,
                "userId": request.user_id,
                "tags": request.tags,
                "input": request.input,
                "timestamp": now(),
            }),
        )])
        .await?;
        Ok(trace_id)
    }

    async fn start_generation(
        &self,
        trace_id: &str,
        start: &GenerationStart,
    ) -> Result<SpanHandle, MonitoringError> {
        let generation_id = uuid::Uuid::new_v4().to_string();
        self.ingest(vec![event(
            "generation-create",
            json!({
                "id": generation_id,
                "traceId": trace_id,
                "name": start.name,
                "model": start.model,
                "modelParameters": start.model_parameters,
                "input": start.input,
                "startTime": now(),
            }),
        )])
        .await?;
        Ok(SpanHandle {
            trace_id: trace_id.to_string(),
            generation_id,
        })
    }

    async fn end_generation(
        &self,
        handle: &SpanHandle,
        end: &GenerationEnd,
    ) -> Result<(), MonitoringError> {
        self.ingest(vec![event(
            "generation-update",
            json!({
                "id": handle.generation_id,
                "traceId": handle.trace_id,
                "output": end.output,
                "endTime": now(),
                "usage": {
                    "input": end.usage.input,
                    "output": end.usage.output,
                    "total": end.usage.total,
                    "unit": "TOKENS",
                },
            }),
        )])
        .await
    }

    async fn fail_generation(
        &self,
        handle: &SpanHandle,
        message: &str,
    ) -> Result<(), MonitoringError> {
        self.ingest(vec![event(
            "generation-update",
            json!({
                "id": handle.generation_id,
                "traceId": handle.trace_id,
                "endTime": now(),
                "level": "ERROR",
                "statusMessage": message,
            }),
        )])
        .await
    }

    // Langfuse upserts traces by id, so closing is another trace-create.
    async fn close_trace(&self, trace_id: &str, close: &TraceClose) -> Result<(), MonitoringError> {
        let metadata = match &close.status {
            TraceStatus::Success => json!({"status": "success"}),
            TraceStatus::Error(message) => json!({"status": "error", "error": message}),
        };
        self.ingest(vec![event(
            "trace-create",
            json!({
                "id": trace_id,
                "output": close.output,
                "metadata": metadata,
            }),
        )])
        .await
    }
}
