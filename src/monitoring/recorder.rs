use std::sync::Arc;

use serde_json::Value;

use super::{
    GenerationEnd, GenerationStart, MonitoringError, MonitoringTrace, ObservabilityBackend,
    SpanHandle, TraceClose, TraceRequest,
};
use crate::language_models::Usage;

/// Ties model calls to the caller's [`MonitoringTrace`].
#[derive(Clone)]
pub struct TraceRecorder {
    backend: Arc<dyn ObservabilityBackend>,
}

impl TraceRecorder {
    pub fn new(backend: Arc<dyn ObservabilityBackend>) -> Self {
        Self { backend }
    }

    pub fn from_backend<B: ObservabilityBackend + 'static>(backend: B) -> Self {
        Self::new(Arc::new(backend))
    }

    /// Open the trace and store its id on `trace`.
    pub async fn open(
        &self,
        trace: &MonitoringTrace,
        name: &str,
        input: Value,
    ) -> Result<String, MonitoringError> {
        if let Some(id) = trace.trace_id() {
            return Err(MonitoringError::TraceAlreadyOpened(id.to_string()));
        }

        let trace_id = self
            .backend
            .open_trace(TraceRequest {
                name: name.to_string(),
                session_id: trace.session_id().to_string(),
                user_id: trace.user_id().to_string(),
                tags: trace.tags().to_vec(),
                input,
            })
            .await?;
        trace.set_trace_id(trace_id.clone())?;
        log::info!("Opened trace {} ({})", trace_id, name);
        Ok(trace_id)
    }

    pub async fn start_generation(
        &self,
        trace: &MonitoringTrace,
        start: GenerationStart,
    ) -> Result<GenerationSpan, MonitoringError> {
        let trace_id = trace.require_trace_id()?;
        let handle = self.backend.start_generation(trace_id, &start).await?;
        log::debug!(
            "Started generation {} ({}) on trace {}",
            handle.generation_id,
            start.name,
            trace_id
        );
        Ok(GenerationSpan {
            backend: Arc::clone(&self.backend),
            handle,
            name: start.name,
        })
    }

    pub async fn close(
        &self,
        trace: &MonitoringTrace,
        close: TraceClose,
    ) -> Result<(), MonitoringError> {
        let trace_id = trace.require_trace_id()?;
        self.backend.close_trace(trace_id, &close).await?;
        log::info!("Closed trace {} ({:?})", trace_id, close.status);
        Ok(())
    }
}

impl std::fmt::Debug for TraceRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceRecorder").finish_non_exhaustive()
    }
}

/// One open generation. Ending it consumes the span.
pub struct GenerationSpan {
    backend: Arc<dyn ObservabilityBackend>,
    handle: SpanHandle,
    name: String,
}

impl GenerationSpan {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &SpanHandle {
        &self.handle
    }

    pub async fn end<S: Into<String>>(self, output: S, usage: Usage) -> Result<(), MonitoringError> {
        self.backend
            .end_generation(
                &self.handle,
                &GenerationEnd {
                    output: output.into(),
                    usage,
                },
            )
            .await
    }

    /// End the generation as failed, with `message` as its status.
    pub async fn fail<S: Into<String>>(self, message: S) -> Result<(), MonitoringError> {
        let message = message.into();
        log::debug!(
            "Generation {} ({}) failed: {}",
            self.handle.generation_id,
            self.name,
            message
        );
        self.backend.fail_generation(&self.handle, &message).await
    }
}

impl std::fmt::Debug for GenerationSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationSpan")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
