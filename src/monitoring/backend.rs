use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::MonitoringError;
use crate::language_models::Usage;

/// Everything needed to open a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRequest {
    pub name: String,
    pub session_id: String,
    pub user_id: String,
    pub tags: Vec<String>,
    pub input: Value,
}

/// Opening half of a generation span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStart {
    pub name: String,
    /// Reporting name of the model, not the provider id.
    pub model: String,
    pub model_parameters: Value,
    pub input: Value,
}

/// Closing half of a generation span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationEnd {
    pub output: String,
    pub usage: Usage,
}

/// Backend reference to an open generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpanHandle {
    pub trace_id: String,
    pub generation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceStatus {
    Success,
    Error(String),
}

impl TraceStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TraceStatus::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceClose {
    pub output: Value,
    pub status: TraceStatus,
}

impl TraceClose {
    pub fn success(output: Value) -> Self {
        Self {
            output,
            status: TraceStatus::Success,
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            output: Value::Null,
            status: TraceStatus::Error(message.into()),
        }
    }
}

/// Where traces and generations are sent.
#[async_trait]
pub trait ObservabilityBackend: Send + Sync {
    /// Returns the new trace id.
    async fn open_trace(&self, request: TraceRequest) -> Result<String, MonitoringError>;

    async fn start_generation(
        &self,
        trace_id: &str,
        start: &GenerationStart,
    ) -> Result<SpanHandle, MonitoringError>;

    async fn end_generation(
        &self,
        handle: &SpanHandle,
        end: &GenerationEnd,
    ) -> Result<(), MonitoringError>;

    /// End a generation whose model call failed.
    async fn fail_generation(
        &self,
        handle: &SpanHandle,
        message: &str,
    ) -> Result<(), MonitoringError>;

    async fn close_trace(&self, trace_id: &str, close: &TraceClose) -> Result<(), MonitoringError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitoringEvent {
    TraceOpened {
        trace_id: String,
        request: TraceRequest,
    },
    GenerationStarted {
        handle: SpanHandle,
        start: GenerationStart,
    },
    GenerationEnded {
        handle: SpanHandle,
        end: GenerationEnd,
    },
    GenerationFailed {
        handle: SpanHandle,
        message: String,
    },
    TraceClosed {
        trace_id: String,
        close: TraceClose,
    },
}

/// Keeps every event in memory. Used offline and in tests; clones share the
/// same event log.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    events: Arc<Mutex<Vec<MonitoringEvent>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MonitoringEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Generations started under `trace_id`, in order.
    pub fn generations(&self, trace_id: &str) -> Vec<GenerationStart> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                MonitoringEvent::GenerationStarted { handle, start } if handle.trace_id == trace_id => {
                    Some(start)
                }
                _ => None,
            })
            .collect()
    }

    /// Generations closed under `trace_id`, in order.
    pub fn finished_generations(&self, trace_id: &str) -> Vec<GenerationEnd> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                MonitoringEvent::GenerationEnded { handle, end } if handle.trace_id == trace_id => {
                    Some(end)
                }
                _ => None,
            })
            .collect()
    }

    /// Error messages of generations that failed under `trace_id`, in order.
    pub fn failed_generations(&self, trace_id: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                MonitoringEvent::GenerationFailed { handle, message } if handle.trace_id == trace_id => {
                    Some(message)
                }
                _ => None,
            })
            .collect()
    }

    /// Generations under `trace_id` that were started but neither ended nor failed.
    pub fn open_generations(&self, trace_id: &str) -> Vec<SpanHandle> {
        let mut open = Vec::new();
        for event in self.events() {
            match event {
                MonitoringEvent::GenerationStarted { handle, .. } if handle.trace_id == trace_id => {
                    open.push(handle)
                }
                MonitoringEvent::GenerationEnded { handle, .. }
                | MonitoringEvent::GenerationFailed { handle, .. } => {
                    open.retain(|h| h != &handle)
                }
                _ => {}
            }
        }
        open
    }

    pub fn trace_ids(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                MonitoringEvent::TraceOpened { trace_id, .. } => Some(trace_id),
                _ => None,
            })
            .collect()
    }

    /// How the trace was closed, if it was.
    pub fn closed(&self, trace_id: &str) -> Option<TraceClose> {
        self.events().into_iter().find_map(|event| match event {
            MonitoringEvent::TraceClosed { trace_id: id, close } if id == trace_id => Some(close),
            _ => None,
        })
    }

    fn push(&self, event: MonitoringEvent) -> Result<(), MonitoringError> {
        self.events
            .lock()
            .map_err(|e| MonitoringError::BackendError(e.to_string()))?
            .push(event);
        Ok(())
    }
}

#[async_trait]
impl ObservabilityBackend for InMemoryBackend {
    async fn open_trace(&self, request: TraceRequest) -> Result<String, MonitoringError> {
        let trace_id = uuid::Uuid::new_v4().to_string();
        self.push(MonitoringEvent::TraceOpened {
            trace_id: trace_id.clone(),
            request,
        })?;
        Ok(trace_id)
    }

    async fn start_generation(
        &self,
        trace_id: &str,
        start: &GenerationStart,
    ) -> Result<SpanHandle, MonitoringError> {
        let handle = SpanHandle {
            trace_id: trace_id.to_string(),
            generation_id: uuid::Uuid::new_v4().to_string(),
        };
        self.push(MonitoringEvent::GenerationStarted {
            handle: handle.clone(),
            start: start.clone(),
        })?;
        Ok(handle)
    }

    async fn end_generation(
        &self,
        handle: &SpanHandle,
        end: &GenerationEnd,
    ) -> Result<(), MonitoringError> {
        self.push(MonitoringEvent::GenerationEnded {
            handle: handle.clone(),
            end: end.clone(),
        })
    }

    async fn fail_generation(
        &self,
        handle: &SpanHandle,
        message: &str,
    ) -> Result<(), MonitoringError> {
        self.push(MonitoringEvent::GenerationFailed {
            handle: handle.clone(),
            message: message.to_string(),
        })
    }

    async fn close_trace(&self, trace_id: &str, close: &TraceClose) -> Result<(), MonitoringError> {
        self.push(MonitoringEvent::TraceClosed {
            trace_id: trace_id.to_string(),
            close: close.clone(),
        })
    }
}
