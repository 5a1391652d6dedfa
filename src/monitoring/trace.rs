use std::sync::OnceLock;

use super::MonitoringError;

/// Caller-owned identity of one pipeline run.
///
/// The trace id is written once, when the trace is opened, and never changes
/// after that.
#[derive(Debug, Default)]
pub struct MonitoringTrace {
    session_id: String,
    user_id: String,
    tags: Vec<String>,
    trace_id: OnceLock<String>,
}

impl MonitoringTrace {
    /// Tags keep insertion order; repeated tags are dropped.
    pub fn new<S, U, I, T>(session_id: S, user_id: U, tags: I) -> Self
    where
        S: Into<String>,
        U: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for tag in tags.into_iter().map(Into::into) {
            if !unique.contains(&tag) {
                unique.push(tag);
            }
        }

        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            tags: unique,
            trace_id: OnceLock::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.get().map(String::as_str)
    }

    pub fn is_open(&self) -> bool {
        self.trace_id.get().is_some()
    }

    pub fn set_trace_id<S: Into<String>>(&self, trace_id: S) -> Result<(), MonitoringError> {
        self.trace_id.set(trace_id.into()).map_err(|_| {
            MonitoringError::TraceAlreadyOpened(self.trace_id().unwrap_or_default().to_string())
        })
    }

    /// The trace id, or [`MonitoringError::TraceNotOpened`].
    pub fn require_trace_id(&self) -> Result<&str, MonitoringError> {
        self.trace_id().ok_or(MonitoringError::TraceNotOpened)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_deduplicated_in_order() {
        let trace = MonitoringTrace::new("s", "u", ["test", "search", "test", "web"]);
        assert_eq!(trace.tags(), ["test", "search", "web"]);
    }

    #[test]
    fn test_trace_id_written_once() {
        let trace = MonitoringTrace::new("1", "1", ["test"]);
        assert!(!trace.is_open());
        assert!(matches!(
            trace.require_trace_id(),
            Err(MonitoringError::TraceNotOpened)
        ));

        trace.set_trace_id("trace-1").unwrap();
        assert_eq!(trace.trace_id(), Some("trace-1"));

        let err = trace.set_trace_id("trace-2").unwrap_err();
        assert!(matches!(err, MonitoringError::TraceAlreadyOpened(ref id) if id == "trace-1"));
        assert_eq!(trace.trace_id(), Some("trace-1"));
    }
}
