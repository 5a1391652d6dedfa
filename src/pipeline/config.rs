use serde::{Deserialize, Serialize};
use strum_macros::Display;

pub const DEFAULT_TRACE_NAME: &str = "Search Agent";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Results requested from each search.
    pub result_count: usize,
    /// Ask the search collaborator for titles and descriptions too.
    pub extended_metadata: bool,
    pub trace_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            result_count: 15,
            extended_metadata: true,
            trace_name: DEFAULT_TRACE_NAME.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn with_result_count(mut self, result_count: usize) -> Self {
        self.result_count = result_count;
        self
    }

    pub fn with_extended_metadata(mut self, extended_metadata: bool) -> Self {
        self.extended_metadata = extended_metadata;
        self
    }

    pub fn with_trace_name<S: Into<String>>(mut self, trace_name: S) -> Self {
        self.trace_name = trace_name.into();
        self
    }
}

/// Where a pipeline run is. Moves forward only; `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PipelineStage {
    NotStarted,
    TraceOpened,
    Stage1Done,
    Stage2Done,
    Stage3Done,
    Completed,
    Failed,
}
