use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitoringError {
    #[error("Trace has not been opened yet")]
    TraceNotOpened,

    #[error("Trace is already open with id {0}")]
    TraceAlreadyOpened(String),

    #[error("Monitoring request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Monitoring backend error: {0}")]
    BackendError(String),

    #[error("Monitoring configuration error: {0}")]
    ConfigError(String),
}
