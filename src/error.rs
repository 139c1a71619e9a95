use std::time::Duration;
use thiserror::Error;
use tokio::sync::AcquireError;

#[derive(Debug, Clone, Error)]
pub enum RunnerError {
    #[error("Discovery failed for adapter '{adapter}': {message}")]
    Discovery { adapter: String, message: String },

    #[error("Capture timed out after {0:?}")]
    CaptureTimeout(Duration),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Invalid screenshot filename: {0}")]
    InvalidFilename(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Comparison engine '{0}' is not registered")]
    UnknownEngine(String),

    #[error("Comparison failed: {0}")]
    Comparison(String),

    #[error("No browser adapter registered for '{0}'")]
    UnknownBrowser(String),

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Browser unavailable")]
    BrowserUnavailable,

    #[error("Page error: {0}")]
    Page(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl RunnerError {
    /// Per-case errors are caught at the task boundary and become result
    /// records; everything else is systemic and aborts the run.
    pub fn is_per_case(&self) -> bool {
        matches!(
            self,
            RunnerError::Discovery { .. }
                | RunnerError::CaptureTimeout(_)
                | RunnerError::Capture(_)
                | RunnerError::InvalidFilename(_)
                | RunnerError::Storage(_)
                | RunnerError::Comparison(_)
                | RunnerError::Page(_)
                | RunnerError::ElementNotFound(_)
                | RunnerError::InvalidUrl(_)
        )
    }
}

impl From<AcquireError> for RunnerError {
    fn from(err: AcquireError) -> Self {
        RunnerError::Scheduler(err.to_string())
    }
}

impl From<std::io::Error> for RunnerError {
    fn from(err: std::io::Error) -> Self {
        RunnerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RunnerError {
    fn from(err: serde_json::Error) -> Self {
        RunnerError::Serialization(err.to_string())
    }
}
