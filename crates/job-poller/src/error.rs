//! Errors returned by the polling client.

use job_types::JobServiceError;

/// Fallback shown when the service rejects a start without saying why.
pub const START_FAILED_FALLBACK: &str = "Failed to start optimization job";

#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error("invalid optimization request: {0}")]
    InvalidRequest(String),
    #[error("start failed: {0}")]
    StartFailed(String),
    #[error(transparent)]
    Service(#[from] JobServiceError),
}

impl PollerError {
    pub(crate) fn start_failed(err: &JobServiceError) -> Self {
        PollerError::StartFailed(
            err.detail()
                .unwrap_or(START_FAILED_FALLBACK)
                .to_string(),
        )
    }
}
