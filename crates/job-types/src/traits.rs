//! The Job Service abstraction.

use crate::{JobRecord, JobStatusResponse, OptimizationRequest, StartResponse};
use async_trait::async_trait;

/// Remote service that owns optimization jobs.
///
/// Every method is a single request; retries and failure counting live in the poller.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Submit a start request; returns the new job id.
    async fn start(&self, req: &OptimizationRequest) -> Result<StartResponse, JobServiceError>;

    /// Log lines with index >= `since_log_index`, plus current status.
    async fn status(
        &self,
        job_id: &str,
        since_log_index: u64,
    ) -> Result<JobStatusResponse, JobServiceError>;

    /// Ask the service to stop a job. Best effort.
    async fn cancel(&self, job_id: &str) -> Result<(), JobServiceError>;

    /// Prior jobs, newest first.
    async fn history(&self) -> Result<Vec<JobRecord>, JobServiceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum JobServiceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("job service returned {status}{}", detail_suffix(.detail))]
    Status { status: u16, detail: Option<String> },
    #[error("decode error: {0}")]
    Decode(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

impl JobServiceError {
    /// Service-provided detail message, when the failure carried one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            JobServiceError::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}
