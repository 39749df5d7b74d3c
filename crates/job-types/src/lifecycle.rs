//! Job lifecycle: server status values and the client-side reasons for forcing a failure.

use serde::{Deserialize, Serialize};

/// Status of a job as reported by the Job Service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// `completed` and `failed` end polling.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Why the client forced a job to `failed` on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalFailure {
    /// Too many consecutive poll failures.
    Lost,
    /// User cancelled and the service acknowledged (or was not yet asked).
    Cancelled,
    /// User cancelled but the service could not be reached.
    CancelledUnreachable,
}

impl LocalFailure {
    pub fn message(self) -> &'static str {
        match self {
            LocalFailure::Lost => {
                "Lost connection to the optimization job. The server may have restarted or become unreachable; start a new run to continue."
            }
            LocalFailure::Cancelled => "Optimization cancelled by user.",
            LocalFailure::CancelledUnreachable => {
                "Server unreachable; optimization state reset locally."
            }
        }
    }
}

impl std::fmt::Display for LocalFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}
