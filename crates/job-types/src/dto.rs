//! Request and response DTOs for the Job Service HTTP API.

use crate::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Start payload for a prompt-optimization run.
///
/// Opaque to the client apart from `prompt_uri`, which identifies what is being
/// optimized and must not be blank.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    #[serde(default)]
    pub prompt_uri: String,
    #[serde(default = "default_optimizer_model")]
    pub optimizer_model_name: String,
    #[serde(default = "default_num_iterations")]
    pub num_iterations: u32,
    #[serde(default = "default_num_candidates")]
    pub num_candidates: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_name: Option<String>,
    /// Free-form target configuration (endpoint, scorer settings, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<serde_json::Value>,
}

fn default_optimizer_model() -> String {
    "databricks-claude-sonnet-4".to_string()
}

fn default_num_iterations() -> u32 {
    3
}

fn default_num_candidates() -> u32 {
    5
}

impl OptimizationRequest {
    pub fn new(prompt_uri: impl Into<String>) -> Self {
        Self {
            prompt_uri: prompt_uri.into(),
            optimizer_model_name: default_optimizer_model(),
            num_iterations: default_num_iterations(),
            num_candidates: default_num_candidates(),
            judge_name: None,
            target: None,
        }
    }

    /// The job-identifying field is present (non-blank).
    pub fn has_prompt_uri(&self) -> bool {
        !self.prompt_uri.trim().is_empty()
    }
}

/// Body returned by the start endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub job_id: String,
}

/// Error body returned by the Job Service on non-2xx responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub detail: Option<String>,
}

/// Status endpoint body: the log delta since `since_log_index` plus current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    #[serde(default)]
    pub logs: Vec<String>,
    pub log_count: u64,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One entry of the job history (newest-first when listed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub request: OptimizationRequest,
}

impl JobRecord {
    pub fn new(job_id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            created_at: None,
            result: None,
            error: None,
            request: OptimizationRequest::default(),
        }
    }
}
