//! reqwest implementation of [`JobService`].

use job_types::{
    ErrorDetail, JobRecord, JobService, JobServiceError, JobStatusResponse, OptimizationRequest,
    StartResponse,
};
use serde::de::DeserializeOwned;

/// Job Service client scoped to one workshop.
///
/// Routes (relative to `base_url`):
///   POST /workshops/{id}/prompt-optimization
///   GET  /workshops/{id}/prompt-optimization-jobs/{job_id}?since_log_index=N
///   POST /workshops/{id}/prompt-optimization-jobs/{job_id}/cancel
///   GET  /workshops/{id}/prompt-optimization-history
pub struct HttpJobService {
    client: reqwest::Client,
    base_url: String,
    workshop_id: String,
    api_key: Option<String>,
}

impl HttpJobService {
    pub fn new(base_url: String, workshop_id: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            workshop_id,
            api_key,
        }
    }

    pub fn from_env() -> Self {
        let base_url =
            std::env::var("JOB_API_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
        let workshop_id =
            std::env::var("JOB_WORKSHOP_ID").unwrap_or_else(|_| "default".to_string());
        let api_key = std::env::var("JOB_API_KEY").ok();
        Self::new(base_url, workshop_id, api_key)
    }

    fn workshop_url(&self, rest: &str) -> String {
        format!("{}/workshops/{}/{}", self.base_url, self.workshop_id, rest)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => req.bearer_auth(key),
            None => req,
        }
    }

    /// Send, then map non-2xx to `Status` (with the `detail` field when the body has one).
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<String, JobServiceError> {
        let res = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| JobServiceError::Transport(e.to_string()))?;
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| JobServiceError::Transport(e.to_string()))?;
        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorDetail>(&body)
                .ok()
                .and_then(|d| d.detail)
                .filter(|d| !d.is_empty());
            return Err(JobServiceError::Status {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, JobServiceError> {
        let body = self.send(req).await?;
        serde_json::from_str(&body).map_err(|e| JobServiceError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl JobService for HttpJobService {
    async fn start(&self, req: &OptimizationRequest) -> Result<StartResponse, JobServiceError> {
        let url = self.workshop_url("prompt-optimization");
        tracing::debug!(url = %url, prompt_uri = %req.prompt_uri, "starting optimization job");
        self.send_json(self.client.post(&url).json(req)).await
    }

    async fn status(
        &self,
        job_id: &str,
        since_log_index: u64,
    ) -> Result<JobStatusResponse, JobServiceError> {
        let url = self.workshop_url(&format!("prompt-optimization-jobs/{}", job_id));
        let req = self
            .client
            .get(&url)
            .query(&[("since_log_index", since_log_index)]);
        self.send_json(req).await
    }

    async fn cancel(&self, job_id: &str) -> Result<(), JobServiceError> {
        let url = self.workshop_url(&format!("prompt-optimization-jobs/{}/cancel", job_id));
        self.send(self.client.post(&url)).await.map(|_| ())
    }

    async fn history(&self) -> Result<Vec<JobRecord>, JobServiceError> {
        let url = self.workshop_url("prompt-optimization-history");
        self.send_json(self.client.get(&url)).await
    }
}
