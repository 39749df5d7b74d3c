//! Mock Job Service for tests: in-memory jobs, scripted failures, no network.

use job_types::{
    JobRecord, JobService, JobServiceError, JobStatus, JobStatusResponse, OptimizationRequest,
    StartResponse,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

struct MockJob {
    record: JobRecord,
    logs: Vec<String>,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, MockJob>,
    /// Job ids, oldest first.
    order: Vec<String>,
    start_failure: Option<(u16, Option<String>)>,
    pending_status_failures: u32,
    unreachable: bool,
    ignore_cursor: bool,
    start_calls: u32,
    status_calls: u32,
    cancel_calls: u32,
}

/// Mock Job Service. Logs are append-only and sliced by `since_log_index` like the real one.
#[derive(Default)]
pub struct MockJobService {
    inner: Mutex<Inner>,
}

impl MockJobService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed history given newest-first, as the history endpoint returns it.
    pub fn with_history(records: Vec<JobRecord>) -> Self {
        let svc = Self::new();
        for record in records.into_iter().rev() {
            svc.insert_job(record, Vec::new());
        }
        svc
    }

    /// Register a job (becomes the newest history entry).
    pub fn insert_job(&self, record: JobRecord, logs: Vec<String>) {
        let mut inner = self.lock();
        let id = record.job_id.clone();
        inner.order.retain(|j| j != &id);
        inner.order.push(id.clone());
        inner.jobs.insert(id, MockJob { record, logs });
    }

    pub fn push_logs<I, S>(&self, job_id: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(job) = self.lock().jobs.get_mut(job_id) {
            job.logs.extend(lines.into_iter().map(Into::into));
        }
    }

    pub fn complete(&self, job_id: &str, result: serde_json::Value) {
        if let Some(job) = self.lock().jobs.get_mut(job_id) {
            job.record.status = JobStatus::Completed;
            job.record.result = Some(result);
        }
    }

    pub fn fail(&self, job_id: &str, error: &str) {
        if let Some(job) = self.lock().jobs.get_mut(job_id) {
            job.record.status = JobStatus::Failed;
            job.record.error = Some(error.to_string());
        }
    }

    /// Next start call returns `status` with the given detail.
    pub fn fail_next_start(&self, status: u16, detail: Option<&str>) {
        self.lock().start_failure = Some((status, detail.map(String::from)));
    }

    /// The next `n` status calls return 503.
    pub fn fail_next_polls(&self, n: u32) {
        self.lock().pending_status_failures = n;
    }

    /// Every call fails with a transport error while set.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Status calls replay logs from index 0 regardless of the requested cursor.
    pub fn set_ignore_cursor(&self, ignore: bool) {
        self.lock().ignore_cursor = ignore;
    }

    pub fn job_status(&self, job_id: &str) -> Option<JobStatus> {
        self.lock().jobs.get(job_id).map(|j| j.record.status)
    }

    pub fn start_calls(&self) -> u32 {
        self.lock().start_calls
    }

    pub fn status_calls(&self) -> u32 {
        self.lock().status_calls
    }

    pub fn cancel_calls(&self) -> u32 {
        self.lock().cancel_calls
    }
}

fn unreachable_error() -> JobServiceError {
    JobServiceError::Transport("connection refused".to_string())
}

fn not_found() -> JobServiceError {
    JobServiceError::Status {
        status: 404,
        detail: Some("Job not found".to_string()),
    }
}

#[async_trait::async_trait]
impl JobService for MockJobService {
    async fn start(&self, req: &OptimizationRequest) -> Result<StartResponse, JobServiceError> {
        let mut inner = self.lock();
        inner.start_calls += 1;
        if inner.unreachable {
            return Err(unreachable_error());
        }
        if let Some((status, detail)) = inner.start_failure.take() {
            return Err(JobServiceError::Status { status, detail });
        }
        let job_id = Uuid::new_v4().to_string();
        let mut record = JobRecord::new(job_id.clone(), JobStatus::Running);
        record.request = req.clone();
        inner.order.push(job_id.clone());
        inner.jobs.insert(
            job_id.clone(),
            MockJob {
                record,
                logs: Vec::new(),
            },
        );
        Ok(StartResponse { job_id })
    }

    async fn status(
        &self,
        job_id: &str,
        since_log_index: u64,
    ) -> Result<JobStatusResponse, JobServiceError> {
        let mut inner = self.lock();
        inner.status_calls += 1;
        if inner.unreachable {
            return Err(unreachable_error());
        }
        if inner.pending_status_failures > 0 {
            inner.pending_status_failures -= 1;
            return Err(JobServiceError::Status {
                status: 503,
                detail: None,
            });
        }
        let from = if inner.ignore_cursor {
            0
        } else {
            since_log_index as usize
        };
        let job = inner.jobs.get(job_id).ok_or_else(not_found)?;
        let logs = job.logs.get(from..).map(<[String]>::to_vec).unwrap_or_default();
        Ok(JobStatusResponse {
            logs,
            log_count: job.logs.len() as u64,
            status: job.record.status,
            result: job.record.result.clone(),
            error: job.record.error.clone(),
        })
    }

    async fn cancel(&self, job_id: &str) -> Result<(), JobServiceError> {
        let mut inner = self.lock();
        inner.cancel_calls += 1;
        if inner.unreachable {
            return Err(unreachable_error());
        }
        let job = inner.jobs.get_mut(job_id).ok_or_else(not_found)?;
        if !job.record.status.is_terminal() {
            job.record.status = JobStatus::Failed;
            job.record.error = Some("Cancelled".to_string());
        }
        Ok(())
    }

    async fn history(&self) -> Result<Vec<JobRecord>, JobServiceError> {
        let inner = self.lock();
        if inner.unreachable {
            return Err(unreachable_error());
        }
        Ok(inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.jobs.get(id))
            .map(|j| j.record.clone())
            .collect())
    }
}
