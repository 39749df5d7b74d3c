//! Client-side poll state and the merge rules applied to each status response.

use job_types::{JobRecord, JobStatus, JobStatusResponse, LocalFailure};

/// Everything the client knows about the job it is attached to.
///
/// Owned by one client; never shared with the service. `logs` is append-only except for the
/// first merge after an attach, which replaces it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientPollState {
    pub job_id: Option<String>,
    /// `None` until a job is attached.
    pub status: Option<JobStatus>,
    /// Number of log lines already fetched (`since_log_index` of the next poll).
    pub log_cursor: u64,
    pub consecutive_errors: u32,
    pub logs: Vec<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Set when the client itself forced `failed`.
    pub local_failure: Option<LocalFailure>,
    /// Bumped on every attach, cancel and detach; responses for an older generation are dropped.
    pub generation: u64,
    /// A job re-attached in a terminal state still gets one poll for trailing logs.
    pub trailing_fetch: bool,
}

/// A response whose log range does not line up with the cursor it was requested at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("log range mismatch: cursor {cursor}, {returned} line(s) returned, log_count {log_count}")]
pub struct CursorMismatch {
    pub cursor: u64,
    pub returned: usize,
    pub log_count: u64,
}

impl ClientPollState {
    /// A further poll may be sent.
    pub fn is_pollable(&self) -> bool {
        if self.job_id.is_none() {
            return false;
        }
        match self.status {
            Some(status) => !status.is_terminal() || self.trailing_fetch,
            None => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(JobStatus::is_terminal)
    }

    /// Attach to a freshly started job.
    pub fn attach_started(&mut self, job_id: String) {
        *self = ClientPollState {
            job_id: Some(job_id),
            status: Some(JobStatus::Running),
            generation: self.generation + 1,
            ..Default::default()
        };
    }

    /// Attach to a job picked from history. Terminal records carry their result or error over
    /// immediately; the cursor starts at 0 either way.
    pub fn attach_record(&mut self, record: &JobRecord) {
        *self = ClientPollState {
            job_id: Some(record.job_id.clone()),
            status: Some(record.status),
            result: record.result.clone(),
            error: record.error.clone(),
            generation: self.generation + 1,
            trailing_fetch: record.status.is_terminal(),
            ..Default::default()
        };
    }

    /// Drop the attachment; later responses for it are ignored.
    pub fn detach(&mut self) {
        *self = ClientPollState {
            generation: self.generation + 1,
            ..Default::default()
        };
    }

    /// Merge one successful status response. Returns the number of new log lines.
    ///
    /// With the cursor at 0 the returned logs replace what is held, otherwise they are
    /// appended. The cursor then moves to `log_count`.
    pub fn merge(&mut self, resp: JobStatusResponse) -> Result<usize, CursorMismatch> {
        let cursor = self.log_cursor;
        let returned = resp.logs.len();
        if resp.log_count != cursor + returned as u64 {
            return Err(CursorMismatch {
                cursor,
                returned,
                log_count: resp.log_count,
            });
        }
        if returned > 0 {
            if cursor == 0 {
                self.logs = resp.logs;
            } else {
                self.logs.extend(resp.logs);
            }
        }
        self.log_cursor = resp.log_count;
        self.consecutive_errors = 0;
        self.status = Some(resp.status);
        if resp.result.is_some() {
            self.result = resp.result;
        }
        if resp.error.is_some() {
            self.error = resp.error;
        }
        self.trailing_fetch = false;
        Ok(returned)
    }

    /// Count a failed poll. Reaching `threshold` forces the job lost; returns true in that case.
    ///
    /// A failed trailing fetch on an already terminal job gives up on the trailing logs and
    /// keeps the recorded status, result and error.
    pub fn record_failure(&mut self, threshold: u32) -> bool {
        if self.trailing_fetch && self.is_terminal() {
            self.trailing_fetch = false;
            return false;
        }
        self.consecutive_errors += 1;
        if self.consecutive_errors >= threshold {
            self.force_failed(LocalFailure::Lost);
            return true;
        }
        false
    }

    pub fn force_failed(&mut self, reason: LocalFailure) {
        self.status = Some(JobStatus::Failed);
        self.error = Some(reason.message().to_string());
        self.local_failure = Some(reason);
        self.trailing_fetch = false;
    }
}

/// Prefer the newest running job; otherwise the newest job. `history` is newest-first.
pub fn select_reconnect_target(history: &[JobRecord]) -> Option<&JobRecord> {
    history
        .iter()
        .find(|r| r.status == JobStatus::Running)
        .or_else(|| history.first())
}
