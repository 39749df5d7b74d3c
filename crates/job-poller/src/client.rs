//! The polling client: start, poll, reconnect, cancel, and the timer loop tying them together.

use crate::{select_reconnect_target, ClientPollState, PollConfig, PollerError};
use job_types::{JobRecord, JobService, JobStatus, LocalFailure, OptimizationRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Result of a single [`JobPollingClient::poll_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Job still running; `new_lines` were merged.
    Progress { new_lines: usize },
    /// The service reported a terminal status.
    Finished(JobStatus),
    /// The poll failed and is absorbed until the threshold.
    TransportFailure { consecutive: u32 },
    /// Threshold reached; the job was forced to `failed`.
    Lost,
    /// Nothing to poll: detached, terminal, or the response was stale.
    Inactive,
}

impl PollOutcome {
    pub fn should_continue(self) -> bool {
        matches!(
            self,
            PollOutcome::Progress { .. } | PollOutcome::TransportFailure { .. }
        )
    }
}

/// Follows one optimization job at a time on a [`JobService`].
///
/// State lives in a `watch` channel so observers see every change; polls are single-flight.
pub struct JobPollingClient {
    service: Arc<dyn JobService>,
    config: PollConfig,
    state: watch::Sender<ClientPollState>,
    poll_lock: Mutex<()>,
    reconnect_attempted: AtomicBool,
}

impl JobPollingClient {
    pub fn new(service: Arc<dyn JobService>, config: PollConfig) -> Self {
        let (state, _) = watch::channel(ClientPollState::default());
        Self {
            service,
            config,
            state,
            poll_lock: Mutex::new(()),
            reconnect_attempted: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn snapshot(&self) -> ClientPollState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientPollState> {
        self.state.subscribe()
    }

    /// Start a new job and attach to it. Any previous attachment stops being polled.
    pub async fn start(&self, req: &OptimizationRequest) -> Result<String, PollerError> {
        if !req.has_prompt_uri() {
            return Err(PollerError::InvalidRequest(
                "prompt_uri must not be empty".to_string(),
            ));
        }
        let res = self.service.start(req).await.map_err(|e| {
            tracing::warn!(error = %e, prompt_uri = %req.prompt_uri, "optimization start rejected");
            PollerError::start_failed(&e)
        })?;
        if res.job_id.trim().is_empty() {
            return Err(PollerError::StartFailed(
                "service returned an empty job id".to_string(),
            ));
        }
        let job_id = res.job_id;
        self.state.send_modify(|s| s.attach_started(job_id.clone()));
        tracing::info!(job_id = %job_id, prompt_uri = %req.prompt_uri, "optimization job started");
        Ok(job_id)
    }

    /// Poll once at the current cursor and merge the result.
    pub async fn poll_once(&self) -> PollOutcome {
        let _flight = self.poll_lock.lock().await;
        let (job_id, cursor, generation) = {
            let s = self.state.borrow();
            match (&s.job_id, s.is_pollable()) {
                (Some(id), true) => (id.clone(), s.log_cursor, s.generation),
                _ => return PollOutcome::Inactive,
            }
        };

        let response = self.service.status(&job_id, cursor).await;
        let threshold = self.config.max_consecutive_errors;
        let mut outcome = PollOutcome::Inactive;
        self.state.send_if_modified(|s| {
            if s.generation != generation || !s.is_pollable() {
                tracing::debug!(job_id = %job_id, "dropping stale poll response");
                return false;
            }
            let failure = match response {
                Ok(resp) => match s.merge(resp) {
                    Ok(new_lines) => {
                        tracing::debug!(
                            job_id = %job_id,
                            cursor = s.log_cursor,
                            new_lines,
                            status = ?s.status,
                            "poll merged"
                        );
                        outcome = match s.status {
                            Some(status) if status.is_terminal() => {
                                tracing::info!(job_id = %job_id, status = %status, "optimization job finished");
                                PollOutcome::Finished(status)
                            }
                            _ => PollOutcome::Progress { new_lines },
                        };
                        return true;
                    }
                    Err(mismatch) => mismatch.to_string(),
                },
                Err(e) => e.to_string(),
            };
            if s.record_failure(threshold) {
                tracing::warn!(job_id = %job_id, error = %failure, "poll failed; job considered lost");
                outcome = PollOutcome::Lost;
            } else if let Some(status) = s.status.filter(|st| st.is_terminal()) {
                tracing::warn!(
                    job_id = %job_id,
                    error = %failure,
                    status = %status,
                    "trailing log fetch failed; keeping recorded status"
                );
                outcome = PollOutcome::Finished(status);
            } else {
                tracing::warn!(
                    job_id = %job_id,
                    error = %failure,
                    consecutive = s.consecutive_errors,
                    "poll failed"
                );
                outcome = PollOutcome::TransportFailure {
                    consecutive: s.consecutive_errors,
                };
            }
            true
        });
        outcome
    }

    /// Re-attach to a job from `history` (newest-first) without starting a new one.
    ///
    /// Runs at most once per client; later calls return `None`.
    pub fn reconnect(&self, history: &[JobRecord]) -> Option<String> {
        if self.reconnect_attempted.swap(true, Ordering::SeqCst) {
            return None;
        }
        let record = select_reconnect_target(history)?;
        self.state.send_modify(|s| s.attach_record(record));
        tracing::info!(job_id = %record.job_id, status = %record.status, "reconnected to optimization job");
        Some(record.job_id.clone())
    }

    /// Fetch history from the service and [`reconnect`](Self::reconnect).
    ///
    /// A failed fetch leaves the one-shot guard unused.
    pub async fn reconnect_from_service(&self) -> Result<Option<String>, PollerError> {
        if self.reconnect_attempted.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let history = self.service.history().await?;
        Ok(self.reconnect(&history))
    }

    /// Cancel the attached job.
    ///
    /// The job is marked failed and polling stops before the service is contacted. The
    /// cancel request is best effort; if it fails the message says so. Returns the reason
    /// recorded, or `None` when nothing running was attached.
    pub async fn cancel(&self) -> Option<LocalFailure> {
        let mut target = None;
        self.state.send_if_modified(|s| match s.job_id.clone() {
            Some(id) if !s.is_terminal() => {
                s.force_failed(LocalFailure::Cancelled);
                s.generation += 1;
                target = Some((id, s.generation));
                true
            }
            _ => false,
        });
        let (job_id, generation) = target?;
        tracing::info!(job_id = %job_id, "optimization job cancelled locally");

        let acknowledged =
            match tokio::time::timeout(self.config.cancel_timeout, self.service.cancel(&job_id))
                .await
            {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    tracing::warn!(job_id = %job_id, error = %e, "cancel request failed");
                    false
                }
                Err(_) => {
                    tracing::warn!(job_id = %job_id, "cancel request timed out");
                    false
                }
            };
        if acknowledged {
            return Some(LocalFailure::Cancelled);
        }
        self.state.send_if_modified(|s| {
            if s.generation != generation {
                return false;
            }
            s.force_failed(LocalFailure::CancelledUnreachable);
            true
        });
        Some(LocalFailure::CancelledUnreachable)
    }

    /// Stop following the job without touching it on the service.
    pub fn detach(&self) {
        self.state.send_modify(ClientPollState::detach);
    }

    /// Poll immediately, then every `interval`, until the job is terminal or the attachment
    /// changes (new start, reconnect, cancel, detach). Returns the last known status.
    pub async fn run(&self) -> Option<JobStatus> {
        let mut updates = self.state.subscribe();
        let generation = updates.borrow_and_update().generation;
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = updates.changed() => {
                    if changed.is_err() || updates.borrow_and_update().generation != generation {
                        break;
                    }
                    continue;
                }
            }
            if self.state.borrow().generation != generation {
                break;
            }
            if !self.poll_once().await.should_continue() {
                break;
            }
        }
        self.state.borrow().status
    }

    /// [`run`](Self::run) on a tokio task.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<Option<JobStatus>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run().await })
    }
}
