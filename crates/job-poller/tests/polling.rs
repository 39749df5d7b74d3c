//! JobPollingClient against the mock Job Service: lifecycle, failure threshold, reconnect, cancel.

use job_http::MockJobService;
use job_poller::{
    JobPollingClient, PollConfig, PollOutcome, PollerError, START_FAILED_FALLBACK,
};
use job_types::{
    JobRecord, JobService, JobServiceError, JobStatus, JobStatusResponse, LocalFailure,
    OptimizationRequest, StartResponse,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn request() -> OptimizationRequest {
    OptimizationRequest::new("prompts:/support-agent/4")
}

fn client_for(svc: &Arc<MockJobService>) -> JobPollingClient {
    JobPollingClient::new(svc.clone(), PollConfig::default())
}

fn lines(prefix: &str, n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("{prefix} {i}")).collect()
}

#[tokio::test]
async fn start_poll_until_completed() {
    let svc = Arc::new(MockJobService::new());
    let client = client_for(&svc);

    let job_id = client.start(&request()).await.unwrap();
    let state = client.snapshot();
    assert_eq!(state.job_id.as_deref(), Some(job_id.as_str()));
    assert_eq!(state.status, Some(JobStatus::Running));
    assert_eq!(state.log_cursor, 0);
    assert!(state.logs.is_empty());

    svc.push_logs(&job_id, ["iteration 1", "iteration 2"]);
    assert_eq!(
        client.poll_once().await,
        PollOutcome::Progress { new_lines: 2 }
    );
    assert_eq!(client.snapshot().log_cursor, 2);

    svc.push_logs(&job_id, ["iteration 3"]);
    svc.complete(&job_id, json!({ "optimized_prompt": "Cite the policy." }));
    assert_eq!(
        client.poll_once().await,
        PollOutcome::Finished(JobStatus::Completed)
    );

    let state = client.snapshot();
    assert_eq!(state.logs, vec!["iteration 1", "iteration 2", "iteration 3"]);
    assert_eq!(state.log_cursor, 3);
    assert_eq!(
        state.result.unwrap()["optimized_prompt"],
        "Cite the policy."
    );

    let calls = svc.status_calls();
    assert_eq!(client.poll_once().await, PollOutcome::Inactive);
    assert_eq!(svc.status_calls(), calls);
}

#[tokio::test]
async fn start_rejects_blank_prompt_uri_without_calling_service() {
    let svc = Arc::new(MockJobService::new());
    let client = client_for(&svc);
    let err = client
        .start(&OptimizationRequest::new(""))
        .await
        .unwrap_err();
    assert!(matches!(err, PollerError::InvalidRequest(_)));
    assert_eq!(svc.start_calls(), 0);
    assert_eq!(client.snapshot().status, None);
}

#[tokio::test]
async fn start_failure_surfaces_detail_or_fallback() {
    let svc = Arc::new(MockJobService::new());
    let client = client_for(&svc);

    svc.fail_next_start(409, Some("An optimization run is already in progress"));
    match client.start(&request()).await.unwrap_err() {
        PollerError::StartFailed(msg) => {
            assert_eq!(msg, "An optimization run is already in progress")
        }
        other => panic!("unexpected error: {other}"),
    }

    svc.fail_next_start(500, None);
    match client.start(&request()).await.unwrap_err() {
        PollerError::StartFailed(msg) => assert_eq!(msg, START_FAILED_FALLBACK),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(client.snapshot().job_id, None);
}

#[tokio::test(start_paused = true)]
async fn three_consecutive_failures_lose_the_job_and_stop_polling() {
    let svc = Arc::new(MockJobService::new());
    let client = client_for(&svc);
    client.start(&request()).await.unwrap();
    svc.fail_next_polls(10);

    let status = client.run().await;

    assert_eq!(status, Some(JobStatus::Failed));
    assert_eq!(svc.status_calls(), 3);
    let state = client.snapshot();
    assert_eq!(state.local_failure, Some(LocalFailure::Lost));
    assert_eq!(state.error.as_deref(), Some(LocalFailure::Lost.message()));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(svc.status_calls(), 3);
}

#[tokio::test]
async fn success_resets_the_failure_count() {
    let svc = Arc::new(MockJobService::new());
    let client = client_for(&svc);
    client.start(&request()).await.unwrap();

    svc.fail_next_polls(2);
    assert_eq!(
        client.poll_once().await,
        PollOutcome::TransportFailure { consecutive: 1 }
    );
    assert_eq!(
        client.poll_once().await,
        PollOutcome::TransportFailure { consecutive: 2 }
    );
    assert_eq!(
        client.poll_once().await,
        PollOutcome::Progress { new_lines: 0 }
    );
    assert_eq!(client.snapshot().consecutive_errors, 0);

    svc.fail_next_polls(2);
    client.poll_once().await;
    client.poll_once().await;
    let state = client.snapshot();
    assert_eq!(state.status, Some(JobStatus::Running));
    assert_eq!(state.consecutive_errors, 2);
}

#[tokio::test]
async fn overlapping_log_range_counts_as_failure() {
    let svc = Arc::new(MockJobService::new());
    let client = client_for(&svc);
    let job_id = client.start(&request()).await.unwrap();
    svc.push_logs(&job_id, ["a", "b"]);
    client.poll_once().await;

    svc.set_ignore_cursor(true);
    svc.push_logs(&job_id, ["c"]);
    assert_eq!(
        client.poll_once().await,
        PollOutcome::TransportFailure { consecutive: 1 }
    );
    let state = client.snapshot();
    assert_eq!(state.logs, vec!["a", "b"]);
    assert_eq!(state.log_cursor, 2);

    svc.set_ignore_cursor(false);
    assert_eq!(
        client.poll_once().await,
        PollOutcome::Progress { new_lines: 1 }
    );
    assert_eq!(client.snapshot().logs, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn cancel_with_unreachable_service_still_fails_locally() {
    let svc = Arc::new(MockJobService::new());
    let client = client_for(&svc);
    client.start(&request()).await.unwrap();
    svc.set_unreachable(true);

    assert_eq!(
        client.cancel().await,
        Some(LocalFailure::CancelledUnreachable)
    );
    let state = client.snapshot();
    assert_eq!(state.status, Some(JobStatus::Failed));
    assert_eq!(
        state.error.as_deref(),
        Some(LocalFailure::CancelledUnreachable.message())
    );
    assert_eq!(svc.cancel_calls(), 1);
    assert_eq!(client.poll_once().await, PollOutcome::Inactive);
}

#[tokio::test]
async fn cancel_acknowledged_by_service() {
    let svc = Arc::new(MockJobService::new());
    let client = client_for(&svc);
    let job_id = client.start(&request()).await.unwrap();

    assert_eq!(client.cancel().await, Some(LocalFailure::Cancelled));
    assert_eq!(svc.job_status(&job_id), Some(JobStatus::Failed));
    let state = client.snapshot();
    assert_eq!(state.error.as_deref(), Some("Optimization cancelled by user."));

    // Nothing left to cancel.
    assert_eq!(client.cancel().await, None);
    assert_eq!(svc.cancel_calls(), 1);
}

#[tokio::test]
async fn reconnect_prefers_running_job_over_newest() {
    let svc = Arc::new(MockJobService::with_history(vec![
        JobRecord::new("J2", JobStatus::Completed),
        JobRecord::new("J1", JobStatus::Running),
    ]));
    svc.push_logs("J1", lines("step", 3));
    let client = client_for(&svc);

    let history = svc.history().await.unwrap();
    assert_eq!(client.reconnect(&history), Some("J1".to_string()));
    assert_eq!(
        client.poll_once().await,
        PollOutcome::Progress { new_lines: 3 }
    );
    assert_eq!(client.snapshot().job_id.as_deref(), Some("J1"));
}

#[tokio::test]
async fn reconnect_runs_once() {
    let svc = Arc::new(MockJobService::with_history(vec![JobRecord::new(
        "J1",
        JobStatus::Running,
    )]));
    let client = client_for(&svc);
    let history = svc.history().await.unwrap();

    assert_eq!(client.reconnect(&history), Some("J1".to_string()));
    let generation = client.snapshot().generation;
    assert_eq!(client.reconnect(&history), None);
    assert_eq!(client.snapshot().generation, generation);
    assert_eq!(client.reconnect_from_service().await.unwrap(), None);
}

#[tokio::test]
async fn reconnecting_session_does_not_duplicate_logs() {
    let svc = Arc::new(MockJobService::new());
    let first = client_for(&svc);
    let job_id = first.start(&request()).await.unwrap();
    svc.push_logs(&job_id, lines("line", 5));
    first.poll_once().await;
    assert_eq!(first.snapshot().logs.len(), 5);

    // A fresh session (page reload) attaches to the same job.
    let second = client_for(&svc);
    assert_eq!(
        second.reconnect_from_service().await.unwrap(),
        Some(job_id.clone())
    );
    second.poll_once().await;
    let state = second.snapshot();
    assert_eq!(state.logs.len(), 5);
    assert_eq!(state.logs, first.snapshot().logs);
    assert_eq!(state.log_cursor, 5);
}

#[tokio::test]
async fn reconnect_to_finished_job_uses_record_then_fetches_trailing_logs() {
    let mut record = JobRecord::new("J7", JobStatus::Failed);
    record.error = Some("judge endpoint returned 500".to_string());
    let svc = Arc::new(MockJobService::new());
    svc.insert_job(record, lines("log", 2));
    let client = client_for(&svc);

    assert_eq!(
        client.reconnect_from_service().await.unwrap(),
        Some("J7".to_string())
    );
    let state = client.snapshot();
    assert_eq!(state.status, Some(JobStatus::Failed));
    assert_eq!(state.error.as_deref(), Some("judge endpoint returned 500"));
    assert!(state.logs.is_empty());

    assert_eq!(
        client.poll_once().await,
        PollOutcome::Finished(JobStatus::Failed)
    );
    assert_eq!(client.snapshot().logs, lines("log", 2));
    assert_eq!(client.poll_once().await, PollOutcome::Inactive);
}

#[tokio::test(start_paused = true)]
async fn finished_job_stays_finished_when_trailing_fetch_fails() {
    let mut record = JobRecord::new("J1", JobStatus::Completed);
    record.result = Some(json!({ "optimized_prompt": "Answer in one line." }));
    let svc = Arc::new(MockJobService::new());
    svc.insert_job(record.clone(), lines("log", 3));
    let client = client_for(&svc);
    assert_eq!(client.reconnect(&[record.clone()]), Some("J1".to_string()));

    svc.set_unreachable(true);
    assert_eq!(client.run().await, Some(JobStatus::Completed));

    let state = client.snapshot();
    assert_eq!(state.status, Some(JobStatus::Completed));
    assert_eq!(state.result, record.result);
    assert_eq!(state.error, None);
    assert_eq!(state.local_failure, None);
    assert!(state.logs.is_empty());
    assert_eq!(svc.status_calls(), 1);
    assert_eq!(client.poll_once().await, PollOutcome::Inactive);
}

#[tokio::test]
async fn failed_history_fetch_leaves_reconnect_available() {
    let svc = Arc::new(MockJobService::with_history(vec![JobRecord::new(
        "J1",
        JobStatus::Running,
    )]));
    let client = client_for(&svc);

    svc.set_unreachable(true);
    assert!(matches!(
        client.reconnect_from_service().await,
        Err(PollerError::Service(JobServiceError::Transport(_)))
    ));
    svc.set_unreachable(false);
    assert_eq!(
        client.reconnect_from_service().await.unwrap(),
        Some("J1".to_string())
    );
}

#[tokio::test]
async fn reconnect_with_empty_history_attaches_nothing() {
    let svc = Arc::new(MockJobService::new());
    let client = client_for(&svc);
    assert_eq!(client.reconnect(&[]), None);
    assert_eq!(client.snapshot().job_id, None);
    assert_eq!(client.run().await, None);
    assert_eq!(svc.status_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn run_polls_immediately_then_on_interval() {
    let svc = Arc::new(MockJobService::new());
    let client = Arc::new(client_for(&svc));
    let job_id = client.start(&request()).await.unwrap();
    svc.push_logs(&job_id, ["warming up"]);

    let mut updates = client.subscribe();
    let started = tokio::time::Instant::now();
    let handle = client.spawn();

    updates.changed().await.unwrap();
    assert_eq!(updates.borrow().logs, vec!["warming up"]);
    assert_eq!(svc.status_calls(), 1);
    assert!(started.elapsed() < client.config().interval);

    svc.complete(&job_id, json!({ "score": 0.87 }));
    assert_eq!(handle.await.unwrap(), Some(JobStatus::Completed));
    assert_eq!(svc.status_calls(), 2);
    assert!(started.elapsed() >= client.config().interval);
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_a_running_loop() {
    let svc = Arc::new(MockJobService::new());
    let client = Arc::new(client_for(&svc));
    client.start(&request()).await.unwrap();

    let mut updates = client.subscribe();
    let handle = client.spawn();
    updates.changed().await.unwrap();

    client.cancel().await;
    assert_eq!(handle.await.unwrap(), Some(JobStatus::Failed));
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(svc.status_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn detach_stops_polling_and_clears_state() {
    let svc = Arc::new(MockJobService::new());
    let client = Arc::new(client_for(&svc));
    let job_id = client.start(&request()).await.unwrap();

    let mut updates = client.subscribe();
    let handle = client.spawn();
    updates.changed().await.unwrap();

    client.detach();
    assert_eq!(handle.await.unwrap(), None);
    assert_eq!(client.snapshot().job_id, None);
    assert_eq!(svc.job_status(&job_id), Some(JobStatus::Running));
}

/// Holds every status call until released.
#[derive(Default)]
struct GatedService {
    entered: Notify,
    release: Notify,
}

#[async_trait::async_trait]
impl JobService for GatedService {
    async fn start(&self, _req: &OptimizationRequest) -> Result<StartResponse, JobServiceError> {
        Ok(StartResponse {
            job_id: "G1".to_string(),
        })
    }

    async fn status(
        &self,
        _job_id: &str,
        _since_log_index: u64,
    ) -> Result<JobStatusResponse, JobServiceError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(JobStatusResponse {
            logs: vec!["late line".to_string()],
            log_count: 1,
            status: JobStatus::Running,
            result: None,
            error: None,
        })
    }

    async fn cancel(&self, _job_id: &str) -> Result<(), JobServiceError> {
        Ok(())
    }

    async fn history(&self) -> Result<Vec<JobRecord>, JobServiceError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn response_arriving_after_cancel_is_dropped() {
    let svc = Arc::new(GatedService::default());
    let client = Arc::new(JobPollingClient::new(svc.clone(), PollConfig::default()));
    client.start(&request()).await.unwrap();

    let poller = Arc::clone(&client);
    let in_flight = tokio::spawn(async move { poller.poll_once().await });
    svc.entered.notified().await;

    assert_eq!(client.cancel().await, Some(LocalFailure::Cancelled));
    svc.release.notify_one();

    assert_eq!(in_flight.await.unwrap(), PollOutcome::Inactive);
    let state = client.snapshot();
    assert!(state.logs.is_empty());
    assert_eq!(state.status, Some(JobStatus::Failed));
    assert_eq!(state.local_failure, Some(LocalFailure::Cancelled));
}

/// Answers status with a running job; cancel never answers.
struct SilentCancelService;

#[async_trait::async_trait]
impl JobService for SilentCancelService {
    async fn start(&self, _req: &OptimizationRequest) -> Result<StartResponse, JobServiceError> {
        Ok(StartResponse {
            job_id: "S1".to_string(),
        })
    }

    async fn status(
        &self,
        _job_id: &str,
        _since_log_index: u64,
    ) -> Result<JobStatusResponse, JobServiceError> {
        Ok(JobStatusResponse {
            logs: Vec::new(),
            log_count: 0,
            status: JobStatus::Running,
            result: None,
            error: None,
        })
    }

    async fn cancel(&self, _job_id: &str) -> Result<(), JobServiceError> {
        std::future::pending().await
    }

    async fn history(&self) -> Result<Vec<JobRecord>, JobServiceError> {
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_times_out_against_a_silent_service() {
    let client = Arc::new(JobPollingClient::new(
        Arc::new(SilentCancelService),
        PollConfig::default(),
    ));
    client.start(&request()).await.unwrap();
    let timeout = client.config().cancel_timeout;

    let mut updates = client.subscribe();
    let handle = client.spawn();
    updates.changed().await.unwrap();

    let started = tokio::time::Instant::now();
    let canceller = Arc::clone(&client);
    let cancel = tokio::spawn(async move { canceller.cancel().await });

    loop {
        updates.changed().await.unwrap();
        if updates.borrow_and_update().local_failure.is_some() {
            break;
        }
    }
    assert!(started.elapsed() < timeout);
    let state = client.snapshot();
    assert_eq!(state.status, Some(JobStatus::Failed));
    assert_eq!(state.local_failure, Some(LocalFailure::Cancelled));
    assert_eq!(state.error.as_deref(), Some(LocalFailure::Cancelled.message()));
    assert_eq!(handle.await.unwrap(), Some(JobStatus::Failed));
    assert!(!cancel.is_finished());

    assert_eq!(
        cancel.await.unwrap(),
        Some(LocalFailure::CancelledUnreachable)
    );
    assert!(started.elapsed() >= timeout);
    let state = client.snapshot();
    assert_eq!(state.status, Some(JobStatus::Failed));
    assert_eq!(
        state.error.as_deref(),
        Some(LocalFailure::CancelledUnreachable.message())
    );
}
