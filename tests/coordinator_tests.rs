//! Rendezvous protocol tests.
//!
//! All tests run with a paused clock so that the liveness, rendezvous,
//! staleness and retention windows can be crossed deterministically.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use login_relay::config::TimingConfig;
use login_relay::coordinator::Coordinator;
use login_relay::error::RelayError;
use login_relay::scheduler::{
    Job, JobId, JobQueue, JobResult, JobStatus, LivenessTracker, LoginRequest, ResultReport,
    ResultStore,
};

fn login(username: &str) -> LoginRequest {
    LoginRequest::new("Springfield High", username, "hunter2")
}

fn report(job_id: &JobId, success: bool) -> ResultReport {
    ResultReport {
        job_id: job_id.clone(),
        success,
        error: if success {
            None
        } else {
            Some("Invalid password".to_string())
        },
        homeworks: if success {
            vec![json!({"id": "hw1"})]
        } else {
            Vec::new()
        },
    }
}

async fn online_coordinator() -> Arc<Coordinator> {
    let coordinator = Arc::new(Coordinator::default());
    coordinator.heartbeat().await;
    coordinator
}

/// Pull jobs like the worker would, without letting the clock move.
async fn pull_next(coordinator: &Coordinator) -> Job {
    loop {
        if let Some(job) = coordinator.next_job().await {
            return job;
        }
        tokio::task::yield_now().await;
    }
}

async fn wait_for_queue_size(coordinator: &Coordinator, size: usize) {
    while coordinator.queue_size().await != size {
        tokio::task::yield_now().await;
    }
}

fn spawn_submit(
    coordinator: &Arc<Coordinator>,
    request: LoginRequest,
) -> tokio::task::JoinHandle<login_relay::error::Result<JobResult>> {
    let coordinator = Arc::clone(coordinator);
    tokio::spawn(async move { coordinator.submit(request).await })
}

// ---------------------------------------------------------------------------
// Validation and liveness gate
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_submit_rejects_missing_fields_without_queueing() {
    let coordinator = online_coordinator().await;

    let requests = [
        LoginRequest::default(),
        LoginRequest::new("", "bart", "pw"),
        LoginRequest::new("School", "", "pw"),
        LoginRequest::new("School", "bart", ""),
        LoginRequest {
            school_name: Some("School".to_string()),
            username: Some("bart".to_string()),
            password: None,
        },
    ];

    for request in requests {
        let err = coordinator.submit(request).await.unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)), "got {:?}", err);
    }
    assert_eq!(coordinator.queue_size().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_submit_rejects_when_no_heartbeat() {
    let coordinator = Arc::new(Coordinator::default());

    let err = coordinator.submit(login("bart")).await.unwrap_err();
    assert!(matches!(err, RelayError::WorkerOffline));
    assert_eq!(coordinator.queue_size().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_submit_rejects_when_heartbeat_stale() {
    let coordinator = online_coordinator().await;
    tokio::time::advance(Duration::from_secs(15)).await;

    let err = coordinator.submit(login("bart")).await.unwrap_err();
    assert!(matches!(err, RelayError::WorkerOffline));
    assert_eq!(coordinator.queue_size().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_validation_checked_before_liveness() {
    let coordinator = Arc::new(Coordinator::default());
    let err = coordinator.submit(LoginRequest::default()).await.unwrap_err();
    assert!(matches!(err, RelayError::Validation(_)));
}

// ---------------------------------------------------------------------------
// Rendezvous
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_submit_then_report_completes() {
    let coordinator = online_coordinator().await;
    let submitter = spawn_submit(&coordinator, login("bart"));

    let job = pull_next(&coordinator).await;
    assert_eq!(job.school_name, "Springfield High");
    assert_eq!(job.username, "bart");
    assert_eq!(job.password, "hunter2");

    let reported_at = Instant::now();
    coordinator.report(report(&job.id, true)).await;

    let result = submitter.await.unwrap().unwrap();
    assert!(result.success);
    assert!(result.error.is_none());
    assert_eq!(result.homeworks, vec![json!({"id": "hw1"})]);

    // Woken by the completion signal, not by the next poll tick
    assert!(reported_at.elapsed() < coordinator.timing().poll_interval);

    // Consumed exactly once
    assert!(coordinator.take_result(&job.id).await.is_none());
    assert_eq!(coordinator.status(&job.id).await, JobStatus::Processing);
    assert_eq!(coordinator.queue_size().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_login_is_returned_as_result() {
    let coordinator = online_coordinator().await;
    let submitter = spawn_submit(&coordinator, login("bart"));

    let job = pull_next(&coordinator).await;
    coordinator.report(report(&job.id, false)).await;

    let result = submitter.await.unwrap().unwrap();
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Invalid password"));
    assert!(result.homeworks.is_empty());
    assert_eq!(result.message(), "Login failed");
}

#[tokio::test(start_paused = true)]
async fn test_result_arriving_between_polls_is_picked_up() {
    let timing = TimingConfig::default().with_poll_interval(Duration::from_secs(5));
    let coordinator = Arc::new(Coordinator::new(timing));
    coordinator.heartbeat().await;
    let submitter = spawn_submit(&coordinator, login("bart"));

    let job = pull_next(&coordinator).await;
    tokio::time::advance(Duration::from_secs(7)).await;
    coordinator.report(report(&job.id, true)).await;

    assert!(submitter.await.unwrap().unwrap().success);
}

#[tokio::test(start_paused = true)]
async fn test_submit_times_out_and_retracts_job() {
    let coordinator = online_coordinator().await;

    let start = Instant::now();
    let err = coordinator.submit(login("bart")).await.unwrap_err();
    let elapsed = start.elapsed();

    let job_id = match err {
        RelayError::RendezvousTimeout(job_id) => job_id,
        other => panic!("expected timeout, got {:?}", other),
    };
    assert!(elapsed >= Duration::from_secs(40), "waited {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(41), "waited {:?}", elapsed);

    assert_eq!(coordinator.queue_size().await, 0);
    assert_eq!(coordinator.status(&job_id).await, JobStatus::Processing);
    assert!(coordinator.next_job().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_late_report_is_accepted_and_expires_unread() {
    let coordinator = online_coordinator().await;
    let submitter = spawn_submit(&coordinator, login("bart"));

    // Worker pulls but is too slow to answer
    let job = pull_next(&coordinator).await;
    let err = submitter.await.unwrap().unwrap_err();
    assert!(matches!(err, RelayError::RendezvousTimeout(ref id) if *id == job.id));

    coordinator.report(report(&job.id, true)).await;
    match coordinator.status(&job.id).await {
        JobStatus::Completed(result) => assert!(result.success),
        other => panic!("expected completed, got {:?}", other),
    }

    tokio::time::advance(Duration::from_secs(300)).await;
    tokio::task::yield_now().await;
    assert_eq!(coordinator.status(&job.id).await, JobStatus::Processing);
    assert!(coordinator.take_result(&job.id).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_detached_submit_outlives_caller() {
    let coordinator = online_coordinator().await;

    let caller = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.submit_detached(login("bart")).await })
    };
    wait_for_queue_size(&coordinator, 1).await;

    // Caller disconnects; the rendezvous keeps running and still retracts
    caller.abort();
    tokio::time::sleep(Duration::from_secs(41)).await;

    assert_eq!(coordinator.queue_size().await, 0);
}

// ---------------------------------------------------------------------------
// Dispatch order and ids
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_pull_returns_jobs_in_submission_order() {
    let coordinator = online_coordinator().await;

    let _a = spawn_submit(&coordinator, login("a"));
    wait_for_queue_size(&coordinator, 1).await;
    let _b = spawn_submit(&coordinator, login("b"));
    wait_for_queue_size(&coordinator, 2).await;

    assert_eq!(pull_next(&coordinator).await.username, "a");
    assert_eq!(pull_next(&coordinator).await.username, "b");
}

#[tokio::test(start_paused = true)]
async fn test_same_tick_submissions_get_distinct_ids() {
    let coordinator = online_coordinator().await;
    let start = Instant::now();

    let submitters: Vec<_> = (0..100)
        .map(|i| spawn_submit(&coordinator, login(&format!("user{}", i))))
        .collect();
    wait_for_queue_size(&coordinator, 100).await;

    // The clock never moved while the jobs were minted
    assert_eq!(Instant::now(), start);

    let mut ids = HashSet::new();
    while let Some(job) = coordinator.next_job().await {
        ids.insert(job.id);
    }
    assert_eq!(ids.len(), 100);

    for id in &ids {
        coordinator.report(report(id, true)).await;
    }
    for submitter in submitters {
        assert!(submitter.await.unwrap().unwrap().success);
    }
}

#[tokio::test(start_paused = true)]
async fn test_results_are_routed_to_their_own_submission() {
    let coordinator = online_coordinator().await;

    let first = spawn_submit(&coordinator, login("first"));
    wait_for_queue_size(&coordinator, 1).await;
    let second = spawn_submit(&coordinator, login("second"));
    wait_for_queue_size(&coordinator, 2).await;

    let job_first = pull_next(&coordinator).await;
    let job_second = pull_next(&coordinator).await;

    // Answer out of order
    coordinator.report(report(&job_second.id, false)).await;
    coordinator.report(report(&job_first.id, true)).await;

    assert!(first.await.unwrap().unwrap().success);
    assert!(!second.await.unwrap().unwrap().success);
}

// ---------------------------------------------------------------------------
// Status and health
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_status_phases() {
    let job = Job::with_id(
        JobId::from("job-1"),
        login("bart").validate().unwrap(),
    );
    let mut queue = JobQueue::new();
    queue.enqueue(job.clone());

    let coordinator = Coordinator::from_parts(
        TimingConfig::default(),
        queue,
        ResultStore::new(),
        LivenessTracker::default(),
    );

    assert_eq!(coordinator.status(&job.id).await, JobStatus::Queued);

    let pulled = coordinator.next_job().await.unwrap();
    assert_eq!(pulled.id, job.id);
    assert_eq!(coordinator.status(&job.id).await, JobStatus::Processing);

    coordinator.report(report(&job.id, true)).await;
    match coordinator.status(&job.id).await {
        JobStatus::Completed(result) => {
            assert!(result.success);
            assert_eq!(result.homeworks, vec![json!({"id": "hw1"})]);
        }
        other => panic!("expected completed, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_status_does_not_consume_result() {
    let coordinator = online_coordinator().await;
    let job_id = JobId::from("orphan");
    coordinator.report(report(&job_id, true)).await;

    for _ in 0..2 {
        match coordinator.status(&job_id).await {
            JobStatus::Completed(result) => {
                assert!(result.success);
                assert_eq!(result.homeworks, vec![json!({"id": "hw1"})]);
            }
            other => panic!("expected completed, got {:?}", other),
        }
    }
    assert!(coordinator.take_result(&job_id).await.is_some());
    assert_eq!(coordinator.status(&job_id).await, JobStatus::Processing);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_job_reports_processing() {
    let coordinator = Coordinator::default();
    assert_eq!(
        coordinator.status(&JobId::from("does-not-exist")).await,
        JobStatus::Processing
    );
}

#[tokio::test(start_paused = true)]
async fn test_overwritten_result_survives_old_expiry() {
    let coordinator = Coordinator::default();
    let job_id = JobId::from("job-1");

    coordinator.report(report(&job_id, false)).await;
    tokio::time::advance(Duration::from_secs(200)).await;
    coordinator.report(report(&job_id, true)).await;

    tokio::time::advance(Duration::from_secs(150)).await;
    tokio::task::yield_now().await;
    match coordinator.status(&job_id).await {
        JobStatus::Completed(result) => assert!(result.success),
        other => panic!("expected completed, got {:?}", other),
    }

    tokio::time::advance(Duration::from_secs(150)).await;
    tokio::task::yield_now().await;
    assert_eq!(coordinator.status(&job_id).await, JobStatus::Processing);
}

#[tokio::test(start_paused = true)]
async fn test_health_tracks_heartbeat_window() {
    let coordinator = Coordinator::default();

    let health = coordinator.health().await;
    assert_eq!(health.queue_size, 0);
    assert!(!health.worker_online);
    assert!(health.last_heartbeat.is_none());

    coordinator.heartbeat().await;
    let health = coordinator.health().await;
    assert!(health.worker_online);
    assert!(health.last_heartbeat.is_some());

    tokio::time::advance(Duration::from_secs(14)).await;
    assert!(coordinator.health().await.worker_online);

    tokio::time::advance(Duration::from_secs(1)).await;
    let health = coordinator.health().await;
    assert!(!health.worker_online);
    assert!(health.last_heartbeat.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_stale_queue_entry_is_not_dispatched() {
    let timing = TimingConfig::default()
        .with_stale_after(Duration::from_secs(5))
        .with_rendezvous_timeout(Duration::from_secs(40));
    let coordinator = Arc::new(Coordinator::new(timing));
    coordinator.heartbeat().await;

    let submitter = spawn_submit(&coordinator, login("bart"));
    wait_for_queue_size(&coordinator, 1).await;

    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(coordinator.next_job().await.is_none());
    assert!(coordinator.next_job().await.is_none());

    let err = submitter.await.unwrap().unwrap_err();
    assert!(matches!(err, RelayError::RendezvousTimeout(_)));
}
