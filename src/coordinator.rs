//! Rendezvous between synchronous callers and the pull-based worker.
//!
//! A submission passes through these states:
//!
//! ```text
//! Validating -> Rejected (invalid or worker offline)
//! Validating -> Enqueued -> Waiting -> Completed | TimedOut
//! ```
//!
//! While waiting, the submission re-checks the [`ResultStore`] every poll
//! interval and immediately whenever the worker reports for its job. No lock
//! is held across a suspension point, so pulls and reports from other
//! requests proceed while submissions wait.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;

use crate::config::TimingConfig;
use crate::error::{RelayError, Result};
use crate::scheduler::results::Retention;
use crate::scheduler::{
    Job, JobId, JobQueue, JobResult, JobStatus, LivenessTracker, LoginRequest, ResultReport,
    ResultStore,
};

/// Point-in-time view reported by `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub queue_size: usize,
    pub worker_online: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// Owns the shared queue, result store and liveness state for the process.
pub struct Coordinator {
    timing: TimingConfig,
    queue: RwLock<JobQueue>,
    results: Arc<Mutex<ResultStore>>,
    liveness: RwLock<LivenessTracker>,
    /// Completion signals of submissions currently waiting, by job id.
    waiters: Mutex<HashMap<JobId, Arc<Notify>>>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(TimingConfig::default())
    }
}

impl Coordinator {
    pub fn new(timing: TimingConfig) -> Self {
        let queue = JobQueue::with_stale_after(timing.stale_after);
        let results = ResultStore::with_retention(timing.result_retention);
        let liveness = LivenessTracker::new(timing.liveness_threshold);
        Self::from_parts(timing, queue, results, liveness)
    }

    /// Build a coordinator around existing components.
    pub fn from_parts(
        timing: TimingConfig,
        queue: JobQueue,
        results: ResultStore,
        liveness: LivenessTracker,
    ) -> Self {
        Self {
            timing,
            queue: RwLock::new(queue),
            results: Arc::new(Mutex::new(results)),
            liveness: RwLock::new(liveness),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Submit a login job and wait for the worker's result.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Validation`] if a credential field is missing or empty.
    /// - [`RelayError::WorkerOffline`] if no heartbeat arrived within the
    ///   liveness threshold. Nothing is queued in that case.
    /// - [`RelayError::RendezvousTimeout`] if the worker did not report before
    ///   the ceiling. The job is retracted from the queue.
    pub async fn submit(&self, request: LoginRequest) -> Result<JobResult> {
        let credentials = request.validate()?;

        if !self.liveness.read().await.is_online() {
            tracing::warn!("Worker offline, rejecting submission");
            return Err(RelayError::WorkerOffline);
        }

        let job = Job::new(credentials);
        let job_id = job.id.clone();

        // Register before enqueueing so a fast report cannot slip past us.
        let signal = Arc::new(Notify::new());
        self.waiters
            .lock()
            .await
            .insert(job_id.clone(), signal.clone());

        let queue_size = {
            let mut queue = self.queue.write().await;
            queue.enqueue(job);
            queue.len()
        };
        tracing::info!(job_id = %job_id, queue_size, "Job queued");

        let outcome = self.await_result(&job_id, &signal).await;
        self.waiters.lock().await.remove(&job_id);

        match outcome {
            Some(result) => {
                tracing::info!(job_id = %job_id, success = result.success, "Job completed");
                Ok(result)
            }
            None => {
                let retracted = self.queue.write().await.remove(&job_id);
                tracing::warn!(job_id = %job_id, retracted, "Timed out waiting for worker");
                Err(RelayError::RendezvousTimeout(job_id))
            }
        }
    }

    /// Run [`Coordinator::submit`] on its own task.
    ///
    /// The rendezvous then finishes, and retracts its job on timeout, even if
    /// the calling future is dropped because the HTTP client went away.
    pub async fn submit_detached(self: &Arc<Self>, request: LoginRequest) -> Result<JobResult> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.submit(request).await })
            .await
            .map_err(|e| RelayError::Internal(format!("rendezvous task failed: {}", e)))?
    }

    async fn await_result(&self, job_id: &JobId, signal: &Notify) -> Option<JobResult> {
        let deadline = Instant::now() + self.timing.rendezvous_timeout;

        loop {
            if let Some(result) = self.results.lock().await.take(job_id) {
                return Some(result);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            let next_poll = (now + self.timing.poll_interval).min(deadline);
            tokio::select! {
                _ = signal.notified() => {}
                _ = tokio::time::sleep_until(next_poll) => {}
            }
        }
    }

    /// Hand the oldest fresh job to the worker.
    pub async fn next_job(&self) -> Option<Job> {
        let job = self.queue.write().await.dequeue_oldest();
        if let Some(ref job) = job {
            tracing::info!(job_id = %job.id, "Job dispatched to worker");
        }
        job
    }

    /// Store the worker's outcome for a job and wake its waiting submission.
    ///
    /// Reports for unknown or already timed-out jobs are stored all the same
    /// and expire unread.
    pub async fn report(&self, report: ResultReport) {
        let (job_id, result) = report.into_result();
        let success = result.success;

        let retention = self.results.lock().await.put(job_id.clone(), result);
        self.schedule_expiry(job_id.clone(), retention);

        let waiting = match self.waiters.lock().await.get(&job_id) {
            Some(signal) => {
                signal.notify_one();
                true
            }
            None => false,
        };

        tracing::info!(job_id = %job_id, success, waiting, "Result reported");
    }

    fn schedule_expiry(&self, job_id: JobId, retention: Retention) {
        let results = Arc::clone(&self.results);
        tokio::spawn(async move {
            tokio::time::sleep_until(retention.expires_at).await;
            if results.lock().await.expire(&job_id, retention) {
                tracing::debug!(job_id = %job_id, "Expired unread result");
            }
        });
    }

    /// Record a worker heartbeat.
    pub async fn heartbeat(&self) {
        self.liveness.write().await.touch();
        tracing::debug!("Worker heartbeat");
    }

    /// Observable phase of a job. Does not consume its result.
    ///
    /// A job that is neither queued nor completed is reported as processing.
    /// That includes ids that never existed and results that already expired
    /// or were consumed.
    pub async fn status(&self, job_id: &JobId) -> JobStatus {
        if self.queue.read().await.contains(job_id) {
            return JobStatus::Queued;
        }
        if let Some(result) = self.results.lock().await.peek(job_id) {
            return JobStatus::Completed(result.clone());
        }
        JobStatus::Processing
    }

    /// Remove and return a stored result, bypassing any waiting submission.
    pub async fn take_result(&self, job_id: &JobId) -> Option<JobResult> {
        self.results.lock().await.take(job_id)
    }

    pub async fn queue_size(&self) -> usize {
        self.queue.read().await.len()
    }

    pub async fn health(&self) -> HealthSnapshot {
        let queue_size = self.queue_size().await;
        let liveness = self.liveness.read().await;
        HealthSnapshot {
            queue_size,
            worker_online: liveness.is_online(),
            last_heartbeat: liveness.last_heartbeat(),
        }
    }
}
