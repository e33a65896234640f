use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::scheduler::job::{Job, JobId};

/// Default residency after which an unpulled job is dropped.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct QueuedJob {
    job: Job,
    enqueued_at: Instant,
}

/// FIFO backlog of jobs waiting for the worker.
///
/// Entries are appended in enqueue order with a monotonic timestamp, so the
/// head is always the oldest entry. Stale entries are pruned from the head
/// only when the worker pulls.
#[derive(Debug)]
pub struct JobQueue {
    jobs: VecDeque<QueuedJob>,
    stale_after: Duration,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self::with_stale_after(DEFAULT_STALE_AFTER)
    }

    pub fn with_stale_after(stale_after: Duration) -> Self {
        Self {
            jobs: VecDeque::new(),
            stale_after,
        }
    }

    /// Append a job to the tail of the queue.
    pub fn enqueue(&mut self, job: Job) {
        self.jobs.push_back(QueuedJob {
            job,
            enqueued_at: Instant::now(),
        });
    }

    /// Prune stale entries from the head, then pop the oldest remaining job.
    pub fn dequeue_oldest(&mut self) -> Option<Job> {
        let pruned = self.prune_stale();
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned stale jobs from queue");
        }
        self.jobs.pop_front().map(|entry| entry.job)
    }

    /// Retract a job. Returns false if it was not queued.
    pub fn remove(&mut self, job_id: &JobId) -> bool {
        match self.jobs.iter().position(|entry| &entry.job.id == job_id) {
            Some(index) => {
                self.jobs.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.jobs.iter().any(|entry| &entry.job.id == job_id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn prune_stale(&mut self) -> usize {
        let now = Instant::now();
        let mut pruned = 0;
        while let Some(front) = self.jobs.front() {
            if now.duration_since(front.enqueued_at) <= self.stale_after {
                break;
            }
            self.jobs.pop_front();
            pruned += 1;
        }
        pruned
    }
}
