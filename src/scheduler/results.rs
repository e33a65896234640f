use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::scheduler::job::{JobId, JobResult};

/// Default lifetime of a stored result.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(300);

/// Handle identifying one stored value, used to schedule its removal.
///
/// An overwrite gets a fresh generation, so an expiry scheduled for the old
/// value leaves the new one alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    generation: u64,
    pub expires_at: Instant,
}

#[derive(Debug)]
struct StoredResult {
    result: JobResult,
    generation: u64,
    expires_at: Instant,
}

/// Worker outcomes keyed by job id, each kept for a bounded retention window.
///
/// Expiry is enforced twice: lookups treat an entry past its deadline as
/// absent, and [`ResultStore::expire`] frees the memory once the deferred
/// deletion fires. Both happen under the caller's lock, so a take can never
/// return a result that has already logically expired.
#[derive(Debug)]
pub struct ResultStore {
    results: HashMap<JobId, StoredResult>,
    retention: Duration,
    next_generation: u64,
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            results: HashMap::new(),
            retention,
            next_generation: 0,
        }
    }

    /// Store or overwrite the result for a job.
    ///
    /// The returned [`Retention`] must be handed to [`ResultStore::expire`]
    /// once `expires_at` has passed.
    pub fn put(&mut self, job_id: JobId, result: JobResult) -> Retention {
        self.next_generation += 1;
        let retention = Retention {
            generation: self.next_generation,
            expires_at: Instant::now() + self.retention,
        };
        self.results.insert(
            job_id,
            StoredResult {
                result,
                generation: retention.generation,
                expires_at: retention.expires_at,
            },
        );
        retention
    }

    /// Remove and return the result if present and not expired.
    pub fn take(&mut self, job_id: &JobId) -> Option<JobResult> {
        let stored = self.results.remove(job_id)?;
        if stored.expires_at <= Instant::now() {
            return None;
        }
        Some(stored.result)
    }

    /// Read the result without consuming it.
    pub fn peek(&self, job_id: &JobId) -> Option<&JobResult> {
        self.results
            .get(job_id)
            .filter(|stored| stored.expires_at > Instant::now())
            .map(|stored| &stored.result)
    }

    /// Drop the value stored under `retention`, if it is still the current
    /// one. Returns true if something was removed.
    pub fn expire(&mut self, job_id: &JobId, retention: Retention) -> bool {
        match self.results.get(job_id) {
            Some(stored) if stored.generation == retention.generation => {
                self.results.remove(job_id);
                true
            }
            _ => false,
        }
    }

    /// Number of stored entries, including expired ones not yet freed.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
