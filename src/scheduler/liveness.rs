use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Default maximum heartbeat age for the worker to count as online.
pub const DEFAULT_LIVENESS_THRESHOLD: Duration = Duration::from_secs(15);

/// Tracks the last heartbeat of the single remote worker.
#[derive(Debug)]
pub struct LivenessTracker {
    last_seen: Option<Instant>,
    last_seen_at: Option<DateTime<Utc>>,
    threshold: Duration,
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new(DEFAULT_LIVENESS_THRESHOLD)
    }
}

impl LivenessTracker {
    pub fn new(threshold: Duration) -> Self {
        Self {
            last_seen: None,
            last_seen_at: None,
            threshold,
        }
    }

    /// Record a heartbeat, replacing any earlier one.
    pub fn touch(&mut self) {
        self.last_seen = Some(Instant::now());
        self.last_seen_at = Some(Utc::now());
    }

    /// True iff a heartbeat was seen less than `threshold` ago.
    pub fn is_online(&self) -> bool {
        self.last_seen.is_some_and(|seen| seen.elapsed() < self.threshold)
    }

    /// Wall-clock time of the last heartbeat.
    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.last_seen_at
    }
}
