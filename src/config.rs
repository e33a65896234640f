use std::net::SocketAddr;
use std::time::Duration;

use crate::scheduler::liveness::DEFAULT_LIVENESS_THRESHOLD;
use crate::scheduler::queue::DEFAULT_STALE_AFTER;
use crate::scheduler::results::DEFAULT_RETENTION;

/// Timing windows of the rendezvous protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingConfig {
    /// Maximum heartbeat age for the worker to count as online.
    pub liveness_threshold: Duration,
    /// Queue residency after which an unpulled job is pruned.
    pub stale_after: Duration,
    /// Ceiling on how long a submission waits for its result.
    pub rendezvous_timeout: Duration,
    /// Interval between result store checks while waiting.
    pub poll_interval: Duration,
    /// Lifetime of a stored result, read or not.
    pub result_retention: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            liveness_threshold: DEFAULT_LIVENESS_THRESHOLD,
            stale_after: DEFAULT_STALE_AFTER,
            rendezvous_timeout: Duration::from_secs(40),
            poll_interval: Duration::from_secs(1),
            result_retention: DEFAULT_RETENTION,
        }
    }
}

impl TimingConfig {
    pub fn with_liveness_threshold(mut self, threshold: Duration) -> Self {
        self.liveness_threshold = threshold;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_rendezvous_timeout(mut self, timeout: Duration) -> Self {
        self.rendezvous_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_result_retention(mut self, retention: Duration) -> Self {
        self.result_retention = retention;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub timing: TimingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            timing: TimingConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }
}
