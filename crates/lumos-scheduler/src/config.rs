//! Scheduler configuration

use std::time::Duration;

/// Export scheduler settings
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of jobs running at once
    pub max_concurrent: usize,
    /// Maximum number of jobs waiting for a slot
    pub max_queue_depth: usize,
    /// Bound on one job's whole pipeline
    pub job_timeout: Duration,
    /// Undo completed steps of a failed job
    pub rollback_on_failure: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_queue_depth: 32,
            job_timeout: Duration::from_secs(300),
            rollback_on_failure: true,
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_rollback_on_failure(mut self, rollback: bool) -> Self {
        self.rollback_on_failure = rollback;
        self
    }

    /// Concurrency limit actually applied (never zero)
    pub(crate) fn concurrency_limit(&self) -> usize {
        self.max_concurrent.max(1)
    }
}
