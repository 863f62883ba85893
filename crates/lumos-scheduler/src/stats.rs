//! Scheduler statistics

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Jobs waiting for a slot
    pub queued: usize,
    /// Jobs currently running
    pub active: usize,
    /// Jobs accepted since start
    pub submitted: u64,
    /// Jobs that produced a public URL
    pub completed: u64,
    /// Jobs that ended with an error
    pub failed: u64,
    /// Submissions refused (queue full or shutting down)
    pub rejected: u64,
}

impl SchedulerStats {
    /// Whether nothing is queued or running
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.active == 0
    }

    pub fn finished(&self) -> u64 {
        self.completed + self.failed
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queued: usize, active: usize) -> SchedulerStats {
        SchedulerStats {
            queued,
            active,
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
