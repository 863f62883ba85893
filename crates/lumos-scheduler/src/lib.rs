//! Export scheduling
//!
//! Export requests are queued and admitted in FIFO order, with at most
//! `max_concurrent` jobs provisioning at a time. Each admitted job runs the
//! pipeline provision -> publish route -> resolve tunnel as its own task
//! and resolves its submitter exactly once.

pub mod config;
pub mod error;
pub mod job;
pub mod scheduler;
pub mod stats;

pub use config::SchedulerConfig;
pub use error::ExportError;
pub use job::{JobHandle, JobId, JobPhase};
pub use scheduler::ExportScheduler;
pub use stats::SchedulerStats;
