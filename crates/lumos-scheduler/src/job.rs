//! Job identity and lifecycle

use crate::ExportError;
use lumos_proto::{ExportPayload, ExportResult};
use std::fmt;
use std::time::Instant;
use tokio::sync::oneshot;

/// Monotonic job identifier, unique per scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Stage a job has reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Queued,
    Admitted,
    Provisioning,
    RoutePublished,
    TunnelResolved,
    Completed,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobPhase::Queued => "queued",
            JobPhase::Admitted => "admitted",
            JobPhase::Provisioning => "provisioning",
            JobPhase::RoutePublished => "route-published",
            JobPhase::TunnelResolved => "tunnel-resolved",
            JobPhase::Completed => "completed",
        };
        f.write_str(name)
    }
}

pub(crate) type JobReply = oneshot::Sender<Result<ExportResult, ExportError>>;

/// A queued export
pub(crate) struct Job {
    pub id: JobId,
    pub payload: ExportPayload,
    pub reply: JobReply,
    pub submitted_at: Instant,
}

/// Submitter side of a queued job
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    rx: oneshot::Receiver<Result<ExportResult, ExportError>>,
}

impl JobHandle {
    pub(crate) fn new(
        id: JobId,
        rx: oneshot::Receiver<Result<ExportResult, ExportError>>,
    ) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Wait for the job's single result
    pub async fn wait(self) -> Result<ExportResult, ExportError> {
        let id = self.id;
        self.rx.await.unwrap_or(Err(ExportError::Aborted(id)))
    }
}
