//! Export errors

use crate::JobId;
use lumos_provision::ProvisionError;
use lumos_router::RouteTableError;
use lumos_tunnel::TunnelError;
use std::time::Duration;
use thiserror::Error;

/// Why an export did not produce a public URL
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Provisioning failed: {0}")]
    Provisioning(#[from] ProvisionError),

    #[error("Tunnel unavailable: {0}")]
    TunnelUnavailable(#[from] TunnelError),

    #[error("Route table update failed: {0}")]
    RouteTable(#[from] RouteTableError),

    #[error("Export timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Export queue is full ({0} jobs waiting)")]
    QueueFull(usize),

    #[error("Export scheduler is shutting down")]
    ShuttingDown,

    #[error("Export job {0} ended without a result")]
    Aborted(JobId),
}

impl ExportError {
    /// Whether the job was refused before being queued
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::QueueFull(_) | Self::ShuttingDown)
    }
}
