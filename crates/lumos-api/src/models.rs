use lumos_scheduler::SchedulerStats;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Successful export
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExportResponse {
    /// Human-readable outcome
    pub message: String,
    /// Public URL of the exported instance
    pub url: String,
    /// Instance name (route prefix on the proxy)
    pub instance: String,
}

/// Error body, `{"detail": ...}`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub detail: String,
}

/// Plain status message
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Liveness probe
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HeartbeatResponse {
    pub status: String,
}

/// Request timing, host usage and scheduler figures
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MetricsResponse {
    /// Mean of the recorded request durations, in seconds
    pub average_latency: f64,
    /// Host CPU usage since the previous sample, in percent
    pub cpu_percent: f64,
    /// Host memory in use, in percent
    pub memory_percent: f64,
    /// Seconds since the server started
    pub uptime: f64,
    /// Most recent request durations, in seconds, oldest first
    pub latencies: Vec<f64>,
    /// Export scheduler snapshot
    #[schema(value_type = Object)]
    pub scheduler: SchedulerStats,
}
