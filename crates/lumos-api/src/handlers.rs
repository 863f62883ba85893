use axum::{extract::State, Json};
use lumos_proto::{ExportPayload, ProjectExport};
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::*;
use crate::{ApiDoc, ApiError, AppState};
use utoipa::OpenApi;

/// Service banner
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service is running", body = MessageResponse)
    ),
    tag = "system"
)]
pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Lumos Backend is running".to_string(),
    })
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/api/heartbeat",
    responses(
        (status = 200, description = "Service is alive", body = HeartbeatResponse)
    ),
    tag = "system"
)]
pub async fn heartbeat() -> Json<HeartbeatResponse> {
    Json(HeartbeatResponse {
        status: "OK".to_string(),
    })
}

/// Export a project as a publicly reachable runtime
///
/// Waits until the export job finishes; this can take minutes when the
/// runtime image has to be built first.
#[utoipa::path(
    post,
    path = "/api/export",
    request_body = ProjectExport,
    responses(
        (status = 200, description = "Project exported", body = ExportResponse),
        (status = 400, description = "Export failed", body = ErrorResponse),
        (status = 503, description = "Export queue full or shutting down", body = ErrorResponse)
    ),
    tag = "export"
)]
pub async fn export_project(
    State(state): State<Arc<AppState>>,
    Json(export): Json<ProjectExport>,
) -> Result<Json<ExportResponse>, ApiError> {
    info!(
        "Export requested ({} agents, {} tools, {} interactions)",
        export.agents.len(),
        export.tools.len(),
        export.interactions.len()
    );

    let result = state.scheduler.submit(ExportPayload::from(export)).await?;

    Ok(Json(ExportResponse {
        message: "Project exported successfully".to_string(),
        url: result.public_url,
        instance: result.instance_name,
    }))
}

/// Request timing, host usage and scheduler figures
#[utoipa::path(
    get,
    path = "/metrics/data",
    responses(
        (status = 200, description = "Current metrics", body = MetricsResponse)
    ),
    tag = "system"
)]
pub async fn metrics_data(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    debug!("Collecting metrics");

    let host = state.system.sample();

    Json(MetricsResponse {
        average_latency: state.latencies.average(),
        cpu_percent: host.cpu_percent,
        memory_percent: host.memory_percent,
        uptime: state.started_at.elapsed().as_secs_f64(),
        latencies: state.latencies.snapshot(),
        scheduler: state.scheduler.stats(),
    })
}

/// OpenAPI document
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
