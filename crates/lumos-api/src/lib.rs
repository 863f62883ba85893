pub mod handlers;
pub mod middleware;
pub mod models;
pub mod system;

use axum::{
    http::{HeaderValue, StatusCode},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lumos_scheduler::{ExportError, ExportScheduler};
use std::{net::SocketAddr, sync::Arc, time::Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::middleware::LatencyTracker;
use crate::models::ErrorResponse;
use crate::system::SystemSampler;

/// Application state shared across handlers
pub struct AppState {
    pub scheduler: ExportScheduler,
    pub latencies: Arc<LatencyTracker>,
    pub system: SystemSampler,
    pub started_at: Instant,
}

/// API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Failed to bind to {address}: {reason}\n\nTroubleshooting:\n  • Check if another process is using this port: lsof -i :{port}\n  • Try using a different address or port")]
    Bind {
        address: String,
        port: u16,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Export(e) if e.is_rejection() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Export(_) => StatusCode::BAD_REQUEST,
            ApiError::Bind { .. } | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        warn!("Request failed ({}): {}", status, self);
        (
            status,
            Json(ErrorResponse {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lumos Backend",
        version = "0.1.0",
        description = "Export orchestration API for the Lumos multi-agent builder"
    ),
    paths(
        handlers::root,
        handlers::heartbeat,
        handlers::export_project,
        handlers::metrics_data,
    ),
    components(
        schemas(
            lumos_proto::ProjectExport,
            models::ExportResponse,
            models::ErrorResponse,
            models::MessageResponse,
            models::HeartbeatResponse,
            models::MetricsResponse,
        )
    ),
    tags(
        (name = "export", description = "Project export endpoints"),
        (name = "system", description = "System health and metrics endpoints")
    )
)]
pub struct ApiDoc;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to bind the API server
    pub bind_addr: SocketAddr,
    /// Allowed CORS origins (no CORS layer when empty)
    pub cors_origins: Vec<String>,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            cors_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

impl ApiServerConfig {
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }
}

/// API Server
pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiServerConfig, scheduler: ExportScheduler) -> Self {
        let state = Arc::new(AppState {
            scheduler,
            latencies: Arc::new(LatencyTracker::new()),
            system: SystemSampler::new(),
            started_at: Instant::now(),
        });

        Self { config, state }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            .route("/", get(handlers::root))
            .route("/api/heartbeat", get(handlers::heartbeat))
            .route("/api/export", post(handlers::export_project))
            .route("/metrics/data", get(handlers::metrics_data))
            .route("/api/openapi.json", get(handlers::openapi_json))
            .with_state(self.state.clone())
            .layer(axum_middleware::from_fn_with_state(
                self.state.latencies.clone(),
                middleware::record_timing,
            ))
            .layer(TraceLayer::new_for_http());

        match self.cors_layer() {
            Some(cors) => router.layer(cors),
            None => router,
        }
    }

    fn cors_layer(&self) -> Option<CorsLayer> {
        let origins: Vec<HeaderValue> = self
            .config
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin {:?}", origin);
                    None
                }
            })
            .collect();

        if origins.is_empty() {
            return None;
        }

        // Credentials rule out wildcards, so methods and headers are mirrored
        Some(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(AllowMethods::mirror_request())
                .allow_headers(AllowHeaders::mirror_request())
                .allow_credentials(true),
        )
    }

    /// Start the API server
    pub async fn start(self) -> Result<(), ApiError> {
        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr).await.map_err(|e| ApiError::Bind {
            address: addr.ip().to_string(),
            port: addr.port(),
            reason: e.to_string(),
        })?;

        info!("Starting API server on {}", addr);
        info!("OpenAPI spec: http://{}/api/openapi.json", addr);

        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<(), ApiError> {
        let router = self.build_router();
        axum::serve(listener, router).await?;
        Ok(())
    }
}
