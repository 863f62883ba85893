//! Path-prefix reverse proxy for exported instances
//!
//! Requests for `/<instance>/<rest>` are forwarded to the base URL stored
//! for `<instance>` in the route table. The table is re-read on every
//! request so routes published by the export scheduler (usually another
//! process) take effect immediately.

pub mod forward;
pub mod server;

pub use forward::{strip_excluded_headers, UpstreamClient, EXCLUDED_HEADERS};
pub use server::{ProxyConfig, ProxyServer};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lumos_router::RouteTableError;
use serde_json::json;
use thiserror::Error;

/// Reverse proxy errors
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Unknown instance")]
    UnknownInstance,

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Failed to read request body: {0}")]
    Body(String),

    #[error("Invalid upstream request: {0}")]
    InvalidRequest(#[from] http::Error),

    #[error("Upstream unreachable: {0}")]
    Upstream(String),

    #[error("Upstream did not answer within {0}s")]
    UpstreamTimeout(u64),

    #[error("Route table unavailable: {0}")]
    RouteTable(#[from] RouteTableError),

    #[error("Failed to bind to {address}: {reason}\n\nTroubleshooting:\n  • Check if another process is using this port: lsof -i :{port}\n  • Try using a different address or port")]
    Bind {
        address: String,
        port: u16,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::UnknownInstance => StatusCode::NOT_FOUND,
            ProxyError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Body(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(_) | ProxyError::InvalidRequest(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::RouteTable(_) | ProxyError::Bind { .. } | ProxyError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
