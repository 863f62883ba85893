//! Proxy HTTP server

use crate::{strip_excluded_headers, ProxyError, UpstreamClient};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::Router;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use lumos_router::{PathRoute, RouteTableStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Reverse proxy settings
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address to listen on
    pub bind_addr: SocketAddr,
    /// Largest request body forwarded to an instance
    pub max_body_bytes: usize,
    /// Bound on one upstream exchange
    pub upstream_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_body_bytes: 10 * 1024 * 1024,
            upstream_timeout: Duration::from_secs(60),
        }
    }
}

impl ProxyConfig {
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }
}

struct ProxyState {
    routes: Arc<RouteTableStore>,
    client: UpstreamClient,
    max_body_bytes: usize,
}

/// Reverse proxy in front of all exported instances
pub struct ProxyServer {
    config: ProxyConfig,
    state: Arc<ProxyState>,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig, routes: Arc<RouteTableStore>) -> Self {
        let state = Arc::new(ProxyState {
            routes,
            client: UpstreamClient::new(config.upstream_timeout),
            max_body_bytes: config.max_body_bytes,
        });

        Self { config, state }
    }

    pub fn build_router(&self) -> Router {
        Router::new()
            .fallback(proxy_request)
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until the future is dropped
    pub async fn start(self) -> Result<(), ProxyError> {
        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ProxyError::Bind {
                address: addr.ip().to_string(),
                port: addr.port(),
                reason: e.to_string(),
            })?;

        info!("Reverse proxy listening on {}", addr);
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<(), ProxyError> {
        axum::serve(listener, self.build_router()).await?;
        Ok(())
    }
}

async fn proxy_request(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
    match forward(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            match &e {
                ProxyError::UnknownInstance => debug!("Rejecting request for unknown instance"),
                other => warn!("Proxy error: {}", other),
            }
            e.into_response()
        }
    }
}

async fn forward(state: &ProxyState, request: Request) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();

    let route = PathRoute::parse(parts.uri.path()).ok_or(ProxyError::UnknownInstance)?;
    let base_url = state
        .routes
        .lookup(route.instance)
        .await?
        .ok_or(ProxyError::UnknownInstance)?;

    let body = Limited::new(body, state.max_body_bytes)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                ProxyError::PayloadTooLarge(state.max_body_bytes)
            } else {
                ProxyError::Body(e.to_string())
            }
        })?
        .to_bytes();

    let url = route.upstream_url(&base_url, parts.uri.query());
    let upstream = state
        .client
        .forward(parts.method.clone(), &url, &parts.headers, body)
        .await?;

    debug!(
        "{} {} -> {} ({})",
        parts.method,
        parts.uri.path(),
        url,
        upstream.status()
    );

    let (mut upstream_parts, upstream_body) = upstream.into_parts();
    strip_excluded_headers(&mut upstream_parts.headers);

    Ok(Response::from_parts(upstream_parts, Body::new(upstream_body)))
}
