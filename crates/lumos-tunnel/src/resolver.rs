//! Control-endpoint polling

use crate::TunnelError;
use async_trait::async_trait;
use lumos_proto::{TunnelInfo, TunnelList, DEFAULT_TUNNEL_API};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tunnel resolver settings
#[derive(Debug, Clone)]
pub struct TunnelResolverConfig {
    /// Tunnel agent control endpoint
    pub control_url: String,
    /// Total number of attempts before giving up
    pub attempts: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
    /// Bound on each individual request
    pub request_timeout: Duration,
}

impl Default for TunnelResolverConfig {
    fn default() -> Self {
        Self {
            control_url: DEFAULT_TUNNEL_API.to_string(),
            attempts: 6,
            retry_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(2),
        }
    }
}

impl TunnelResolverConfig {
    pub fn with_control_url(mut self, url: impl Into<String>) -> Self {
        self.control_url = url.into();
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Supplies the public base URL of the active tunnel
#[async_trait]
pub trait TunnelResolver: Send + Sync {
    async fn resolve(&self) -> Result<TunnelInfo, TunnelError>;
}

/// Resolver backed by the tunnel agent's HTTP control endpoint
pub struct HttpTunnelResolver {
    config: TunnelResolverConfig,
    client: reqwest::Client,
}

impl HttpTunnelResolver {
    pub fn new(config: TunnelResolverConfig) -> Result<Self, TunnelError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .no_proxy()
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &TunnelResolverConfig {
        &self.config
    }

    /// One request against the control endpoint
    async fn fetch_once(&self) -> Result<String, String> {
        let response = self
            .client
            .get(&self.config.control_url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("control endpoint returned {}", status));
        }

        let list: TunnelList = response
            .json()
            .await
            .map_err(|e| format!("invalid response: {}", e))?;

        list.first_public_url()
            .map(str::to_string)
            .ok_or_else(|| "no active tunnels".to_string())
    }
}

#[async_trait]
impl TunnelResolver for HttpTunnelResolver {
    async fn resolve(&self) -> Result<TunnelInfo, TunnelError> {
        let attempts = self.config.attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.fetch_once().await {
                Ok(public_url) => {
                    info!("Resolved tunnel URL {}", public_url);
                    return Ok(TunnelInfo { public_url });
                }
                Err(e) => {
                    debug!(
                        "Tunnel lookup attempt {}/{} failed: {}",
                        attempt, attempts, e
                    );
                    last_error = e;
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        warn!(
            "Tunnel URL not available from {} after {} attempts",
            self.config.control_url, attempts
        );
        Err(TunnelError::Unavailable {
            attempts,
            last_error,
        })
    }
}
