//! Tunnel agent control-endpoint types
//!
//! The local tunnel agent answers `GET /api/tunnels` with the list of
//! tunnels it currently maintains. Only the public URL of the first entry
//! is consumed; every other field is ignored.

use serde::{Deserialize, Serialize};

/// Default control endpoint of the local tunnel agent
pub const DEFAULT_TUNNEL_API: &str = "http://localhost:4040/api/tunnels";

/// Response of the tunnel agent's control endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TunnelList {
    #[serde(default)]
    pub tunnels: Vec<TunnelRecord>,
}

/// One tunnel as reported by the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelRecord {
    /// Externally reachable base URL
    pub public_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<String>,
}

impl TunnelList {
    /// Public URL of the first tunnel (first wins when several exist)
    pub fn first_public_url(&self) -> Option<&str> {
        self.tunnels
            .first()
            .map(|t| t.public_url.as_str())
            .filter(|url| !url.is_empty())
    }
}

/// Resolved tunnel, fetched fresh for every export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelInfo {
    pub public_url: String,
}
