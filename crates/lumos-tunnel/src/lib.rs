//! Public URL discovery through a local tunnel agent
//!
//! The tunnel agent (ngrok or compatible) forwards a public base URL to the
//! reverse proxy and reports it on a local control endpoint. The resolver
//! polls that endpoint for every export; [`TunnelAgent`] optionally runs the
//! agent process next to the proxy.

pub mod agent;
pub mod resolver;

pub use agent::TunnelAgent;
pub use resolver::{HttpTunnelResolver, TunnelResolver, TunnelResolverConfig};

use thiserror::Error;

/// Tunnel errors
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Tunnel URL unavailable after {attempts} attempt(s): {last_error}")]
    Unavailable { attempts: u32, last_error: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Empty tunnel agent command")]
    EmptyCommand,

    #[error("Failed to spawn tunnel agent `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stop tunnel agent: {0}")]
    Stop(#[source] std::io::Error),
}
