//! Lumos wire types
//!
//! Shared definitions for the export pipeline: the opaque payload handed to
//! the scheduler, the result returned to callers, the persisted route table
//! layout, and the tunnel agent's control-endpoint response.

pub mod export;
pub mod routes;
pub mod tunnels;

pub use export::{compose_public_url, ExportPayload, ExportResult, ProjectExport};
pub use routes::{local_base_url, RouteTable, DEFAULT_ROUTE_TABLE_PATH};
pub use tunnels::{TunnelInfo, TunnelList, TunnelRecord, DEFAULT_TUNNEL_API};

/// Prefix for generated instance names
pub const INSTANCE_NAME_PREFIX: &str = "ui_";

/// Number of random characters following the prefix
pub const INSTANCE_NAME_LEN: usize = 6;
