//! Route table layout
//!
//! On disk the table is a single JSON object mapping instance names to the
//! local base URL their runtime listens on:
//!
//! ```json
//! { "ui_k3j9xa": "http://localhost:50123" }
//! ```

use std::collections::BTreeMap;

/// Default location of the route table file
pub const DEFAULT_ROUTE_TABLE_PATH: &str = "route_map.json";

/// Instance name -> base URL
pub type RouteTable = BTreeMap<String, String>;

/// Base URL for a runtime bound to a local port
pub fn local_base_url(port: u16) -> String {
    format!("http://localhost:{}", port)
}
