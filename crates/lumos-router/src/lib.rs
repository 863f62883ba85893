//! Routing state for exported instances
//!
//! Persists the instance-name -> base-URL mapping written by the export
//! scheduler and read by the reverse proxy, and parses the path prefix that
//! selects an instance on incoming requests.

pub mod path;
pub mod store;

pub use path::PathRoute;
pub use store::{RouteTableError, RouteTableStore};
