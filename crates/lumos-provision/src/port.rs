//! Local port selection

use crate::ProvisionError;
use std::net::{SocketAddr, TcpListener};
use tracing::trace;

/// Ask the OS for a currently unused TCP port
///
/// The temporary listener is released before returning; the runtime binds the
/// port right after, so another process could in principle grab it first.
pub fn free_port() -> Result<u16, ProvisionError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], 0));
    let listener = TcpListener::bind(addr).map_err(ProvisionError::PortSelection)?;
    let port = listener
        .local_addr()
        .map_err(ProvisionError::PortSelection)?
        .port();

    trace!("Selected free port {}", port);
    Ok(port)
}
