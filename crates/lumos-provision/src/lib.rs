//! Runtime provisioning for exported projects
//!
//! A [`Provisioner`] turns an export payload into a running, locally
//! reachable [`Instance`]. The production implementation is
//! [`DockerProvisioner`]; the scheduler only depends on the trait.

pub mod config;
pub mod docker;
pub mod names;
pub mod port;

pub use config::ProvisionerConfig;
pub use docker::DockerProvisioner;
pub use names::NameAllocator;
#[cfg(test)]
pub(crate) use names::is_instance_name;
pub use port::free_port;

use async_trait::async_trait;
use lumos_proto::{local_base_url, ExportPayload};
use thiserror::Error;

/// Provisioning errors
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Failed to select a free port: {0}")]
    PortSelection(#[source] std::io::Error),

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },
}

/// A running runtime for one export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Unique instance name, also the proxy route prefix
    pub name: String,
    /// Local port the runtime is published on
    pub port: u16,
}

impl Instance {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }

    /// Local base URL stored in the route table
    pub fn base_url(&self) -> String {
        local_base_url(self.port)
    }
}

/// Builds, launches and removes export runtimes
///
/// Provisioning happens in two steps so a caller can record the instance
/// before anything is started: once [`Provisioner::launch`] has begun, the
/// instance may exist and must be torn down on failure.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Pick the instance's name and port and get the runtime image ready
    ///
    /// Nothing is running yet when this returns.
    async fn prepare(&self) -> Result<Instance, ProvisionError>;

    /// Start the runtime for a prepared instance and wait until it is up
    async fn launch(
        &self,
        instance: &Instance,
        payload: &ExportPayload,
    ) -> Result<(), ProvisionError>;

    /// Remove a previously launched runtime
    async fn teardown(&self, instance: &Instance) -> Result<(), ProvisionError>;

    /// Prepare and launch in one go
    async fn provision(&self, payload: &ExportPayload) -> Result<Instance, ProvisionError> {
        let instance = self.prepare().await?;
        self.launch(&instance, payload).await?;
        Ok(instance)
    }
}
