//! Provisioner configuration

use std::path::PathBuf;
use std::time::Duration;

/// Docker provisioner settings
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Container CLI to invoke
    pub docker_bin: String,
    /// Tag of the shared runtime image
    pub image: String,
    /// Directory holding the runtime image definition
    pub build_context: PathBuf,
    /// Port the runtime listens on inside the container
    pub container_port: u16,
    /// Directory receiving per-instance launch logs
    pub log_dir: PathBuf,
    /// Wait after launch before the instance is considered ready
    pub grace_period: Duration,
    /// Rebuild the image for every export instead of once per process
    pub rebuild_per_job: bool,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            image: "simple-ui-app".to_string(),
            build_context: PathBuf::from("./ui_app"),
            container_port: 5000,
            log_dir: PathBuf::from("."),
            grace_period: Duration::from_secs(2),
            rebuild_per_job: false,
        }
    }
}

impl ProvisionerConfig {
    pub fn with_docker_bin(mut self, docker_bin: impl Into<String>) -> Self {
        self.docker_bin = docker_bin.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_build_context(mut self, build_context: impl Into<PathBuf>) -> Self {
        self.build_context = build_context.into();
        self
    }

    pub fn with_container_port(mut self, port: u16) -> Self {
        self.container_port = port;
        self
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_rebuild_per_job(mut self, rebuild: bool) -> Self {
        self.rebuild_per_job = rebuild;
        self
    }

    /// Per-instance launch log location
    pub fn run_log_path(&self, instance_name: &str) -> PathBuf {
        self.log_dir.join(format!("docker_run_{}.log", instance_name))
    }
}
