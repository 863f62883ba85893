//! Docker-backed provisioner
//!
//! Each export becomes one detached container of the shared runtime image,
//! with the port published on the host and the export configuration passed
//! through the `CONFIG` environment variable.

use crate::{free_port, Instance, NameAllocator, ProvisionError, Provisioner, ProvisionerConfig};
use async_trait::async_trait;
use lumos_proto::ExportPayload;
use std::process::Output;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Provisions export runtimes as Docker containers
pub struct DockerProvisioner {
    config: ProvisionerConfig,
    names: NameAllocator,
    image_ready: OnceCell<()>,
}

impl DockerProvisioner {
    pub fn new(config: ProvisionerConfig) -> Self {
        Self {
            config,
            names: NameAllocator::new(),
            image_ready: OnceCell::new(),
        }
    }

    /// Keep the given names (typically the current route table keys) out
    /// of the allocation pool
    pub fn with_reserved_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = NameAllocator::with_reserved(names);
        self
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    /// Build the runtime image unless it was already built by this process
    pub async fn ensure_image(&self) -> Result<(), ProvisionError> {
        if self.config.rebuild_per_job {
            return self.build_image().await;
        }

        self.image_ready
            .get_or_try_init(|| self.build_image())
            .await
            .map(|_| ())
    }

    async fn build_image(&self) -> Result<(), ProvisionError> {
        let build_context = self.config.build_context.to_string_lossy().into_owned();
        let args = vec![
            "build".to_string(),
            "--no-cache".to_string(),
            "-t".to_string(),
            self.config.image.clone(),
            build_context,
        ];

        info!(
            "Building runtime image {} from {:?}",
            self.config.image, self.config.build_context
        );
        let (command, output) = self.execute(&args).await?;
        check_status(command, output)?;
        debug!("Runtime image {} is ready", self.config.image);
        Ok(())
    }

    fn run_args(&self, name: &str, port: u16, payload: &ExportPayload) -> Vec<String> {
        vec![
            "run".to_string(),
            "-d".to_string(),
            "-p".to_string(),
            format!("{}:{}", port, self.config.container_port),
            "--name".to_string(),
            name.to_string(),
            "-e".to_string(),
            format!("CONFIG={}", payload.to_config_string()),
            self.config.image.clone(),
        ]
    }

    async fn execute(&self, args: &[String]) -> Result<(String, Output), ProvisionError> {
        let command = format!("{} {}", self.config.docker_bin, args.join(" "));
        debug!("Running {}", command);

        let output = Command::new(&self.config.docker_bin)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProvisionError::Spawn {
                command: command.clone(),
                source,
            })?;

        Ok((command, output))
    }

    async fn append_run_log(&self, name: &str, output: &Output) {
        let path = self.config.run_log_path(name);
        let entry = format!(
            "STDOUT:\n{}\nSTDERR:\n{}\n",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        let result = async {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(entry.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!("Failed to write launch log {:?}: {}", path, e);
        }
    }
}

fn check_status(command: String, output: Output) -> Result<Output, ProvisionError> {
    if output.status.success() {
        return Ok(output);
    }

    Err(ProvisionError::CommandFailed {
        command,
        status: output.status.to_string(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

#[async_trait]
impl Provisioner for DockerProvisioner {
    async fn prepare(&self) -> Result<Instance, ProvisionError> {
        let port = free_port()?;
        let name = self.names.allocate();
        debug!("Provisioning {} on port {}", name, port);

        self.ensure_image().await?;
        Ok(Instance::new(name, port))
    }

    async fn launch(
        &self,
        instance: &Instance,
        payload: &ExportPayload,
    ) -> Result<(), ProvisionError> {
        let args = self.run_args(&instance.name, instance.port, payload);
        let (command, output) = self.execute(&args).await?;
        self.append_run_log(&instance.name, &output).await;
        check_status(command, output)?;

        if !self.config.grace_period.is_zero() {
            tokio::time::sleep(self.config.grace_period).await;
        }

        info!("Runtime {} started on port {}", instance.name, instance.port);
        Ok(())
    }

    async fn teardown(&self, instance: &Instance) -> Result<(), ProvisionError> {
        let args = vec!["rm".to_string(), "-f".to_string(), instance.name.clone()];
        let (command, output) = self.execute(&args).await?;
        check_status(command, output)?;

        info!("Removed runtime {}", instance.name);
        Ok(())
    }
}
