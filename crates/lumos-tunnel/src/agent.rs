//! Tunnel agent child process

use crate::TunnelError;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// A tunnel agent launched from a command line such as `ngrok http 8080`
///
/// The process is killed when [`TunnelAgent::stop`] is called or the handle
/// is dropped.
pub struct TunnelAgent {
    command: String,
    child: Child,
}

impl TunnelAgent {
    pub fn spawn(command_line: &str) -> Result<Self, TunnelError> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next().ok_or(TunnelError::EmptyCommand)?;

        let child = Command::new(program)
            .args(parts)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TunnelError::Spawn {
                command: command_line.to_string(),
                source,
            })?;

        info!(
            "Started tunnel agent `{}` (pid {:?})",
            command_line,
            child.id()
        );

        Ok(Self {
            command: command_line.to_string(),
            child,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Whether the agent process is still alive
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill the agent and wait for it to exit
    pub async fn stop(mut self) -> Result<(), TunnelError> {
        if let Ok(Some(status)) = self.child.try_wait() {
            debug!("Tunnel agent already exited with {}", status);
            return Ok(());
        }

        self.child.kill().await.map_err(TunnelError::Stop)?;
        info!("Stopped tunnel agent `{}`", self.command);
        Ok(())
    }
}
