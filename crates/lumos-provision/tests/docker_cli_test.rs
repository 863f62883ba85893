//! Provisioner against a recording stand-in for the container CLI
#![cfg(unix)]

use lumos_proto::ExportPayload;
use lumos_provision::{DockerProvisioner, Provisioner, ProvisionerConfig};
use serde_json::json;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Script that records each invocation on its own line and prints a fake
/// container id
fn recording_cli(dir: &Path) -> (PathBuf, PathBuf) {
    let calls = dir.join("calls.txt");
    let script = dir.join("fake-docker");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\necho \"$@\" >> {}\necho 3f2a9c\necho warming up >&2\n",
            calls.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    (script, calls)
}

fn read_calls(calls: &Path) -> Vec<String> {
    std::fs::read_to_string(calls)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn config(script: &Path, log_dir: &Path) -> ProvisionerConfig {
    ProvisionerConfig::default()
        .with_docker_bin(script.to_string_lossy())
        .with_log_dir(log_dir)
        .with_build_context("/srv/ui_app")
        .with_grace_period(Duration::ZERO)
}

#[tokio::test]
async fn test_image_is_built_once_per_process() {
    let temp = TempDir::new().unwrap();
    let (script, calls) = recording_cli(temp.path());
    let provisioner = DockerProvisioner::new(config(&script, temp.path()));
    let payload = ExportPayload::new(json!({"project": {"name": "demo"}}));

    let first = provisioner.provision(&payload).await.unwrap();
    let second = provisioner.provision(&payload).await.unwrap();
    assert_ne!(first.name, second.name);

    let calls = read_calls(&calls);
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], "build --no-cache -t simple-ui-app /srv/ui_app");
    assert!(calls[1].starts_with("run -d -p "));
    assert!(calls[2].starts_with("run -d -p "));
}

#[tokio::test]
async fn test_rebuild_per_job() {
    let temp = TempDir::new().unwrap();
    let (script, calls) = recording_cli(temp.path());
    let provisioner =
        DockerProvisioner::new(config(&script, temp.path()).with_rebuild_per_job(true));
    let payload = ExportPayload::new(json!({}));

    provisioner.provision(&payload).await.unwrap();
    provisioner.provision(&payload).await.unwrap();

    let builds = read_calls(&calls)
        .iter()
        .filter(|c| c.starts_with("build "))
        .count();
    assert_eq!(builds, 2);
}

#[tokio::test]
async fn test_run_invocation_and_log() {
    let temp = TempDir::new().unwrap();
    let (script, calls) = recording_cli(temp.path());
    let provisioner = DockerProvisioner::new(config(&script, temp.path()));
    let payload = ExportPayload::new(json!({"project": {"name": "demo"}}));

    let instance = provisioner.provision(&payload).await.unwrap();

    let run = read_calls(&calls).pop().unwrap();
    assert_eq!(
        run,
        format!(
            "run -d -p {}:5000 --name {} -e CONFIG={{\"project\":{{\"name\":\"demo\"}}}} simple-ui-app",
            instance.port, instance.name
        )
    );

    let log_path = temp.path().join(format!("docker_run_{}.log", instance.name));
    let log = std::fs::read_to_string(log_path).unwrap();
    assert!(log.contains("3f2a9c"));
    assert!(log.contains("warming up"));
}

#[tokio::test]
async fn test_teardown_removes_container() {
    let temp = TempDir::new().unwrap();
    let (script, calls) = recording_cli(temp.path());
    let provisioner = DockerProvisioner::new(config(&script, temp.path()));

    let instance = provisioner
        .provision(&ExportPayload::new(json!({})))
        .await
        .unwrap();
    provisioner.teardown(&instance).await.unwrap();

    let last = read_calls(&calls).pop().unwrap();
    assert_eq!(last, format!("rm -f {}", instance.name));
}
