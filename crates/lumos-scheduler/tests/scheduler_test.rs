//! Export scheduler scenarios against fake provisioner and resolver

use async_trait::async_trait;
use lumos_proto::{ExportPayload, TunnelInfo};
use lumos_provision::{Instance, ProvisionError, Provisioner};
use lumos_router::RouteTableStore;
use lumos_scheduler::{ExportError, ExportScheduler, SchedulerConfig};
use lumos_tunnel::{TunnelError, TunnelResolver};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

#[derive(Default)]
struct FakeProvisioner {
    next_port: AtomicU16,
    /// Time spent preparing (image build)
    delay: Duration,
    /// Time spent launching, after the runtime may exist
    launch_delay: Duration,
    fail: bool,
    fail_launch: bool,
    panic: AtomicBool,
    /// When set, each provision waits for one permit
    gate: Option<Arc<Semaphore>>,
    running: AtomicUsize,
    peak: AtomicUsize,
    order: Mutex<Vec<u64>>,
    torn_down: Mutex<Vec<String>>,
}

impl FakeProvisioner {
    fn new() -> Self {
        Self {
            next_port: AtomicU16::new(42000),
            ..Default::default()
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn torn_down(&self) -> Vec<String> {
        self.torn_down.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn prepare(&self) -> Result<Instance, ProvisionError> {
        if self.panic.swap(false, Ordering::SeqCst) {
            panic!("provisioner crashed");
        }

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            return Err(ProvisionError::CommandFailed {
                command: "docker build".to_string(),
                status: "exit status: 1".to_string(),
                stdout: String::new(),
                stderr: "image not found".to_string(),
            });
        }

        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        Ok(Instance::new(format!("ui_t{:05}", port), port))
    }

    async fn launch(
        &self,
        _instance: &Instance,
        payload: &ExportPayload,
    ) -> Result<(), ProvisionError> {
        if let Some(seq) = payload.as_value()["seq"].as_u64() {
            self.order.lock().unwrap().push(seq);
        }

        if !self.launch_delay.is_zero() {
            tokio::time::sleep(self.launch_delay).await;
        }

        if self.fail_launch {
            return Err(ProvisionError::CommandFailed {
                command: "docker run".to_string(),
                status: "exit status: 125".to_string(),
                stdout: String::new(),
                stderr: "port is already allocated".to_string(),
            });
        }

        Ok(())
    }

    async fn teardown(&self, instance: &Instance) -> Result<(), ProvisionError> {
        self.torn_down.lock().unwrap().push(instance.name.clone());
        Ok(())
    }
}

struct FakeResolver {
    public_url: Option<String>,
    delay: Duration,
}

impl FakeResolver {
    fn ok(url: &str) -> Self {
        Self {
            public_url: Some(url.to_string()),
            delay: Duration::ZERO,
        }
    }

    fn unavailable() -> Self {
        Self {
            public_url: None,
            delay: Duration::ZERO,
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            public_url: Some("https://slow.example".to_string()),
            delay,
        }
    }
}

#[async_trait]
impl TunnelResolver for FakeResolver {
    async fn resolve(&self) -> Result<TunnelInfo, TunnelError> {
        tokio::time::sleep(self.delay).await;
        match &self.public_url {
            Some(url) => Ok(TunnelInfo {
                public_url: url.clone(),
            }),
            None => Err(TunnelError::Unavailable {
                attempts: 6,
                last_error: "no active tunnels".to_string(),
            }),
        }
    }
}

struct Harness {
    scheduler: ExportScheduler,
    provisioner: Arc<FakeProvisioner>,
    routes: Arc<RouteTableStore>,
    _temp: TempDir,
}

fn harness(
    config: SchedulerConfig,
    provisioner: FakeProvisioner,
    resolver: FakeResolver,
) -> Harness {
    let temp = TempDir::new().unwrap();
    let routes = Arc::new(RouteTableStore::new(temp.path().join("route_map.json")));
    let provisioner = Arc::new(provisioner);

    let scheduler = ExportScheduler::start(
        config,
        provisioner.clone(),
        routes.clone(),
        Arc::new(resolver),
    );

    Harness {
        scheduler,
        provisioner,
        routes,
        _temp: temp,
    }
}

fn payload(seq: u64) -> ExportPayload {
    ExportPayload::new(json!({"project": {"name": "demo"}, "seq": seq}))
}

async fn wait_for_active(scheduler: &ExportScheduler, active: usize) {
    for _ in 0..200 {
        if scheduler.stats().active == active {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("scheduler never reached {} active jobs", active);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_five_jobs_with_three_slots() {
    let h = harness(
        SchedulerConfig::default().with_max_concurrent(3),
        FakeProvisioner::new().with_delay(Duration::from_millis(100)),
        FakeResolver::ok("https://abc.ngrok.app"),
    );

    let handles: Vec<_> = (0..5)
        .map(|i| h.scheduler.enqueue(payload(i)).unwrap())
        .collect();

    let sampler = {
        let scheduler = h.scheduler.clone();
        tokio::spawn(async move {
            let mut max_seen = 0;
            for _ in 0..100 {
                max_seen = max_seen.max(scheduler.stats().active);
                tokio::time::sleep(Duration::from_millis(3)).await;
            }
            max_seen
        })
    };

    let results = futures::future::join_all(handles.into_iter().map(|h| h.wait())).await;
    for result in &results {
        let result = result.as_ref().unwrap();
        assert!(result.public_url.starts_with("https://abc.ngrok.app/ui_t"));
    }

    assert!(h.provisioner.peak.load(Ordering::SeqCst) <= 3);
    assert!(sampler.await.unwrap() <= 3);

    let stats = h.scheduler.stats();
    assert_eq!(stats.completed, 5);
    assert_eq!(h.routes.load_all().await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_admission_is_fifo() {
    let h = harness(
        SchedulerConfig::default().with_max_concurrent(1),
        FakeProvisioner::new().with_delay(Duration::from_millis(5)),
        FakeResolver::ok("https://abc.ngrok.app"),
    );

    let handles: Vec<_> = (0..6)
        .map(|i| h.scheduler.enqueue(payload(i)).unwrap())
        .collect();
    for handle in handles {
        handle.wait().await.unwrap();
    }

    assert_eq!(*h.provisioner.order.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_queue_full_is_rejected_synchronously() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(
        SchedulerConfig::default()
            .with_max_concurrent(1)
            .with_max_queue_depth(2),
        FakeProvisioner::new().gated(gate.clone()),
        FakeResolver::ok("https://abc.ngrok.app"),
    );

    let first = h.scheduler.enqueue(payload(0)).unwrap();
    wait_for_active(&h.scheduler, 1).await;

    let second = h.scheduler.enqueue(payload(1)).unwrap();
    let third = h.scheduler.enqueue(payload(2)).unwrap();

    let err = h.scheduler.enqueue(payload(3)).unwrap_err();
    assert!(matches!(err, ExportError::QueueFull(2)));
    assert_eq!(h.scheduler.stats().rejected, 1);
    assert_eq!(h.scheduler.stats().queued, 2);

    gate.add_permits(3);
    for handle in [first, second, third] {
        handle.wait().await.unwrap();
    }
    assert_eq!(h.scheduler.stats().completed, 3);
}

#[tokio::test]
async fn test_zero_queue_depth_still_fills_free_slots() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(
        SchedulerConfig::default()
            .with_max_concurrent(3)
            .with_max_queue_depth(0),
        FakeProvisioner::new().gated(gate.clone()),
        FakeResolver::ok("https://abc.ngrok.app"),
    );

    let handles: Vec<_> = (0..3)
        .map(|i| h.scheduler.enqueue(payload(i)).unwrap())
        .collect();

    let err = h.scheduler.enqueue(payload(3)).unwrap_err();
    assert!(matches!(err, ExportError::QueueFull(0)));

    gate.add_permits(3);
    for handle in handles {
        handle.wait().await.unwrap();
    }
    assert_eq!(h.scheduler.stats().completed, 3);
    assert_eq!(h.scheduler.stats().rejected, 1);
}

#[tokio::test]
async fn test_burst_below_free_capacity_is_accepted() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(
        SchedulerConfig::default()
            .with_max_concurrent(3)
            .with_max_queue_depth(1),
        FakeProvisioner::new().gated(gate.clone()),
        FakeResolver::ok("https://abc.ngrok.app"),
    );

    // Three free slots plus one waiting job
    let handles: Vec<_> = (0..4)
        .map(|i| h.scheduler.enqueue(payload(i)).unwrap())
        .collect();

    let err = h.scheduler.enqueue(payload(4)).unwrap_err();
    assert!(matches!(err, ExportError::QueueFull(1)));

    gate.add_permits(4);
    for handle in handles {
        handle.wait().await.unwrap();
    }
    assert_eq!(h.scheduler.stats().completed, 4);
}

#[tokio::test]
async fn test_job_timeout() {
    let h = harness(
        SchedulerConfig::default().with_job_timeout(Duration::from_millis(100)),
        FakeProvisioner::new().with_delay(Duration::from_secs(10)),
        FakeResolver::ok("https://abc.ngrok.app"),
    );

    let err = h.scheduler.submit(payload(0)).await.unwrap_err();
    assert!(matches!(err, ExportError::Timeout(_)));

    // Nothing was provisioned, so nothing to undo
    assert!(h.provisioner.torn_down().is_empty());
    assert_eq!(h.scheduler.stats().failed, 1);
}

#[tokio::test]
async fn test_timeout_while_launching_tears_down_instance() {
    let h = harness(
        SchedulerConfig::default().with_job_timeout(Duration::from_millis(100)),
        FakeProvisioner::new().with_launch_delay(Duration::from_secs(10)),
        FakeResolver::ok("https://abc.ngrok.app"),
    );

    let err = h.scheduler.submit(payload(0)).await.unwrap_err();
    assert!(matches!(err, ExportError::Timeout(_)));

    // The runtime may already be running even though launch never returned
    assert_eq!(h.provisioner.torn_down(), vec!["ui_t42000".to_string()]);
    assert!(h.routes.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_launch_failure_tears_down_instance() {
    let h = harness(
        SchedulerConfig::default(),
        FakeProvisioner::new().failing_launch(),
        FakeResolver::ok("https://abc.ngrok.app"),
    );

    let err = h.scheduler.submit(payload(0)).await.unwrap_err();
    assert!(matches!(err, ExportError::Provisioning(_)));

    assert_eq!(h.provisioner.torn_down(), vec!["ui_t42000".to_string()]);
    assert!(h.routes.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_timeout_after_route_published_rolls_back() {
    let h = harness(
        SchedulerConfig::default().with_job_timeout(Duration::from_millis(100)),
        FakeProvisioner::new(),
        FakeResolver::slow(Duration::from_secs(10)),
    );

    let err = h.scheduler.submit(payload(0)).await.unwrap_err();
    assert!(matches!(err, ExportError::Timeout(_)));

    assert_eq!(h.provisioner.torn_down(), vec!["ui_t42000".to_string()]);
    assert!(h.routes.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_tunnel_unavailable_with_rollback() {
    let h = harness(
        SchedulerConfig::default(),
        FakeProvisioner::new(),
        FakeResolver::unavailable(),
    );

    let err = h.scheduler.submit(payload(0)).await.unwrap_err();
    assert!(matches!(err, ExportError::TunnelUnavailable(_)));

    assert!(h.routes.lookup("ui_t42000").await.unwrap().is_none());
    assert_eq!(h.provisioner.torn_down(), vec!["ui_t42000".to_string()]);
}

#[tokio::test]
async fn test_tunnel_unavailable_without_rollback() {
    let h = harness(
        SchedulerConfig::default().with_rollback_on_failure(false),
        FakeProvisioner::new(),
        FakeResolver::unavailable(),
    );

    let err = h.scheduler.submit(payload(0)).await.unwrap_err();
    assert!(matches!(err, ExportError::TunnelUnavailable(_)));

    assert_eq!(
        h.routes.lookup("ui_t42000").await.unwrap().as_deref(),
        Some("http://localhost:42000")
    );
    assert!(h.provisioner.torn_down().is_empty());
}

#[tokio::test]
async fn test_provisioning_failure() {
    let h = harness(
        SchedulerConfig::default(),
        FakeProvisioner::new().failing(),
        FakeResolver::ok("https://abc.ngrok.app"),
    );

    let err = h.scheduler.submit(payload(0)).await.unwrap_err();
    match err {
        ExportError::Provisioning(inner) => {
            assert!(inner.to_string().contains("image not found"));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert!(h.provisioner.torn_down().is_empty());
    assert!(h.routes.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_crashed_job_resolves_as_aborted_and_frees_slot() {
    let provisioner = FakeProvisioner::new();
    provisioner.panic.store(true, Ordering::SeqCst);
    let h = harness(
        SchedulerConfig::default().with_max_concurrent(1),
        provisioner,
        FakeResolver::ok("https://abc.ngrok.app"),
    );

    let crashed = h.scheduler.enqueue(payload(0)).unwrap();
    let next = h.scheduler.enqueue(payload(1)).unwrap();

    let crashed_id = crashed.id();
    match crashed.wait().await {
        Err(ExportError::Aborted(id)) => assert_eq!(id, crashed_id),
        other => panic!("unexpected result: {:?}", other),
    }

    // The slot is released, so the next job still runs
    let result = tokio::time::timeout(Duration::from_secs(5), next.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.instance_name, "ui_t42000");
}

#[tokio::test]
async fn test_shutdown_finishes_queued_jobs() {
    let h = harness(
        SchedulerConfig::default().with_max_concurrent(1),
        FakeProvisioner::new().with_delay(Duration::from_millis(20)),
        FakeResolver::ok("https://abc.ngrok.app"),
    );

    let handles: Vec<_> = (0..3)
        .map(|i| h.scheduler.enqueue(payload(i)).unwrap())
        .collect();
    h.scheduler.shutdown();

    assert!(matches!(
        h.scheduler.enqueue(payload(9)),
        Err(ExportError::ShuttingDown)
    ));

    tokio::time::timeout(Duration::from_secs(5), h.scheduler.drain())
        .await
        .unwrap();

    for handle in handles {
        handle.wait().await.unwrap();
    }
    let stats = h.scheduler.stats();
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.rejected, 1);
}

#[tokio::test]
async fn test_every_submission_resolves_once() {
    let h = harness(
        SchedulerConfig::default().with_max_concurrent(2),
        FakeProvisioner::new(),
        FakeResolver::unavailable(),
    );

    let results = futures::future::join_all((0..8).map(|i| h.scheduler.submit(payload(i)))).await;

    assert_eq!(results.len(), 8);
    assert!(results.iter().all(|r| r.is_err()));

    h.scheduler.drain().await;
    let stats = h.scheduler.stats();
    assert_eq!(stats.submitted, 8);
    assert_eq!(stats.failed, 8);
    assert_eq!(stats.finished(), 8);
}
