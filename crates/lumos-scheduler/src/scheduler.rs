//! Export scheduler
//!
//! Queue and active set live behind one synchronous mutex that is never
//! held across an await point. A single admission task wakes on every
//! submission and every completion and moves queue-head jobs into free
//! slots; each admitted job then runs as its own task.

use crate::job::{Job, JobReply};
use crate::stats::Counters;
use crate::{ExportError, JobHandle, JobId, JobPhase, SchedulerConfig, SchedulerStats};
use lumos_proto::{compose_public_url, ExportPayload, ExportResult};
use lumos_provision::{Instance, Provisioner};
use lumos_router::RouteTableStore;
use lumos_tunnel::TunnelResolver;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, error, info, warn};

struct SchedulerState {
    queue: VecDeque<Job>,
    active: HashSet<JobId>,
    accepting: bool,
}

struct Inner {
    config: SchedulerConfig,
    provisioner: Arc<dyn Provisioner>,
    routes: Arc<RouteTableStore>,
    resolver: Arc<dyn TunnelResolver>,
    state: Mutex<SchedulerState>,
    /// Raised on submission, completion and shutdown
    wake: Notify,
    /// Raised whenever the scheduler becomes idle
    idle: Notify,
    next_id: AtomicU64,
    counters: Counters,
}

/// Handle to a running export scheduler
///
/// Cloning is cheap; all clones drive the same queue.
#[derive(Clone)]
pub struct ExportScheduler {
    inner: Arc<Inner>,
}

/// Steps of a job completed so far, consulted for rollback
#[derive(Debug)]
struct Progress {
    phase: JobPhase,
    instance: Option<Instance>,
    route_published: bool,
}

impl Progress {
    fn new() -> Self {
        Self {
            phase: JobPhase::Admitted,
            instance: None,
            route_published: false,
        }
    }
}

/// Frees a job's slot even if the job task unwinds
struct ActiveSlot {
    inner: Arc<Inner>,
    id: JobId,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        let idle = {
            let mut state = self.inner.lock_state();
            state.active.remove(&self.id);
            state.active.is_empty() && state.queue.is_empty()
        };

        self.inner.wake.notify_one();
        if idle {
            self.inner.idle.notify_waiters();
        }
    }
}

impl ExportScheduler {
    /// Start the admission task and return a handle
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: SchedulerConfig,
        provisioner: Arc<dyn Provisioner>,
        routes: Arc<RouteTableStore>,
        resolver: Arc<dyn TunnelResolver>,
    ) -> Self {
        info!(
            "Starting export scheduler (max {} concurrent, queue depth {}, timeout {:?})",
            config.concurrency_limit(),
            config.max_queue_depth,
            config.job_timeout
        );

        let inner = Arc::new(Inner {
            config,
            provisioner,
            routes,
            resolver,
            state: Mutex::new(SchedulerState {
                queue: VecDeque::new(),
                active: HashSet::new(),
                accepting: true,
            }),
            wake: Notify::new(),
            idle: Notify::new(),
            next_id: AtomicU64::new(1),
            counters: Counters::default(),
        });

        tokio::spawn(Inner::run_admission(inner.clone()));

        Self { inner }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Queue a job without waiting for it
    ///
    /// Fails immediately with `QueueFull` or `ShuttingDown`.
    pub fn enqueue(&self, payload: ExportPayload) -> Result<JobHandle, ExportError> {
        let (tx, rx) = oneshot::channel();
        let id = self.inner.push(payload, tx)?;
        self.inner.wake.notify_one();
        Ok(JobHandle::new(id, rx))
    }

    /// Queue a job and wait for its result
    pub async fn submit(&self, payload: ExportPayload) -> Result<ExportResult, ExportError> {
        self.enqueue(payload)?.wait().await
    }

    /// Refuse further submissions; queued and running jobs still finish
    pub fn shutdown(&self) {
        let was_accepting = {
            let mut state = self.inner.lock_state();
            std::mem::replace(&mut state.accepting, false)
        };

        if was_accepting {
            info!("Export scheduler shutting down");
        }
        self.inner.wake.notify_one();
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.lock_state().accepting
    }

    /// Wait until nothing is queued or running
    pub async fn drain(&self) {
        loop {
            let idle = self.inner.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            if self.inner.is_idle() {
                return;
            }
            idle.await;
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.inner.lock_state();
        self.inner
            .counters
            .snapshot(state.queue.len(), state.active.len())
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_idle(&self) -> bool {
        let state = self.lock_state();
        state.queue.is_empty() && state.active.is_empty()
    }

    fn push(&self, payload: ExportPayload, reply: JobReply) -> Result<JobId, ExportError> {
        let mut state = self.lock_state();

        if !state.accepting {
            self.counters.record_rejected();
            return Err(ExportError::ShuttingDown);
        }

        // Queued jobs first fill free slots; only the remainder waits
        let free = self
            .config
            .concurrency_limit()
            .saturating_sub(state.active.len());
        if state.queue.len() >= free + self.config.max_queue_depth {
            let waiting = state.queue.len() - free;
            self.counters.record_rejected();
            warn!("Rejecting export: queue full ({} waiting)", waiting);
            return Err(ExportError::QueueFull(waiting));
        }

        let id = JobId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        state.queue.push_back(Job {
            id,
            payload,
            reply,
            submitted_at: Instant::now(),
        });
        self.counters.record_submitted();

        debug!("Queued {} ({} waiting)", id, state.queue.len());
        Ok(id)
    }

    /// Move queue-head jobs into free slots
    fn admit_ready(&self) -> Vec<Job> {
        let mut state = self.lock_state();
        let limit = self.config.concurrency_limit();
        let mut admitted = Vec::new();

        while state.active.len() < limit {
            let Some(job) = state.queue.pop_front() else {
                break;
            };
            state.active.insert(job.id);
            admitted.push(job);
        }

        admitted
    }

    fn should_stop(&self) -> bool {
        let state = self.lock_state();
        !state.accepting && state.queue.is_empty()
    }

    async fn run_admission(self: Arc<Self>) {
        debug!("Admission task started");

        loop {
            for job in self.admit_ready() {
                let slot = ActiveSlot {
                    inner: self.clone(),
                    id: job.id,
                };
                tokio::spawn(self.clone().run_job(job, slot));
            }

            if self.should_stop() {
                break;
            }

            self.wake.notified().await;
        }

        debug!("Admission task stopped");
    }

    async fn run_job(self: Arc<Self>, job: Job, slot: ActiveSlot) {
        let Job {
            id,
            payload,
            reply,
            submitted_at,
        } = job;

        info!(
            "Admitted {} after {:.2}s in queue",
            id,
            submitted_at.elapsed().as_secs_f64()
        );

        let started = Instant::now();
        let mut progress = Progress::new();
        let pipeline = self.execute(id, &payload, &mut progress);

        let result = match tokio::time::timeout(self.config.job_timeout, pipeline).await {
            Ok(result) => result,
            Err(_) => Err(ExportError::Timeout(self.config.job_timeout)),
        };

        match &result {
            Ok(export) => {
                self.counters.record_completed();
                info!(
                    "{} completed in {:.2}s: {} -> {}",
                    id,
                    started.elapsed().as_secs_f64(),
                    export.instance_name,
                    export.public_url
                );
            }
            Err(e) => {
                self.counters.record_failed();
                error!("{} failed during {}: {}", id, progress.phase, e);
                if self.config.rollback_on_failure {
                    self.rollback(id, progress).await;
                }
            }
        }

        drop(slot);

        if reply.send(result).is_err() {
            debug!("Submitter of {} went away before the result", id);
        }
    }

    async fn execute(
        &self,
        id: JobId,
        payload: &ExportPayload,
        progress: &mut Progress,
    ) -> Result<ExportResult, ExportError> {
        progress.phase = JobPhase::Provisioning;
        let instance = self.provisioner.prepare().await?;

        // Recorded before launch so a failure or timeout mid-launch still
        // tears the runtime down
        progress.instance = Some(instance.clone());
        self.provisioner.launch(&instance, payload).await?;
        debug!("{} provisioned {} on port {}", id, instance.name, instance.port);

        self.routes
            .upsert(&instance.name, &instance.base_url())
            .await?;
        progress.route_published = true;
        progress.phase = JobPhase::RoutePublished;

        let tunnel = self.resolver.resolve().await?;
        progress.phase = JobPhase::TunnelResolved;

        let public_url = compose_public_url(&tunnel.public_url, &instance.name);
        progress.phase = JobPhase::Completed;

        Ok(ExportResult {
            instance_name: instance.name,
            public_url,
        })
    }

    /// Undo completed steps in reverse order; failures are only logged
    async fn rollback(&self, id: JobId, progress: Progress) {
        let Some(instance) = progress.instance else {
            return;
        };

        if progress.route_published {
            match self.routes.remove(&instance.name).await {
                Ok(_) => debug!("{}: removed route for {}", id, instance.name),
                Err(e) => warn!("{}: failed to remove route for {}: {}", id, instance.name, e),
            }
        }

        match self.provisioner.teardown(&instance).await {
            Ok(()) => info!("{}: rolled back instance {}", id, instance.name),
            Err(e) => warn!("{}: failed to tear down {}: {}", id, instance.name, e),
        }
    }
}
