//! The producer facade: lifecycle, pluggable worker, accessors.

use crate::api::{ControlPlane, TargetSystem};
use crate::config::{ConfigOverrides, ConfigResolver, ResolvedConfig};
use crate::error::ProducerError;
use crate::job::RunningJob;
use crate::settings::ProducerSettings;
use crate::types::ProducerConfig;
use crate::watcher::{self, TaskHandle};
use crate::worker::{PassthroughWorker, Worker};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// State shared between the facade and its background tasks.
///
/// Sync locks only, never held across a suspension point.
pub(crate) struct ProducerShared {
    pub settings: ProducerSettings,
    pub control_plane: Arc<dyn ControlPlane>,
    pub target_system: Arc<dyn TargetSystem>,
    pub ran_jobs: AtomicU64,
    pub job: Mutex<RunningJob>,
    /// Gates every spawn: a watcher tick racing `stop()` must not be able
    /// to revive the job loop afterwards.
    running: AtomicBool,
    worker: RwLock<Arc<dyn Worker>>,
    kind: RwLock<String>,
    resolver: Mutex<ConfigResolver>,
    resolved: RwLock<ResolvedConfig>,
    remote: RwLock<Option<ProducerConfig>>,
    last_error: RwLock<Option<ProducerError>>,
    watcher: Mutex<Option<TaskHandle>>,
    job_loop: Mutex<Option<TaskHandle>>,
    job_task: Mutex<Option<TaskHandle>>,
}

impl ProducerShared {
    pub fn resolved(&self) -> ResolvedConfig {
        self.resolved.read().unwrap().clone()
    }

    pub fn kind(&self) -> String {
        self.kind.read().unwrap().clone()
    }

    pub fn worker(&self) -> Arc<dyn Worker> {
        Arc::clone(&self.worker.read().unwrap())
    }

    pub fn remote_config(&self) -> Option<ProducerConfig> {
        self.remote.read().unwrap().clone()
    }

    pub fn adopt_remote(&self, config: ProducerConfig) {
        *self.remote.write().unwrap() = Some(config);
    }

    pub fn record_error(&self, err: ProducerError) {
        *self.last_error.write().unwrap() = Some(err);
    }

    fn clear_error(&self) {
        *self.last_error.write().unwrap() = None;
    }

    /// Whether a new job may start: the slot is idle and no execution task
    /// is still draining.
    pub fn job_slot_free(&self) -> bool {
        let idle = self.job.lock().unwrap().is_idle();
        let task_live = self
            .job_task
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|h| !h.is_finished());
        idle && !task_live
    }

    pub fn spawn_job_task(self: &Arc<Self>) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let handle = watcher::spawn_job_task(Arc::clone(self));
        let mut slot = self.job_task.lock().unwrap();
        if self.running.load(Ordering::SeqCst) {
            *slot = Some(handle);
        } else {
            handle.abort();
        }
    }

    /// Swap the job-loop timer for one with the given interval.
    ///
    /// Replaces the timer only: an in-flight job finishes under the config
    /// it started with, and the new loop's ticks skip until the slot frees.
    pub fn restart_job_loop(self: &Arc<Self>, interval: Duration) {
        if let Some(handle) = self.job_loop.lock().unwrap().take() {
            handle.cancel();
        }
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let handle = watcher::spawn_job_loop(Arc::clone(self), interval);
        let mut slot = self.job_loop.lock().unwrap();
        if self.running.load(Ordering::SeqCst) {
            *slot = Some(handle);
        } else {
            handle.cancel();
        }
    }

    /// Stop the job loop and terminate any active job.
    pub fn shutdown_job_loop(&self) {
        if let Some(handle) = self.job_loop.lock().unwrap().take() {
            handle.cancel();
        }
        if let Some(handle) = self.job_task.lock().unwrap().take() {
            handle.abort();
        }
        self.terminate_active_job();
    }

    /// Terminal phase. Safe no-op when no job is active; discarded futures
    /// of the old job fail their `job_id` re-checks afterwards.
    fn terminate_active_job(&self) {
        let mut job = self.job.lock().unwrap();
        if job.lock_job && !job.ending {
            tracing::info!("terminating active job {:?}", job.job_id);
            job.ending = true;
        }
        job.reset();
    }
}

/// Builder for [`Producer`].
pub struct ProducerBuilder {
    settings: ProducerSettings,
    kind: Option<String>,
    worker: Option<Arc<dyn Worker>>,
    overrides: ConfigOverrides,
    control_plane: Option<Arc<dyn ControlPlane>>,
    target_system: Option<Arc<dyn TargetSystem>>,
}

impl Default for ProducerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProducerBuilder {
    pub fn new() -> Self {
        Self {
            settings: ProducerSettings::default(),
            kind: None,
            worker: None,
            overrides: ConfigOverrides::default(),
            control_plane: None,
            target_system: None,
        }
    }

    pub fn settings(mut self, settings: ProducerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn worker(mut self, worker: Arc<dyn Worker>) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn configs(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn control_plane(mut self, control_plane: Arc<dyn ControlPlane>) -> Self {
        self.control_plane = Some(control_plane);
        self
    }

    pub fn target_system(mut self, target_system: Arc<dyn TargetSystem>) -> Self {
        self.target_system = Some(target_system);
        self
    }

    pub fn build(self) -> Result<Producer, ProducerError> {
        let control_plane = self
            .control_plane
            .ok_or_else(|| ProducerError::invalid_input("a control-plane client is required"))?;
        let target_system = self
            .target_system
            .ok_or_else(|| ProducerError::invalid_input("a target-system client is required"))?;

        let kind = match self.kind {
            Some(kind) if kind.trim().is_empty() => {
                return Err(ProducerError::invalid_input(
                    "producer type must not be empty",
                ));
            }
            Some(kind) => kind,
            None => self.settings.default_kind.clone(),
        };
        let worker = self
            .worker
            .unwrap_or_else(|| Arc::new(PassthroughWorker));

        // Resolving here persists the serial id once at init.
        let resolver = ConfigResolver::new(self.overrides);
        let resolved = resolver.resolve();

        Ok(Producer {
            shared: Arc::new(ProducerShared {
                settings: self.settings,
                control_plane,
                target_system,
                ran_jobs: AtomicU64::new(0),
                job: Mutex::new(RunningJob::default()),
                running: AtomicBool::new(false),
                worker: RwLock::new(worker),
                kind: RwLock::new(kind),
                resolver: Mutex::new(resolver),
                resolved: RwLock::new(resolved),
                remote: RwLock::new(None),
                last_error: RwLock::new(None),
                watcher: Mutex::new(None),
                job_loop: Mutex::new(None),
                job_task: Mutex::new(None),
            }),
        })
    }
}

/// A long-running producer agent.
///
/// Owns two recurring background tasks (config watcher and job loop) plus
/// at most one job-execution task. All of them stop on [`stop`](Self::stop)
/// or drop.
pub struct Producer {
    shared: Arc<ProducerShared>,
}

impl Producer {
    pub fn builder() -> ProducerBuilder {
        ProducerBuilder::new()
    }

    /// Arm the config watcher. Idempotent: a second call while running is
    /// a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut watcher_slot = self.shared.watcher.lock().unwrap();
        if watcher_slot.is_some() {
            tracing::debug!("producer already started");
            return;
        }
        self.shared.clear_error();
        self.shared.running.store(true, Ordering::SeqCst);
        *watcher_slot = Some(watcher::spawn_config_watcher(Arc::clone(&self.shared)));
        tracing::info!("producer started");
    }

    /// Stop everything: watcher, job loop, and the active job. Idempotent;
    /// never fails.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        match self.shared.watcher.lock().unwrap().take() {
            Some(handle) => handle.cancel(),
            None => tracing::debug!("producer already stopped"),
        }
        self.shared.shutdown_job_loop();
        *self.shared.remote.write().unwrap() = None;
        self.shared.clear_error();
        tracing::info!("producer stopped");
    }

    /// Replace the caller-override configuration and re-resolve.
    pub fn set_configs(&self, overrides: ConfigOverrides) {
        let resolved = {
            let mut resolver = self.shared.resolver.lock().unwrap();
            resolver.set_overrides(overrides);
            resolver.resolve()
        };
        *self.shared.resolved.write().unwrap() = resolved;
    }

    /// The producer type tag.
    pub fn kind(&self) -> String {
        self.shared.kind()
    }

    /// Set the producer type tag. Empty or blank values are rejected.
    pub fn set_kind(&self, kind: impl Into<String>) -> Result<(), ProducerError> {
        let kind = kind.into();
        if kind.trim().is_empty() {
            return Err(ProducerError::invalid_input(
                "producer type must not be empty",
            ));
        }
        *self.shared.kind.write().unwrap() = kind;
        Ok(())
    }

    /// The pluggable execution worker.
    pub fn worker(&self) -> Arc<dyn Worker> {
        self.shared.worker()
    }

    /// Replace the execution worker. Takes effect for the next job.
    pub fn set_worker(&self, worker: Arc<dyn Worker>) {
        *self.shared.worker.write().unwrap() = worker;
    }

    /// Last adopted remote configuration, if any.
    pub fn producer_configuration(&self) -> Option<ProducerConfig> {
        self.shared.remote_config()
    }

    /// Last classified error from the control loop, if any.
    pub fn producer_error(&self) -> Option<ProducerError> {
        self.shared.last_error.read().unwrap().clone()
    }

    /// Id of the currently running job, if any.
    pub fn job_id(&self) -> Option<String> {
        self.shared.job.lock().unwrap().job_id.clone()
    }

    /// Number of jobs that processed a non-empty batch.
    pub fn ran_jobs(&self) -> u64 {
        self.shared.ran_jobs.load(Ordering::Relaxed)
    }

    /// The resolved local configuration snapshot.
    pub fn configuration(&self) -> ResolvedConfig {
        self.shared.resolved()
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.stop();
    }
}
