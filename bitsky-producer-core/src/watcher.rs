//! Background tasks: the config watcher and the job loop.
//!
//! Both run as independent tokio tasks owned by the producer through
//! [`TaskHandle`]s; dropping a handle cancels its task.

use crate::config::ResolvedConfig;
use crate::error::ProducerError;
use crate::producer::ProducerShared;
use crate::runner::{self, JobOutcome};
use crate::types::ProducerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Handle to a spawned background task. Drop to stop it.
pub(crate) struct TaskHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Request cooperative cancellation; the task stops at its next
    /// suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and additionally abort the task, dropping any in-flight
    /// future immediately.
    pub fn abort(&self) {
        self.cancel.cancel();
        self.join.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawn the recurring config watcher.
pub(crate) fn spawn_config_watcher(shared: Arc<ProducerShared>) -> TaskHandle {
    let cancel = CancellationToken::new();
    let child = cancel.clone();
    let join = tokio::spawn(async move {
        run_config_watcher(shared, child).await;
    });
    TaskHandle { cancel, join }
}

async fn run_config_watcher(shared: Arc<ProducerShared>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(shared.settings.config_poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive_failures: u32 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        match watch_once(&shared).await {
            Ok(()) => consecutive_failures = 0,
            Err(err) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                tracing::warn!(
                    "config watch failed ({} consecutive): {}",
                    consecutive_failures,
                    err
                );
                shared.record_error(err);

                let delay = shared
                    .settings
                    .backoff
                    .delay_for_failures(consecutive_failures);
                if !delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

/// One watcher tick: fetch, compare, and reconcile running state.
async fn watch_once(shared: &Arc<ProducerShared>) -> Result<(), ProducerError> {
    let resolved = shared.resolved();
    if resolved.base_url.is_none() || resolved.global_id.is_none() {
        shared.shutdown_job_loop();
        return Err(ProducerError::ConfigMissing);
    }

    let kind = shared.kind();
    let remote = shared
        .control_plane
        .fetch_producer_config(&resolved, &kind)
        .await?;

    let changed = match shared.remote_config() {
        Some(current) => current.identity() != remote.identity(),
        None => true,
    };
    if !changed {
        return Ok(());
    }

    tracing::info!(
        "adopting producer config {:?} version {:?}",
        remote.global_id,
        remote.system.version
    );
    shared.adopt_remote(remote.clone());

    if permits_running(&resolved, &kind, &remote) {
        let interval = shared.settings.polling_interval(remote.polling_interval);
        shared.restart_job_loop(interval);
    } else {
        tracing::info!("remote config does not permit running; stopping the job loop");
        shared.shutdown_job_loop();
    }
    Ok(())
}

/// Preconditions for running the job loop under a remote config.
fn permits_running(resolved: &ResolvedConfig, kind: &str, remote: &ProducerConfig) -> bool {
    resolved.base_url.is_some()
        && remote
            .kind
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(kind))
        && remote.global_id.as_deref().is_some_and(|g| !g.is_empty())
        && remote.is_active()
}

/// Spawn the recurring job loop with the given tick interval.
pub(crate) fn spawn_job_loop(shared: Arc<ProducerShared>, interval: Duration) -> TaskHandle {
    let cancel = CancellationToken::new();
    let child = cancel.clone();
    let join = tokio::spawn(async move {
        run_job_loop(shared, interval, child).await;
    });
    TaskHandle { cancel, join }
}

async fn run_job_loop(
    shared: Arc<ProducerShared>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !shared.job_slot_free() {
            tracing::debug!("a job is still active; skipping this tick");
            continue;
        }
        shared.spawn_job_task();
    }
}

/// Spawn one job-execution task.
///
/// The task runs jobs back-to-back for as long as the fetch keeps returning
/// work, then parks until the next loop tick.
pub(crate) fn spawn_job_task(shared: Arc<ProducerShared>) -> TaskHandle {
    let cancel = CancellationToken::new();
    let child = cancel.clone();
    let join = tokio::spawn(async move {
        run_job_task(shared, child).await;
    });
    TaskHandle { cancel, join }
}

async fn run_job_task(shared: Arc<ProducerShared>, cancel: CancellationToken) {
    loop {
        // Cancellation is only honored between jobs: aborting a run
        // mid-flight would strand the acquired slot. A hard stop goes
        // through `abort`, and the shutdown path resets the slot afterwards.
        if cancel.is_cancelled() {
            break;
        }
        match runner::run_job_once(&shared).await {
            JobOutcome::Completed => continue,
            JobOutcome::Skipped | JobOutcome::Idle | JobOutcome::Failed => break,
        }
    }
}
