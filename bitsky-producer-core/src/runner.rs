//! The job runner: one acquire → execute → reconcile → report cycle.

use crate::dispatch;
use crate::job::{reconcile_batch, RunningJob, TIMEOUT_REASON};
use crate::producer::ProducerShared;
use crate::types::{Intelligence, IntelligenceState};
use crate::worker::{ItemOutcome, JobContext};
use chrono::Utc;
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// How a runner invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    /// The slot was already held, or a concurrent stop discarded the run.
    Skipped,
    /// The fetch returned no work.
    Idle,
    /// A batch was processed and reported; the loop may go back-to-back.
    Completed,
    /// The run errored and was torn down.
    Failed,
}

/// Run one job. Every failure is caught here and funneled into teardown,
/// so the loop never dies silently; at worst one job is lost.
pub(crate) async fn run_job_once(shared: &Arc<ProducerShared>) -> JobOutcome {
    // Acquisition: the sole admission gate for the single-job invariant.
    let job_id = {
        let mut job = shared.job.lock().unwrap();
        match job.try_acquire() {
            Some(job_id) => job_id,
            None => {
                tracing::debug!("a job already owns the slot; skipping");
                return JobOutcome::Skipped;
            }
        }
    };

    let resolved = shared.resolved();
    let ctx = JobContext {
        job_id: job_id.clone(),
        producer_config: shared.remote_config().unwrap_or_default(),
        resolved: resolved.clone(),
    };
    let worker = shared.worker();

    // Fetch.
    let batch = match shared.control_plane.fetch_intelligences(&resolved).await {
        Ok(batch) => batch,
        Err(err) => {
            tracing::error!("job {}: fetching intelligences failed: {}", job_id, err);
            teardown(shared, &job_id);
            return JobOutcome::Failed;
        }
    };
    if batch.is_empty() {
        tracing::debug!("job {}: no intelligences assigned", job_id);
        // Liveness signal: the worker sees the empty batch, nothing is
        // reported.
        let _ = worker.collect(Vec::new(), &ctx).await;
        teardown(shared, &job_id);
        return JobOutcome::Idle;
    }

    tracing::info!("job {}: collecting {} intelligences", job_id, batch.len());
    {
        let mut job = shared.job.lock().unwrap();
        if discarded(&job, &job_id) {
            return JobOutcome::Skipped;
        }
        job.total = batch.clone();
    }
    shared.ran_jobs.fetch_add(1, Ordering::Relaxed);

    // Execution: the worker races the collect budget. Whichever side loses
    // is dropped, so its effects never reach the job record.
    let outcomes = tokio::select! {
        outcomes = worker.collect(batch, &ctx) => Some(outcomes),
        _ = tokio::time::sleep(shared.settings.collect_timeout) => None,
    };

    // Reconciliation. The `ending` flag admits exactly one entry.
    let (finals, started_at) = {
        let mut job = shared.job.lock().unwrap();
        if discarded(&job, &job_id) {
            return JobOutcome::Skipped;
        }

        match outcomes {
            Some(outcomes) => {
                if !job.job_timeout {
                    record_outcomes(&mut job, outcomes);
                    tracing::debug!(
                        "job {}: reconciled {} of {} intelligences",
                        job_id,
                        job.collected_count(),
                        job.total.len()
                    );
                }
            }
            None => {
                tracing::warn!(
                    "job {}: collect timed out after {:?}",
                    job_id,
                    shared.settings.collect_timeout
                );
                job.job_timeout = true;
                let reason = Value::String(TIMEOUT_REASON.to_string());
                let timed_out: Vec<Intelligence> = job
                    .total
                    .iter()
                    .cloned()
                    .map(|mut item| {
                        item.set_state(IntelligenceState::Timeout, Some(&reason));
                        item
                    })
                    .collect();
                for item in timed_out {
                    job.collected.insert(item.global_id.clone(), item);
                }
            }
        }

        job.ending = true;
        let total = std::mem::take(&mut job.total);
        let mut collected = std::mem::take(&mut job.collected);
        (reconcile_batch(&total, &mut collected), job.started_at)
    };
    let reported = finals.len();

    // Reporting. Dispatch failures are contained inside the dispatcher.
    dispatch::dispatch_results(
        &shared.control_plane,
        &shared.target_system,
        &resolved,
        finals,
    )
    .await;

    if let Some(started_at) = started_at {
        tracing::info!(
            "job {}: reported {} intelligences in {}ms",
            job_id,
            reported,
            (Utc::now() - started_at).num_milliseconds()
        );
    }
    teardown(shared, &job_id);
    JobOutcome::Completed
}

/// Whether a concurrent stop or restart invalidated this run.
fn discarded(job: &RunningJob, job_id: &str) -> bool {
    job.ending || job.job_id.as_deref() != Some(job_id)
}

fn record_outcomes(job: &mut RunningJob, outcomes: Vec<ItemOutcome>) {
    for outcome in outcomes {
        match outcome {
            ItemOutcome::Fulfilled(mut item) => {
                if item.global_id.is_empty() {
                    tracing::warn!("fulfilled outcome carries no globalId; skipping");
                    continue;
                }
                item.set_state(IntelligenceState::Finished, None);
                job.collected.insert(item.global_id.clone(), item);
            }
            ItemOutcome::Rejected(failure) => {
                let Some(global_id) = failure.global_id.filter(|g| !g.is_empty()) else {
                    tracing::warn!("rejected outcome carries no globalId; skipping");
                    continue;
                };
                let Some(original) = job.total.iter().find(|i| i.global_id == global_id) else {
                    tracing::warn!(
                        "rejected outcome for unknown intelligence {}; skipping",
                        global_id
                    );
                    continue;
                };
                let mut failed = original.clone();
                failed.set_state(IntelligenceState::Failed, Some(&failure.reason));
                job.collected.insert(global_id, failed);
            }
        }
    }
}

/// Terminal phase for this run. Scoped to the job id so a raced
/// stop-and-restart cannot be reset by a straggler.
fn teardown(shared: &Arc<ProducerShared>, job_id: &str) {
    let mut job = shared.job.lock().unwrap();
    if job.job_id.as_deref() == Some(job_id) {
        job.reset();
    }
}
