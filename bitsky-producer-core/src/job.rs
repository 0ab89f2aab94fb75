//! Per-job bookkeeping and result reconciliation.

use crate::types::{Intelligence, IntelligenceState};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Reason recorded when the collect pass exceeds its time budget.
pub(crate) const TIMEOUT_REASON: &str = "collect intelligences timeout";
/// Reason recorded for items the worker never resolved.
pub(crate) const UNRESOLVED_REASON: &str = "timeout or not resolved";

/// The one job slot a producer owns.
///
/// `lock_job` is the canonical slot indicator; `job_id` is present iff the
/// slot is held. Once `ending` is set the only further mutation is
/// [`reset`](Self::reset). The collected count is always derived from the
/// map, never stored separately.
#[derive(Debug, Default)]
pub(crate) struct RunningJob {
    pub job_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    /// The batch in the order the control plane returned it.
    pub total: Vec<Intelligence>,
    /// Reconciled items keyed by `globalId`.
    pub collected: HashMap<String, Intelligence>,
    pub job_timeout: bool,
    pub ending: bool,
    pub lock_job: bool,
}

impl RunningJob {
    /// Whether the slot is free for a new job.
    pub fn is_idle(&self) -> bool {
        self.job_id.is_none() && !self.lock_job
    }

    /// The sole admission gate for the single-job invariant: clears
    /// residual state and claims the slot atomically, returning the fresh
    /// job id, or `None` when a job already owns the slot.
    pub fn try_acquire(&mut self) -> Option<String> {
        if self.job_id.is_some() || self.lock_job || self.ending {
            return None;
        }
        *self = Self::default();
        let job_id = Uuid::new_v4().to_string();
        self.job_id = Some(job_id.clone());
        self.started_at = Some(Utc::now());
        self.lock_job = true;
        Some(job_id)
    }

    pub fn collected_count(&self) -> usize {
        self.collected.len()
    }

    /// Teardown: restore the idle-state invariants in place.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Build the final ordered report for a batch.
///
/// Preserves the input order of `total`. Items the worker never reconciled
/// are marked `FAILED`; reconciled items with no state get `FINISHED` when
/// they carry a dataset and `FAILED` otherwise; items with a state pass
/// through untouched.
pub(crate) fn reconcile_batch(
    total: &[Intelligence],
    collected: &mut HashMap<String, Intelligence>,
) -> Vec<Intelligence> {
    total
        .iter()
        .map(|item| match collected.remove(&item.global_id) {
            None => {
                let mut unresolved = item.clone();
                unresolved.set_state(
                    IntelligenceState::Failed,
                    Some(&Value::String(UNRESOLVED_REASON.to_string())),
                );
                unresolved
            }
            Some(mut found) => {
                let state_empty = found.state().map_or(true, str::is_empty);
                if state_empty {
                    if found.has_dataset() {
                        found.set_state(IntelligenceState::Finished, None);
                    } else {
                        found.set_state(IntelligenceState::Failed, None);
                    }
                }
                found
            }
        })
        .collect()
}
