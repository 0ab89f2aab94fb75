//! The pluggable execution worker.

use crate::config::ResolvedConfig;
use crate::types::{Intelligence, ProducerConfig};
use async_trait::async_trait;
use serde_json::Value;

/// Context handed to the worker alongside a batch.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Id of the job the batch belongs to.
    pub job_id: String,
    /// Remote producer configuration active when the job started.
    pub producer_config: ProducerConfig,
    /// Resolved local configuration snapshot.
    pub resolved: ResolvedConfig,
}

/// A worker-side failure for one item.
#[derive(Debug, Clone)]
pub struct WorkerFailure {
    /// Item the failure belongs to. Outcomes without a global id cannot be
    /// reconciled and are skipped.
    pub global_id: Option<String>,
    pub reason: Value,
}

/// Per-item outcome of a collect pass. Order is not guaranteed to match the
/// input batch.
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    /// The item was collected; carries the item with its dataset attached.
    Fulfilled(Intelligence),
    /// Collection failed for this item.
    Rejected(WorkerFailure),
}

impl ItemOutcome {
    /// Convenience constructor for a failure tied to a known item.
    pub fn rejected(global_id: impl Into<String>, reason: Value) -> Self {
        Self::Rejected(WorkerFailure {
            global_id: Some(global_id.into()),
            reason,
        })
    }
}

/// Executes intelligence collection for a batch.
///
/// The producer treats the worker as a black box: it may fan work out over
/// any concurrency primitive it likes, as long as it eventually returns one
/// outcome per item. An empty batch is a liveness signal; workers may use
/// it to run upkeep and should return an empty outcome list.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn collect(&self, batch: Vec<Intelligence>, ctx: &JobContext) -> Vec<ItemOutcome>;
}

/// Default worker: fulfills every item unchanged.
///
/// Useful for wiring tests and as a stand-in until a real collector is
/// plugged in.
pub struct PassthroughWorker;

#[async_trait]
impl Worker for PassthroughWorker {
    async fn collect(&self, batch: Vec<Intelligence>, _ctx: &JobContext) -> Vec<ItemOutcome> {
        batch.into_iter().map(ItemOutcome::Fulfilled).collect()
    }
}
