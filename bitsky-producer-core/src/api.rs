//! Outbound service seams.
//!
//! The control loop only ever talks to the Metadata Service and to target
//! systems through these traits; the HTTP implementations live in
//! `bitsky-producer-client`, and tests substitute in-memory fakes.

use crate::config::ResolvedConfig;
use crate::error::ProducerError;
use crate::types::{Intelligence, ProducerConfig, Soi};
use async_trait::async_trait;

/// Typed operations against the Metadata Service.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Fetch this producer's remote configuration.
    async fn fetch_producer_config(
        &self,
        config: &ResolvedConfig,
        kind: &str,
    ) -> Result<ProducerConfig, ProducerError>;

    /// Fetch the next batch of intelligences assigned to this producer.
    async fn fetch_intelligences(
        &self,
        config: &ResolvedConfig,
    ) -> Result<Vec<Intelligence>, ProducerError>;

    /// Report reconciled intelligences back to the control plane.
    async fn update_intelligences(
        &self,
        config: &ResolvedConfig,
        items: &[Intelligence],
    ) -> Result<(), ProducerError>;
}

/// Delivery of results to a System Of Interest.
#[async_trait]
pub trait TargetSystem: Send + Sync {
    /// POST a group of intelligences to the callback described by `soi`.
    async fn deliver(&self, soi: &Soi, items: &[Intelligence]) -> Result<(), ProducerError>;
}

/// Join a base URL and a path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}
