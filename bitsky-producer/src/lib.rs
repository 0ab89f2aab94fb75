//! bitsky-producer - SDK facade for running a Bitsky producer agent.
//!
//! # Quick Start
//!
//! ```text
//! use bitsky_producer::{producer_from_env, ConfigOverrides};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads BITSKY_BASE_URL / BITSKY_SECURITY_KEY / GLOBAL_ID from the
//!     // environment; the serial id is derived and persisted on first run.
//!     let producer = producer_from_env()?;
//!     producer.start();
//!     tokio::signal::ctrl_c().await?;
//!     producer.stop();
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub use bitsky_producer_client::{HttpControlPlane, HttpControlPlaneBuilder, HttpTargetSystem};
pub use bitsky_producer_core::{
    join_url, BackoffPolicy, ConfigOverrides, ConfigResolver, ControlPlane, Intelligence,
    IntelligenceState, ItemOutcome, JobContext, PassthroughWorker, Producer, ProducerBuilder,
    ProducerConfig, ProducerError, ProducerSettings, ResolvedConfig, Soi, SoiCallback,
    TargetSystem, Worker, WorkerFailure, SECURITY_KEY_HEADER,
};

/// Build a producer wired to the HTTP clients, resolving configuration from
/// the process environment.
pub fn producer_from_env() -> Result<Producer, ProducerError> {
    producer_with_configs(ConfigOverrides::default())
}

/// Build a producer wired to the HTTP clients, with caller overrides on top
/// of the environment.
pub fn producer_with_configs(overrides: ConfigOverrides) -> Result<Producer, ProducerError> {
    let control_plane = Arc::new(HttpControlPlane::new()?);
    let target_system = Arc::new(HttpTargetSystem::new()?);
    Producer::builder()
        .configs(overrides)
        .control_plane(control_plane)
        .target_system(target_system)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_factory_builds_a_stopped_producer() {
        let producer = producer_with_configs(ConfigOverrides {
            base_url: Some("http://localhost:1".to_string()),
            global_id: Some("g1".to_string()),
            serial_id: Some("serial-1".to_string()),
            ..Default::default()
        })
        .expect("factory should build");
        assert_eq!(producer.kind(), "SERVICE");
        assert!(producer.job_id().is_none());
        assert!(producer.producer_configuration().is_none());
    }
}
