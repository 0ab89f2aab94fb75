//! bitsky-producer-core - Control loop and job lifecycle for a Bitsky
//! producer agent.
//!
//! This crate contains the data model, configuration resolution, error
//! taxonomy, and the whole control loop (config watcher, job loop, job
//! runner, result dispatcher). All outbound I/O goes through the
//! [`ControlPlane`] and [`TargetSystem`] traits so the loop can be driven
//! against in-memory fakes; the HTTP implementations live in
//! `bitsky-producer-client`.

pub mod api;
pub mod config;
mod dispatch;
pub mod error;
mod job;
pub mod producer;
pub mod retry;
mod runner;
pub mod settings;
pub mod types;
mod watcher;
pub mod worker;

pub use api::{join_url, ControlPlane, TargetSystem};
pub use config::{ConfigOverrides, ConfigResolver, ResolvedConfig};
pub use error::ProducerError;
pub use producer::{Producer, ProducerBuilder};
pub use retry::BackoffPolicy;
pub use settings::{ProducerSettings, SECURITY_KEY_HEADER};
pub use types::{
    Intelligence, IntelligenceState, IntelligenceSystem, ProducerConfig, ProducerStamp,
    ProducerSystem, Soi, SoiCallback,
};
pub use worker::{ItemOutcome, JobContext, PassthroughWorker, Worker, WorkerFailure};
