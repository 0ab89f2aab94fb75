//! bitsky-producer-client - HTTP implementations of the producer's
//! outbound seams.
//!
//! [`HttpControlPlane`] implements the Metadata Service operations and
//! [`HttpTargetSystem`] delivers result batches to SOI callbacks. Both
//! classify failures into `ProducerError` from the HTTP status and the
//! vendor `code` field.

mod control_plane;
mod http;
mod soi;

pub use control_plane::{HttpControlPlane, HttpControlPlaneBuilder};
pub use soi::HttpTargetSystem;
