//! Shared configuration, error types, identity, and counter primitives for ductflow crates.
//!
//! Architecture role:
//! - defines the native pipeline configuration passed across layers
//! - provides common [`DflError`] / [`Result`] contracts and the boxed
//!   [`DuctFault`] seam for user stage logic
//! - derives sink task identity in the external attempt convention
//! - hosts the per-instance counter registry
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`metrics`]

pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;

pub use config::PipelineConfig;
pub use error::{DflError, DuctFault, Result, classify_fault};
pub use ids::{SinkTaskIdentity, TaskAttemptId, derive_sink_identity, parse_node_id_hex};
pub use metrics::{CounterRegistry, now_ms};
