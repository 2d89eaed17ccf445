//! Push-oriented record pipeline for sink execution nodes.
//!
//! Responsibilities:
//! - model records, field shapes, and declarative node descriptions
//! - define the duct stage contract and the endpoint (tap) contract
//! - assemble and drive the per-slice stream graph for a sink node
//! - expose the slice-scoped execution context ducts and endpoints use
//!
//! Architecture role: this crate sits between `dfl-common` (errors,
//! configuration, counters) and the endpoint and adapter crates. It knows
//! nothing about concrete storage or about the host runtime driving the
//! records; both plug in through the [`Tap`] and [`RuntimeHandle`] traits.

#![deny(missing_docs)]

pub mod context;
pub mod duct;
pub mod graph;
pub mod node;
pub mod record;
pub mod tap;

#[cfg(test)]
mod test_tap;

pub use context::{PipelineContext, RuntimeHandle};
pub use duct::{Duct, ProjectionDuct};
pub use graph::{SinkStreamGraph, SourceStage, TapSinkStage};
pub use node::{Boundary, ExecutionNode, SourceElement, TransformSpec};
pub use record::{FieldValue, Fields, Record};
pub use tap::{BoxedCollector, RecordCollector, RecordStream, SinkMode, Tap, TapKind};
