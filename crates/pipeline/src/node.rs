//! Immutable execution-node descriptions handed to the sink adapter.

use std::fmt;
use std::sync::Arc;

use dfl_common::{DflError, Result};
use serde::{Deserialize, Serialize};

use crate::record::Fields;
use crate::tap::Tap;

/// Partition-boundary marker separating the upstream exchange from the sink
/// node. Records cross the boundary one at a time, already partitioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boundary {
    /// Stable boundary element id.
    pub id: String,
}

impl Boundary {
    /// Boundary with the given element id.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Source element feeding an execution node.
#[derive(Clone)]
pub enum SourceElement {
    /// Partition boundary fed by the host runtime.
    Boundary(Boundary),
    /// Endpoint read directly; representable but invalid for sink nodes.
    Tap(Arc<dyn Tap>),
}

impl fmt::Debug for SourceElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceElement::Boundary(b) => f.debug_tuple("Boundary").field(&b.id).finish(),
            SourceElement::Tap(tap) => f.debug_tuple("Tap").field(&tap.identifier()).finish(),
        }
    }
}

/// Declarative transform materialized into a duct stage at graph
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformSpec {
    /// Field selection from `input` shape to `output` shape.
    Projection {
        /// Incoming record shape.
        input: Fields,
        /// Selected output shape.
        output: Fields,
    },
}

/// Immutable description of one sink execution node: where records come
/// from, how they are transformed, and which endpoints they land in.
#[derive(Clone)]
pub struct ExecutionNode {
    id: String,
    sources: Vec<SourceElement>,
    transforms: Vec<TransformSpec>,
    sink_taps: Vec<Arc<dyn Tap>>,
}

impl ExecutionNode {
    /// Empty node with a hexadecimal element id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sources: Vec::new(),
            transforms: Vec::new(),
            sink_taps: Vec::new(),
        }
    }

    /// Add a source element.
    pub fn with_source(mut self, source: SourceElement) -> Self {
        self.sources.push(source);
        self
    }

    /// Add a partition-boundary source.
    pub fn with_boundary_source(self, boundary: Boundary) -> Self {
        self.with_source(SourceElement::Boundary(boundary))
    }

    /// Append a transform.
    pub fn with_transform(mut self, transform: TransformSpec) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Add a sink endpoint.
    pub fn with_sink_tap(mut self, tap: Arc<dyn Tap>) -> Self {
        self.sink_taps.push(tap);
        self
    }

    /// Node element id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Source elements in declaration order.
    pub fn sources(&self) -> &[SourceElement] {
        &self.sources
    }

    /// Transforms in declaration order.
    pub fn transforms(&self) -> &[TransformSpec] {
        &self.transforms
    }

    /// Sink endpoints in declaration order.
    pub fn sink_taps(&self) -> &[Arc<dyn Tap>] {
        &self.sink_taps
    }

    /// The node's single partition-boundary source.
    ///
    /// # Errors
    /// [`DflError::Planning`] when the node has zero or multiple sources, or
    /// when the single source is not a partition boundary.
    pub fn single_boundary_source(&self) -> Result<&Boundary> {
        if self.sources.len() != 1 {
            return Err(DflError::Planning(format!(
                "sink node '{}' must have a single source, found {}",
                self.id,
                self.sources.len()
            )));
        }
        match &self.sources[0] {
            SourceElement::Boundary(boundary) => Ok(boundary),
            SourceElement::Tap(tap) => Err(DflError::Planning(format!(
                "source of sink node '{}' must be a partition boundary, found endpoint '{}'",
                self.id,
                tap.identifier()
            ))),
        }
    }
}

impl fmt::Debug for ExecutionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionNode")
            .field("id", &self.id)
            .field("sources", &self.sources)
            .field("transforms", &self.transforms)
            .field(
                "sink_taps",
                &self
                    .sink_taps
                    .iter()
                    .map(|t| t.identifier().to_string())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
