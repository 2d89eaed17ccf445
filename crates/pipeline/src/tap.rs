//! External endpoint (tap) contracts used by sink stream graphs.

use std::fmt;

use dfl_common::{PipelineConfig, Result};
use serde::{Deserialize, Serialize};

use crate::context::PipelineContext;
use crate::record::Record;

/// Endpoint capability kinds recognized by the sink runtime.
///
/// Trap writers are gated on this enumeration; only
/// [`TapKind::Filesystem`] endpoints support trap collectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TapKind {
    /// Distributed-filesystem style endpoint writing part files under a
    /// directory.
    Filesystem,
    /// In-memory endpoint used by embedded runs and tests.
    Memory,
}

impl fmt::Display for TapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TapKind::Filesystem => write!(f, "filesystem"),
            TapKind::Memory => write!(f, "memory"),
        }
    }
}

/// Sink preparation policy applied when a writer owns the whole resource.
///
/// Task-level writers never apply this policy: concurrent task instances
/// write disjoint part files into the same resource, so `open_for_write` is
/// always entered with `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkMode {
    /// Fail when the resource already holds data.
    Keep,
    /// Remove existing resource content before writing.
    Replace,
    /// Write into the existing resource.
    Update,
}

/// Streaming record writer bound to one endpoint resource.
pub trait RecordCollector: Send {
    /// Append one record.
    fn add(&mut self, record: Record) -> Result<()>;

    /// Flush and release the writer.
    fn close(&mut self) -> Result<()>;
}

impl fmt::Debug for dyn RecordCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn RecordCollector")
    }
}

/// Boxed record writer.
pub type BoxedCollector = Box<dyn RecordCollector>;

/// Boxed streaming record reader.
pub type RecordStream = Box<dyn Iterator<Item = Result<Record>> + Send>;

/// External data endpoint supporting streaming reads and writes.
pub trait Tap: Send + Sync {
    /// Stable resource identifier (a path for filesystem endpoints).
    fn identifier(&self) -> &str;

    /// Capability kind of this endpoint.
    fn kind(&self) -> TapKind;

    /// Open a streaming reader over the endpoint.
    ///
    /// # Errors
    /// Returns an error when the resource is missing or unreadable.
    fn open_for_read(&self, ctx: &PipelineContext) -> Result<RecordStream>;

    /// Open a streaming writer into the endpoint.
    ///
    /// `mode` of `None` means "do not apply the sink-mode policy": the writer
    /// joins a resource shared with concurrent task instances and must not
    /// delete or replace anything beyond its own part.
    ///
    /// # Errors
    /// Returns an error when the resource cannot be prepared for writing.
    fn open_for_write(
        &self,
        ctx: &PipelineContext,
        mode: Option<SinkMode>,
    ) -> Result<BoxedCollector>;

    /// Job-level cleanup, invoked once from the job-wide finalize step with a
    /// configuration snapshot carrying the output location.
    ///
    /// # Errors
    /// Returns an error when scratch state cannot be removed.
    fn cleanup_job(&self, conf: &PipelineConfig) -> Result<()>;
}
