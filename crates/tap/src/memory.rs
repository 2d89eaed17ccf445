//! In-memory record endpoint for embedded runs and tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dfl_common::{DflError, PipelineConfig, Result};
use dfl_pipeline::context::PipelineContext;
use dfl_pipeline::record::Record;
use dfl_pipeline::tap::{BoxedCollector, RecordCollector, RecordStream, SinkMode, Tap, TapKind};

/// Endpoint backed by a shared in-memory buffer.
///
/// All collectors opened from the same tap append to one buffer, in
/// arrival order. The buffer outlives the collectors, so callers can
/// inspect what was written after the pipeline has shut down.
pub struct MemoryTap {
    identifier: String,
    records: Arc<Mutex<Vec<Record>>>,
    open_count: Arc<AtomicUsize>,
}

impl MemoryTap {
    /// Empty endpoint with the default identifier.
    pub fn new() -> Self {
        Self {
            identifier: "memory".to_string(),
            records: Arc::new(Mutex::new(Vec::new())),
            open_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replace the endpoint identifier.
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Snapshot of everything written so far.
    pub fn records(&self) -> Vec<Record> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of collectors opened against this endpoint.
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }
}

impl Default for MemoryTap {
    fn default() -> Self {
        Self::new()
    }
}

impl Tap for MemoryTap {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn kind(&self) -> TapKind {
        TapKind::Memory
    }

    fn open_for_read(&self, _ctx: &PipelineContext) -> Result<RecordStream> {
        let snapshot = self.records();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn open_for_write(
        &self,
        _ctx: &PipelineContext,
        _mode: Option<SinkMode>,
    ) -> Result<BoxedCollector> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCollector {
            records: Arc::clone(&self.records),
        }))
    }

    fn cleanup_job(&self, _conf: &PipelineConfig) -> Result<()> {
        Ok(())
    }
}

struct MemoryCollector {
    records: Arc<Mutex<Vec<Record>>>,
}

impl RecordCollector for MemoryCollector {
    fn add(&mut self, record: Record) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| DflError::State("memory endpoint buffer is poisoned".to_string()))?
            .push(record);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
