//! In-memory capture endpoint shared by the unit tests in this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dfl_common::{PipelineConfig, Result, config::keys};

use crate::context::PipelineContext;
use crate::record::Record;
use crate::tap::{BoxedCollector, RecordCollector, RecordStream, SinkMode, Tap, TapKind};

/// Endpoint that captures written records and observes how it was opened.
pub struct CaptureTap {
    identifier: String,
    kind: TapKind,
    fail_on_close: bool,
    records: Arc<Mutex<Vec<Record>>>,
    open_count: Arc<AtomicUsize>,
    close_count: Arc<AtomicUsize>,
    part_name: Arc<Mutex<Option<String>>>,
    last_mode: Arc<Mutex<Option<SinkMode>>>,
}

impl CaptureTap {
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            kind: TapKind::Filesystem,
            fail_on_close: false,
            records: Arc::new(Mutex::new(Vec::new())),
            open_count: Arc::new(AtomicUsize::new(0)),
            close_count: Arc::new(AtomicUsize::new(0)),
            part_name: Arc::new(Mutex::new(None)),
            last_mode: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_kind(mut self, kind: TapKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_fail_on_close(mut self) -> Self {
        self.fail_on_close = true;
        self
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().expect("records lock").clone()
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    /// Part-name property seen by the most recent open, if any.
    pub fn captured_part_name(&self) -> Option<String> {
        self.part_name.lock().expect("part name lock").clone()
    }

    /// Sink mode passed to the most recent open.
    pub fn last_mode(&self) -> Option<SinkMode> {
        *self.last_mode.lock().expect("mode lock")
    }
}

impl Tap for CaptureTap {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn kind(&self) -> TapKind {
        self.kind
    }

    fn open_for_read(&self, _ctx: &PipelineContext) -> Result<RecordStream> {
        let snapshot = self.records();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn open_for_write(
        &self,
        ctx: &PipelineContext,
        mode: Option<SinkMode>,
    ) -> Result<BoxedCollector> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        *self.part_name.lock().expect("part name lock") =
            ctx.property(keys::TAP_PART_NAME).map(str::to_string);
        *self.last_mode.lock().expect("mode lock") = mode;
        Ok(Box::new(CaptureCollector {
            identifier: self.identifier.clone(),
            fail_on_close: self.fail_on_close,
            records: Arc::clone(&self.records),
            close_count: Arc::clone(&self.close_count),
        }))
    }

    fn cleanup_job(&self, _conf: &PipelineConfig) -> Result<()> {
        Ok(())
    }
}

struct CaptureCollector {
    identifier: String,
    fail_on_close: bool,
    records: Arc<Mutex<Vec<Record>>>,
    close_count: Arc<AtomicUsize>,
}

impl RecordCollector for CaptureCollector {
    fn add(&mut self, record: Record) -> Result<()> {
        self.records.lock().expect("records lock").push(record);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_close {
            return Err(std::io::Error::other(format!(
                "failed to close endpoint '{}'",
                self.identifier
            ))
            .into());
        }
        Ok(())
    }
}
