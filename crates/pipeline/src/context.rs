//! Slice-scoped execution context handed to ducts and endpoints.
//!
//! Responsibilities:
//! - expose slice identity (slice index, slice count) of the running task
//! - route counter updates to the task's [`CounterRegistry`]
//! - carry the immutable pipeline configuration and derive scoped copies
//! - open endpoints for reading and writing, including trap endpoints
//!
//! Architecture role: ducts and taps never talk to the host runtime
//! directly. Everything they may ask for goes through this context, so a
//! context without a bound runtime handle still supports configuration and
//! planning paths while failing fast on slice-scoped calls.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dfl_common::{CounterRegistry, DflError, PipelineConfig, Result, config::keys};
use tracing::debug;

use crate::tap::{BoxedCollector, RecordStream, Tap, TapKind};

/// Capability surface the host runtime binds into a [`PipelineContext`].
pub trait RuntimeHandle: Send + Sync {
    /// Zero-based index of this task instance.
    fn task_index(&self) -> u32;

    /// Total number of parallel task instances.
    fn task_count(&self) -> u32;

    /// Counter registry scoped to this task instance.
    fn counters(&self) -> &CounterRegistry;
}

/// Execution context for one sink task instance.
///
/// Cloning is cheap: the runtime handle is shared, the configuration is
/// copied. Scoped re-entry (trap writes, job cleanup) goes through
/// [`PipelineContext::copy_with`] so the handle and task id survive while
/// the configuration is swapped.
#[derive(Clone)]
pub struct PipelineContext {
    config: PipelineConfig,
    runtime: Option<Arc<dyn RuntimeHandle>>,
    task_id: String,
}

impl PipelineContext {
    /// Context bound to a live runtime handle.
    pub fn new(
        config: PipelineConfig,
        runtime: Arc<dyn RuntimeHandle>,
        task_id: impl Into<String>,
    ) -> Self {
        Self {
            config,
            runtime: Some(runtime),
            task_id: task_id.into(),
        }
    }

    /// Context without a runtime handle.
    ///
    /// Planning and configuration paths run fine; slice-scoped calls
    /// ([`Self::num_slices`], [`Self::current_slice`], counters) return
    /// [`DflError::State`].
    pub fn unbound(config: PipelineConfig) -> Self {
        Self {
            config,
            runtime: None,
            task_id: String::new(),
        }
    }

    fn handle(&self) -> Result<&Arc<dyn RuntimeHandle>> {
        self.runtime.as_ref().ok_or_else(|| {
            DflError::State("runtime handle has not been bound to this context".to_string())
        })
    }

    /// Total number of parallel slices executing the sink node.
    pub fn num_slices(&self) -> Result<u32> {
        Ok(self.handle()?.task_count())
    }

    /// Zero-based slice index of this task instance.
    pub fn current_slice(&self) -> Result<u32> {
        Ok(self.handle()?.task_index())
    }

    /// Add `delta` to the `(group, name)` counter of this task instance.
    pub fn increment(&self, group: &str, name: &str, delta: u64) -> Result<()> {
        self.handle()?.counters().add(group, name, delta);
        Ok(())
    }

    /// Locally accumulated value of the `(group, name)` counter.
    pub fn counter_value(&self, group: &str, name: &str) -> Result<u64> {
        Ok(self.handle()?.counters().local_value(group, name))
    }

    /// Stable task id of the executing sink node, empty when unbound.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Configuration property lookup.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.config.get(key)
    }

    /// All configuration keys in sorted order.
    pub fn property_keys(&self) -> Vec<String> {
        self.config.keys().map(str::to_string).collect()
    }

    /// Borrow the context configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Independent copy of the context configuration.
    pub fn config_copy(&self) -> PipelineConfig {
        self.config.clone()
    }

    /// Same runtime handle and task id, different configuration.
    pub fn copy_with(&self, config: PipelineConfig) -> Self {
        Self {
            config,
            runtime: self.runtime.clone(),
            task_id: self.task_id.clone(),
        }
    }

    /// Entries of `updated` that differ from `default`.
    pub fn diff_config_into_map(
        default: &PipelineConfig,
        updated: &PipelineConfig,
    ) -> BTreeMap<String, String> {
        PipelineConfig::diff_into_map(default, updated)
    }

    /// Copy of `default` with `overrides` applied on top.
    pub fn merge_map_into_config(
        default: &PipelineConfig,
        overrides: &BTreeMap<String, String>,
    ) -> PipelineConfig {
        PipelineConfig::merge_map(default, overrides)
    }

    /// Open `tap` for reading under this context.
    pub fn open_for_read(&self, tap: &dyn Tap) -> Result<RecordStream> {
        tap.open_for_read(self)
    }

    /// Open `tap` for writing under this context.
    ///
    /// The write path never applies a sink-mode policy. Endpoint
    /// preparation (replace, keep, update) belongs to the planning phase,
    /// so the mode is always passed as `None` here.
    pub fn open_for_write(&self, tap: &dyn Tap) -> Result<BoxedCollector> {
        tap.open_for_write(self, None)
    }

    /// Open a trap endpoint for writing failed records.
    ///
    /// Trap part files are named per slice so parallel instances never
    /// collide: the part-name template carries the task id and the slice
    /// index, and leaves a `{seq}` placeholder for the endpoint to fill.
    ///
    /// # Errors
    /// [`DflError::Unsupported`] when `trap` is not filesystem-backed; the
    /// endpoint is not opened in that case.
    pub fn open_trap_for_write(&self, trap: &dyn Tap) -> Result<BoxedCollector> {
        match trap.kind() {
            TapKind::Filesystem => {}
            other => {
                return Err(DflError::Unsupported(format!(
                    "unsupported trap endpoint kind: {other}"
                )));
            }
        }
        let part_name = format!("part-{}-{:05}-{{seq}}", self.task_id, self.current_slice()?);
        debug!(
            operator = "PipelineContext",
            trap = trap.identifier(),
            part_name = %part_name,
            "opening trap endpoint"
        );
        let mut conf = self.config_copy();
        conf.set(keys::TAP_PART_NAME, part_name);
        trap.open_for_write(&self.copy_with(conf), None)
    }
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("task_id", &self.task_id)
            .field("bound", &self.runtime.is_some())
            .field("config_entries", &self.config.len())
            .finish()
    }
}
