//! Sink output adapter bridging the pull-oriented host runtime to the
//! push-oriented stream graph.
//!
//! Responsibilities:
//! - translate and hold the job configuration handed to `configure`
//! - derive slice identity and inject it into the pipeline configuration
//! - assemble, prepare, feed, and shut down the stream graph for one slice
//! - emit the slice timing counters on every close path
//! - run the job-wide endpoint cleanup once on the master
//!
//! Architecture role: the host runtime pulls records from upstream and
//! hands them to this adapter one at a time; everything downstream of the
//! partition boundary is push-oriented and lives in `dfl-pipeline`.

use std::fmt;
use std::sync::Arc;

use dfl_common::{
    CounterRegistry, DflError, PipelineConfig, Result, classify_fault, config::keys,
    derive_sink_identity, metrics::slice, now_ms,
};
use dfl_pipeline::context::PipelineContext;
use dfl_pipeline::graph::SinkStreamGraph;
use dfl_pipeline::node::ExecutionNode;
use dfl_pipeline::record::Record;
use tracing::{debug, info};

use crate::host::{FinalizeOnMaster, HostConfig, RecordOutput, to_pipeline_config};
use crate::runtime::TaskRuntimeHandle;

const CONFIGURE_STAGE: &str = "during sink configuration";
const EXECUTE_STAGE: &str = "during sink execution";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Lifecycle of one sink task instance.
enum SinkState {
    Unopened,
    Opened,
    Closed,
}

/// Per-slice pipeline assembled by `open` and torn down by `close`.
struct OpenedSink {
    ctx: PipelineContext,
    graph: SinkStreamGraph,
    process_begin_ms: u64,
}

/// Record sink executing one sink node of the pipeline plan.
///
/// One value per parallel task instance. The host drives it strictly in
/// order: `configure`, `open`, a stream of `write_record` calls, `close`.
/// The job-wide [`FinalizeOnMaster`] hook is independent of that instance
/// lifecycle and may run on a fresh value.
pub struct SinkStreamOutput {
    node: Arc<ExecutionNode>,
    counters: CounterRegistry,
    config: Option<PipelineConfig>,
    state: SinkState,
    opened: Option<OpenedSink>,
}

impl SinkStreamOutput {
    /// Adapter for `node`, reporting counters into `counters`.
    pub fn new(node: Arc<ExecutionNode>, counters: CounterRegistry) -> Self {
        Self {
            node,
            counters,
            config: None,
            state: SinkState::Unopened,
            opened: None,
        }
    }

    /// Counter registry this instance reports into.
    pub fn counters(&self) -> &CounterRegistry {
        &self.counters
    }

    fn stored_config(&self) -> Result<&PipelineConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| DflError::State("sink has not been configured".to_string()))
    }

    fn emit_slice_counters(opened: &OpenedSink) -> Result<u64> {
        let end_ms = now_ms()?;
        let duration_ms = end_ms.saturating_sub(opened.process_begin_ms);
        opened
            .ctx
            .increment(slice::GROUP, slice::PROCESS_END_TIME, end_ms)?;
        opened
            .ctx
            .increment(slice::GROUP, slice::PROCESS_DURATION, duration_ms)?;
        Ok(duration_ms)
    }
}

impl RecordOutput for SinkStreamOutput {
    fn configure(&mut self, config: &HostConfig) -> Result<()> {
        let translated = to_pipeline_config(config);
        debug!(
            operator = "SinkStreamOutput",
            node = self.node.id(),
            entries = translated.len(),
            "sink configured"
        );
        self.config = Some(translated);
        Ok(())
    }

    fn open(&mut self, task_index: u32, task_count: u32) -> Result<()> {
        match self.state {
            SinkState::Unopened => {}
            SinkState::Opened => {
                return Err(DflError::State("sink is already open".to_string()));
            }
            SinkState::Closed => {
                return Err(DflError::State(
                    "sink has already been closed; instances are not reusable".to_string(),
                ));
            }
        }
        let stored = self.stored_config()?;
        let process_begin_ms = now_ms()?;
        let identity = derive_sink_identity(self.node.id(), task_index)?;
        let runtime = Arc::new(TaskRuntimeHandle::new(
            task_index,
            task_count,
            self.counters.clone(),
        ));

        let mut conf = stored.clone();
        conf.set_u32(keys::TASK_PARTITION, task_index);
        conf.set(keys::TASK_ATTEMPT_ID, identity.attempt_id());

        let ctx = PipelineContext::new(conf, runtime, identity.task_id.clone());
        let mut graph = SinkStreamGraph::new(&ctx, &self.node)?;
        info!(
            operator = "SinkStreamOutput",
            task_id = %identity.task_id,
            slice = task_index,
            slices = task_count,
            "opening sink task"
        );
        for head in graph.heads() {
            info!(
                operator = "SinkStreamOutput",
                task_id = %identity.task_id,
                "sourcing from: {head}"
            );
        }
        for tail in graph.tails() {
            info!(
                operator = "SinkStreamOutput",
                task_id = %identity.task_id,
                "sinking to: {tail}"
            );
        }
        graph
            .prepare()
            .map_err(|fault| classify_fault(CONFIGURE_STAGE, fault))?;

        self.opened = Some(OpenedSink {
            ctx,
            graph,
            process_begin_ms,
        });
        self.state = SinkState::Opened;
        Ok(())
    }

    fn write_record(&mut self, record: Record) -> Result<()> {
        let Some(opened) = self.opened.as_mut() else {
            return Err(DflError::State("sink has not been opened".to_string()));
        };
        opened
            .graph
            .source_stage()
            .receive(record)
            .map_err(|fault| classify_fault(EXECUTE_STAGE, fault))
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut opened) = self.opened.take() else {
            return Ok(());
        };
        self.state = SinkState::Closed;
        let cleanup_fault = opened
            .graph
            .cleanup()
            .err()
            .map(|fault| classify_fault(EXECUTE_STAGE, fault));
        let emitted = Self::emit_slice_counters(&opened);
        if let Ok(duration_ms) = &emitted {
            info!(
                operator = "SinkStreamOutput",
                task_id = %opened.ctx.task_id(),
                duration_ms,
                "sink task closed"
            );
        }
        if let Some(fault) = cleanup_fault {
            return Err(fault);
        }
        emitted.map(|_| ())
    }
}

impl FinalizeOnMaster for SinkStreamOutput {
    fn finalize_global(&mut self, parallelism: u32) -> Result<()> {
        let stored = self.stored_config()?;
        let tap = self.node.sink_taps().first().ok_or_else(|| {
            DflError::Planning(format!(
                "sink node '{}' has no sink endpoints",
                self.node.id()
            ))
        })?;
        let mut conf = stored.clone();
        conf.set_bool(keys::FLOW_EXECUTING, false);
        conf.set(keys::OUTPUT_DIR, tap.identifier());
        info!(
            operator = "SinkStreamOutput",
            node = self.node.id(),
            parallelism,
            endpoint = tap.identifier(),
            "finalizing sink job"
        );
        tap.cleanup_job(&conf)
    }
}

impl fmt::Debug for SinkStreamOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkStreamOutput")
            .field("node", &self.node.id())
            .field("state", &self.state)
            .field("configured", &self.config.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
