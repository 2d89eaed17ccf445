//! Push-oriented stream graph assembled for one sink execution node.
//!
//! Responsibilities:
//! - validate the node shape (single partition-boundary source, at least
//!   one sink endpoint)
//! - materialize declared transforms into duct stages
//! - fan records out to every sink endpoint, cloning for all but the last
//! - drive prepare and cleanup across all stages exactly once
//!
//! Architecture role: the host adapter pulls records from the runtime and
//! pushes them into this graph one at a time. The graph owns the duct
//! chain and the endpoint collectors for the lifetime of the task slice.

use std::fmt;
use std::sync::Arc;

use dfl_common::{DflError, DuctFault, Result};
use tracing::debug;

use crate::context::PipelineContext;
use crate::duct::{Duct, ProjectionDuct};
use crate::node::{ExecutionNode, TransformSpec};
use crate::record::Record;
use crate::tap::{BoxedCollector, Tap};

/// Terminal stage writing records into one sink endpoint.
pub struct TapSinkStage {
    name: String,
    tap: Arc<dyn Tap>,
    ctx: PipelineContext,
    collector: Option<BoxedCollector>,
}

impl TapSinkStage {
    fn new(tap: Arc<dyn Tap>, ctx: PipelineContext) -> Self {
        Self {
            name: format!("sink:{}", tap.identifier()),
            tap,
            ctx,
            collector: None,
        }
    }
}

impl Duct for TapSinkStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&mut self) -> std::result::Result<(), DuctFault> {
        if self.collector.is_none() {
            self.collector = Some(self.ctx.open_for_write(self.tap.as_ref())?);
        }
        Ok(())
    }

    fn receive(&mut self, record: Record) -> std::result::Result<Option<Record>, DuctFault> {
        let collector = self.collector.as_mut().ok_or_else(|| {
            DflError::State(format!("sink stage '{}' has not been prepared", self.name))
        })?;
        collector.add(record)?;
        Ok(None)
    }

    fn cleanup(&mut self) -> std::result::Result<(), DuctFault> {
        if let Some(mut collector) = self.collector.take() {
            collector.close()?;
        }
        Ok(())
    }
}

/// Head stage receiving records from the partition boundary.
///
/// Each record walks the transform chain in order; a transform returning
/// no record absorbs it. Surviving records fan out to every sink stage.
pub struct SourceStage {
    name: String,
    transforms: Vec<Box<dyn Duct>>,
    sinks: Vec<TapSinkStage>,
}

impl SourceStage {
    /// Stage name, derived from the boundary element id.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Push one record through the transform chain into the sinks.
    pub fn receive(&mut self, record: Record) -> std::result::Result<(), DuctFault> {
        let mut current = record;
        for duct in &mut self.transforms {
            match duct.receive(current)? {
                Some(next) => current = next,
                None => return Ok(()),
            }
        }
        if let Some((last, rest)) = self.sinks.split_last_mut() {
            for sink in rest {
                sink.receive(current.clone())?;
            }
            last.receive(current)?;
        }
        Ok(())
    }

    fn prepare(&mut self) -> std::result::Result<(), DuctFault> {
        for duct in &mut self.transforms {
            duct.prepare()?;
        }
        for sink in &mut self.sinks {
            sink.prepare()?;
        }
        Ok(())
    }

    fn cleanup(&mut self) -> std::result::Result<(), DuctFault> {
        let mut first_fault = None;
        for duct in &mut self.transforms {
            if let Err(fault) = duct.cleanup()
                && first_fault.is_none()
            {
                first_fault = Some(fault);
            }
        }
        for sink in &mut self.sinks {
            if let Err(fault) = sink.cleanup()
                && first_fault.is_none()
            {
                first_fault = Some(fault);
            }
        }
        match first_fault {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

/// Stream graph for one sink execution node.
pub struct SinkStreamGraph {
    source: SourceStage,
    prepared: bool,
    cleaned: bool,
}

impl fmt::Debug for SinkStreamGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkStreamGraph")
            .field("source", &self.source.name)
            .field("prepared", &self.prepared)
            .field("cleaned", &self.cleaned)
            .finish_non_exhaustive()
    }
}

impl SinkStreamGraph {
    /// Assemble the graph for `node` under `ctx`.
    ///
    /// # Errors
    /// [`DflError::Planning`] when the node does not have exactly one
    /// partition-boundary source or declares no sink endpoints.
    pub fn new(ctx: &PipelineContext, node: &ExecutionNode) -> Result<Self> {
        let boundary = node.single_boundary_source()?;
        if node.sink_taps().is_empty() {
            return Err(DflError::Planning(format!(
                "sink node '{}' has no sink endpoints",
                node.id()
            )));
        }
        let transforms = node
            .transforms()
            .iter()
            .map(|spec| match spec {
                TransformSpec::Projection { input, output } => {
                    Box::new(ProjectionDuct::new(input.clone(), output.clone())) as Box<dyn Duct>
                }
            })
            .collect::<Vec<_>>();
        let sinks = node
            .sink_taps()
            .iter()
            .map(|tap| TapSinkStage::new(Arc::clone(tap), ctx.clone()))
            .collect::<Vec<_>>();
        let graph = Self {
            source: SourceStage {
                name: format!("boundary:{}", boundary.id),
                transforms,
                sinks,
            },
            prepared: false,
            cleaned: false,
        };
        debug!(
            operator = "SinkStreamGraph",
            node = node.id(),
            transforms = graph.source.transforms.len(),
            sinks = graph.source.sinks.len(),
            "assembled sink stream graph"
        );
        Ok(graph)
    }

    /// Names of the graph's head stages.
    pub fn heads(&self) -> Vec<String> {
        vec![self.source.name.clone()]
    }

    /// Names of the graph's tail stages.
    pub fn tails(&self) -> Vec<String> {
        self.source
            .sinks
            .iter()
            .map(|sink| sink.name.clone())
            .collect()
    }

    /// The head stage records are pushed into.
    pub fn source_stage(&mut self) -> &mut SourceStage {
        &mut self.source
    }

    /// Prepare every stage, heads to tails. Idempotent.
    pub fn prepare(&mut self) -> std::result::Result<(), DuctFault> {
        if self.prepared {
            return Ok(());
        }
        debug!(operator = "SinkStreamGraph", "preparing stages");
        self.source.prepare()?;
        self.prepared = true;
        Ok(())
    }

    /// Clean up every stage, returning the first fault after visiting all.
    /// Idempotent.
    pub fn cleanup(&mut self) -> std::result::Result<(), DuctFault> {
        if self.cleaned {
            return Ok(());
        }
        self.cleaned = true;
        debug!(operator = "SinkStreamGraph", "cleaning up stages");
        self.source.cleanup()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dfl_common::{CounterRegistry, PipelineConfig};

    use super::SinkStreamGraph;
    use crate::context::{PipelineContext, RuntimeHandle};
    use crate::node::{Boundary, ExecutionNode, SourceElement, TransformSpec};
    use crate::record::{FieldValue, Fields, Record};
    use crate::test_tap::CaptureTap;

    struct OneSliceRuntime {
        counters: CounterRegistry,
    }

    impl RuntimeHandle for OneSliceRuntime {
        fn task_index(&self) -> u32 {
            0
        }

        fn task_count(&self) -> u32 {
            1
        }

        fn counters(&self) -> &CounterRegistry {
            &self.counters
        }
    }

    fn test_context() -> PipelineContext {
        let runtime = OneSliceRuntime {
            counters: CounterRegistry::new(),
        };
        PipelineContext::new(PipelineConfig::new(), Arc::new(runtime), "datasink-ff")
    }

    fn record(values: Vec<i64>) -> Record {
        Record::from_values(values.into_iter().map(FieldValue::Int).collect())
    }

    #[test]
    fn forwards_records_into_sink() {
        let tap = Arc::new(CaptureTap::new("mem://out"));
        let node = ExecutionNode::new("ff")
            .with_boundary_source(Boundary::new("b1"))
            .with_sink_tap(tap.clone());
        let mut graph = SinkStreamGraph::new(&test_context(), &node).expect("graph");
        assert_eq!(graph.heads(), vec!["boundary:b1".to_string()]);
        assert_eq!(graph.tails(), vec!["sink:mem://out".to_string()]);
        graph.prepare().expect("prepare");
        graph.source_stage().receive(record(vec![1])).expect("receive");
        graph.source_stage().receive(record(vec![2])).expect("receive");
        graph.cleanup().expect("cleanup");
        assert_eq!(tap.records().len(), 2);
        assert_eq!(tap.close_count(), 1);
    }

    #[test]
    fn fans_out_to_every_sink() {
        let first = Arc::new(CaptureTap::new("mem://first"));
        let second = Arc::new(CaptureTap::new("mem://second"));
        let node = ExecutionNode::new("ff")
            .with_boundary_source(Boundary::new("b1"))
            .with_sink_tap(first.clone())
            .with_sink_tap(second.clone());
        let mut graph = SinkStreamGraph::new(&test_context(), &node).expect("graph");
        graph.prepare().expect("prepare");
        graph.source_stage().receive(record(vec![7])).expect("receive");
        graph.cleanup().expect("cleanup");
        assert_eq!(first.records(), vec![record(vec![7])]);
        assert_eq!(second.records(), vec![record(vec![7])]);
    }

    #[test]
    fn projection_narrows_records_before_the_sink() {
        let tap = Arc::new(CaptureTap::new("mem://out"));
        let node = ExecutionNode::new("ff")
            .with_boundary_source(Boundary::new("b1"))
            .with_transform(TransformSpec::Projection {
                input: Fields::new(["a", "b", "c"]),
                output: Fields::new(["b"]),
            })
            .with_sink_tap(tap.clone());
        let mut graph = SinkStreamGraph::new(&test_context(), &node).expect("graph");
        graph.prepare().expect("prepare");
        graph
            .source_stage()
            .receive(record(vec![10, 20, 30]))
            .expect("receive");
        graph.cleanup().expect("cleanup");
        assert_eq!(tap.records(), vec![record(vec![20])]);
    }

    #[test]
    fn node_without_sink_endpoints_is_a_planning_error() {
        let node = ExecutionNode::new("ff").with_boundary_source(Boundary::new("b1"));
        let err = SinkStreamGraph::new(&test_context(), &node).expect_err("must fail");
        assert!(err.to_string().contains("no sink endpoints"));
    }

    #[test]
    fn tap_source_is_a_planning_error() {
        let source_tap = Arc::new(CaptureTap::new("mem://in"));
        let node = ExecutionNode::new("ff")
            .with_source(SourceElement::Tap(source_tap))
            .with_sink_tap(Arc::new(CaptureTap::new("mem://out")));
        let err = SinkStreamGraph::new(&test_context(), &node).expect_err("must fail");
        assert!(err.to_string().contains("partition boundary"));
    }

    #[test]
    fn prepare_is_idempotent() {
        let tap = Arc::new(CaptureTap::new("mem://out"));
        let node = ExecutionNode::new("ff")
            .with_boundary_source(Boundary::new("b1"))
            .with_sink_tap(tap.clone());
        let mut graph = SinkStreamGraph::new(&test_context(), &node).expect("graph");
        graph.prepare().expect("prepare");
        graph.prepare().expect("prepare again");
        assert_eq!(tap.open_count(), 1);
    }

    #[test]
    fn cleanup_visits_all_sinks_and_returns_the_first_fault() {
        let failing = Arc::new(CaptureTap::new("mem://bad").with_fail_on_close());
        let healthy = Arc::new(CaptureTap::new("mem://good"));
        let node = ExecutionNode::new("ff")
            .with_boundary_source(Boundary::new("b1"))
            .with_sink_tap(failing.clone())
            .with_sink_tap(healthy.clone());
        let mut graph = SinkStreamGraph::new(&test_context(), &node).expect("graph");
        graph.prepare().expect("prepare");
        let fault = graph.cleanup().expect_err("must surface close fault");
        assert!(fault.to_string().contains("mem://bad"));
        assert_eq!(healthy.close_count(), 1);
        graph.cleanup().expect("second cleanup is a no-op");
    }
}
