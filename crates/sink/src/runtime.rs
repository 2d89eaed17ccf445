//! Runtime handle binding host slice identity into the pipeline context.

use dfl_common::CounterRegistry;
use dfl_pipeline::context::RuntimeHandle;

#[derive(Debug, Clone)]
/// Slice identity and counter capability for one running sink task.
pub struct TaskRuntimeHandle {
    task_index: u32,
    task_count: u32,
    counters: CounterRegistry,
}

impl TaskRuntimeHandle {
    /// Handle for slice `task_index` of `task_count`, reporting into
    /// `counters`.
    pub fn new(task_index: u32, task_count: u32, counters: CounterRegistry) -> Self {
        Self {
            task_index,
            task_count,
            counters,
        }
    }
}

impl RuntimeHandle for TaskRuntimeHandle {
    fn task_index(&self) -> u32 {
        self.task_index
    }

    fn task_count(&self) -> u32 {
        self.task_count
    }

    fn counters(&self) -> &CounterRegistry {
        &self.counters
    }
}
