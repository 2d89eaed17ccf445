//! Host-facing surface of the sink adapter.
//!
//! The batch host runtime configures a sink once with its generic
//! configuration value, then drives each parallel instance through
//! open, a stream of records, and close. A separate job-wide hook runs
//! once on the master after every instance has closed.

use std::collections::BTreeMap;

use dfl_common::Result;
use dfl_pipeline::record::Record;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Generic host configuration handed to `configure`.
///
/// The host treats this as an opaque bag of string properties; the
/// adapter translates it into a [`dfl_common::PipelineConfig`] via
/// [`to_pipeline_config`].
pub struct HostConfig {
    entries: BTreeMap<String, String>,
}

impl HostConfig {
    /// Empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// All entries in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Translate the host configuration into the pipeline representation.
///
/// Pure value translation; neither side is mutated and the result shares
/// no storage with the input.
pub fn to_pipeline_config(host: &HostConfig) -> dfl_common::PipelineConfig {
    dfl_common::PipelineConfig::from_entries(
        host.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

/// Record sink lifecycle driven by the host runtime.
///
/// One value per parallel task instance; calls arrive on a single thread
/// in the order `configure`, `open`, any number of `write_record`, `close`.
pub trait RecordOutput {
    /// Accept the job configuration. Called once, before `open`.
    ///
    /// # Errors
    /// Implementations return configuration translation failures.
    fn configure(&mut self, config: &HostConfig) -> Result<()>;

    /// Start this task instance as slice `task_index` of `task_count`.
    ///
    /// # Errors
    /// State errors on lifecycle misuse, planning errors on an invalid
    /// node, and classified faults from endpoint preparation.
    fn open(&mut self, task_index: u32, task_count: u32) -> Result<()>;

    /// Push one record into the sink.
    ///
    /// # Errors
    /// State error when the instance is not open, otherwise classified
    /// execution faults.
    fn write_record(&mut self, record: Record) -> Result<()>;

    /// Finish this task instance and release its resources.
    ///
    /// # Errors
    /// Classified faults from endpoint shutdown.
    fn close(&mut self) -> Result<()>;
}

/// Job-wide completion hook, run once after all instances have closed.
pub trait FinalizeOnMaster {
    /// Finalize the job that executed with `parallelism` instances.
    ///
    /// # Errors
    /// Planning errors when the node exposes no sink endpoint, otherwise
    /// faults from the endpoint's job-level cleanup.
    fn finalize_global(&mut self, parallelism: u32) -> Result<()>;
}
