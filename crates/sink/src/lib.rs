//! Host-facing sink adapter executing pipeline sink nodes inside a
//! pull-oriented batch runtime.

pub mod host;
pub mod output;
pub mod runtime;

pub use host::{FinalizeOnMaster, HostConfig, RecordOutput, to_pipeline_config};
pub use output::SinkStreamOutput;
pub use runtime::TaskRuntimeHandle;
