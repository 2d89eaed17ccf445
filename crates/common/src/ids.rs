//! Typed task identity for sink task instances.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DflError, Result};

/// Attempt identity of one writing task instance, rendered in the external
/// filesystem convention consumed by downstream tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskAttemptId {
    /// Numeric id folded from the execution-node id.
    pub numeric_id: i64,
    /// Zero-based task index within the parallel sink.
    pub task_index: u32,
}

impl fmt::Display for TaskAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempt_{:012}_0000_m_{:06}_0",
            self.numeric_id, self.task_index
        )
    }
}

/// Full identity of one sink task instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkTaskIdentity {
    /// Stable task id derived from the execution node (`datasink-<node-id>`).
    pub task_id: String,
    /// Attempt identity in the external convention.
    pub attempt: TaskAttemptId,
}

impl SinkTaskIdentity {
    /// Attempt id string in the external convention.
    pub fn attempt_id(&self) -> String {
        self.attempt.to_string()
    }
}

/// Interpret an execution-node id as big-endian hexadecimal, keeping the low
/// 64 bits. Node ids routinely exceed 64 bits; the fold discards high bits a
/// nibble at a time, matching the external convention's truncation.
pub fn parse_node_id_hex(node_id: &str) -> Result<i64> {
    if node_id.is_empty() {
        return Err(DflError::Planning("execution node id is empty".to_string()));
    }
    let mut acc: u64 = 0;
    for ch in node_id.chars() {
        let nibble = ch.to_digit(16).ok_or_else(|| {
            DflError::Planning(format!(
                "execution node id '{node_id}' is not a hexadecimal string"
            ))
        })?;
        acc = (acc << 4) | u64::from(nibble);
    }
    Ok(acc as i64)
}

/// Derive the identity of one sink task instance from its execution node id
/// and zero-based task index.
pub fn derive_sink_identity(node_id: &str, task_index: u32) -> Result<SinkTaskIdentity> {
    let numeric_id = parse_node_id_hex(node_id)?;
    Ok(SinkTaskIdentity {
        task_id: format!("datasink-{node_id}"),
        attempt: TaskAttemptId {
            numeric_id,
            task_index,
        },
    })
}
