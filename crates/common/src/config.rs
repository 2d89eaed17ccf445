use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DflError, Result};

/// Well-known configuration keys injected or consumed by the sink runtime.
pub mod keys {
    /// Zero-based task/slice index of the writing instance.
    pub const TASK_PARTITION: &str = "dfl.task.partition";
    /// Externally consumable attempt id for the writing instance.
    pub const TASK_ATTEMPT_ID: &str = "dfl.task.attempt.id";
    /// Whether the flow is currently executing; cleared by job-wide finalize.
    pub const FLOW_EXECUTING: &str = "dfl.flow.executing";
    /// Output location consumed by job-level endpoint cleanup.
    pub const OUTPUT_DIR: &str = "dfl.output.dir";
    /// Part-file naming template override for trap collectors.
    pub const TAP_PART_NAME: &str = "dfl.tap.part.name";
}

/// Native string-keyed pipeline configuration.
///
/// Values are stored as strings; typed accessors parse on read. Copies are
/// cheap and explicit: every mutation path in the sink runtime works on a
/// copy, the configured original is never aliased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    entries: BTreeMap<String, String>,
}

impl PipelineConfig {
    /// Empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw string entries.
    pub fn from_entries(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }

    /// Raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Set `key` to `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Remove `key`, returning the previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// All keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// All entries in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the configuration holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse `key` as `i64`.
    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        self.parse_value(key, "i64", str::parse::<i64>)
    }

    /// Set `key` to an `i64` value.
    pub fn set_i64(&mut self, key: impl Into<String>, value: i64) {
        self.set(key, value.to_string());
    }

    /// Parse `key` as `u32`.
    pub fn get_u32(&self, key: &str) -> Result<Option<u32>> {
        self.parse_value(key, "u32", str::parse::<u32>)
    }

    /// Set `key` to a `u32` value.
    pub fn set_u32(&mut self, key: impl Into<String>, value: u32) {
        self.set(key, value.to_string());
    }

    /// Parse `key` as `bool` (`true`/`false`).
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.parse_value(key, "bool", str::parse::<bool>)
    }

    /// Set `key` to a `bool` value.
    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.set(key, value.to_string());
    }

    fn parse_value<T, E: std::fmt::Display>(
        &self,
        key: &str,
        ty: &str,
        parse: impl Fn(&str) -> std::result::Result<T, E>,
    ) -> Result<Option<T>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(raw) => parse(raw).map(Some).map_err(|e| {
                DflError::InvalidConfig(format!("key '{key}' is not a valid {ty}: {e}"))
            }),
        }
    }

    /// Keys of `updated` whose value differs from `default`, with the updated
    /// value. A key absent from both configurations compares equal; a key
    /// absent only from `default` counts as changed.
    pub fn diff_into_map(default: &Self, updated: &Self) -> BTreeMap<String, String> {
        let mut differences = BTreeMap::new();
        for (key, updated_value) in &updated.entries {
            if default.entries.get(key) != Some(updated_value) {
                differences.insert(key.clone(), updated_value.clone());
            }
        }
        differences
    }

    /// Fresh copy of `default` with every entry of `overrides` applied.
    /// `default` itself is never mutated.
    pub fn merge_map(default: &Self, overrides: &BTreeMap<String, String>) -> Self {
        let mut merged = default.clone();
        for (key, value) in overrides {
            merged.set(key.clone(), value.clone());
        }
        merged
    }
}
