use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{DflError, Result};

/// Always-emitted per-slice counters.
pub mod slice {
    /// Counter group for slice lifecycle counters.
    pub const GROUP: &str = "dfl.slice";
    /// Epoch-millisecond timestamp of slice completion.
    pub const PROCESS_END_TIME: &str = "process_end_time";
    /// Wall-clock slice duration in milliseconds.
    pub const PROCESS_DURATION: &str = "process_duration";
}

/// Task-instance counter registry keyed by `(group, name)`.
///
/// One registry is scoped to one task instance; the host merges instances by
/// summing [`CounterRegistry::snapshot`] values. The registry is handed to
/// the sink runtime as an explicit capability, never looked up globally.
#[derive(Clone, Debug)]
pub struct CounterRegistry {
    inner: Arc<CounterInner>,
}

#[derive(Debug)]
struct CounterInner {
    registry: Registry,
    counters: IntCounterVec,
}

impl CounterRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();
        let counters = int_counter_vec(
            &registry,
            "dfl_task_counters_total",
            "Task counters keyed by group and name",
            &["group", "name"],
        );
        Self {
            inner: Arc::new(CounterInner { registry, counters }),
        }
    }

    /// Add `delta` to the `(group, name)` counter.
    pub fn add(&self, group: &str, name: &str, delta: u64) {
        self.inner
            .counters
            .with_label_values(&[group, name])
            .inc_by(delta);
    }

    /// Current local value of the `(group, name)` counter, 0 if never touched.
    pub fn local_value(&self, group: &str, name: &str) -> u64 {
        self.inner.counters.with_label_values(&[group, name]).get()
    }

    /// All touched counters with their local values, for host-side merging.
    pub fn snapshot(&self) -> BTreeMap<(String, String), u64> {
        let mut out = BTreeMap::new();
        for family in self.inner.counters.collect() {
            for metric in family.get_metric() {
                let mut group = String::new();
                let mut name = String::new();
                for label in metric.get_label() {
                    match label.get_name() {
                        "group" => group = label.get_value().to_string(),
                        "name" => name = label.get_value().to_string(),
                        _ => {}
                    }
                }
                out.insert((group, name), metric.get_counter().get_value() as u64);
            }
        }
        out
    }

    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for CounterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn int_counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let c = IntCounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

/// Milliseconds since the unix epoch.
pub fn now_ms() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .map_err(|e| DflError::State(format!("clock error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::{CounterRegistry, now_ms, slice};

    #[test]
    fn adds_and_reads_local_values() {
        let counters = CounterRegistry::new();
        counters.add("io", "records_written", 3);
        counters.add("io", "records_written", 2);
        assert_eq!(counters.local_value("io", "records_written"), 5);
        assert_eq!(counters.local_value("io", "never_touched"), 0);
    }

    #[test]
    fn registries_are_instance_scoped() {
        let a = CounterRegistry::new();
        let b = CounterRegistry::new();
        a.add(slice::GROUP, slice::PROCESS_DURATION, 10);
        assert_eq!(b.local_value(slice::GROUP, slice::PROCESS_DURATION), 0);
    }

    #[test]
    fn snapshot_lists_touched_counters() {
        let counters = CounterRegistry::new();
        counters.add("io", "records_written", 4);
        counters.add(slice::GROUP, slice::PROCESS_DURATION, 12);
        let snap = counters.snapshot();
        assert_eq!(
            snap.get(&("io".to_string(), "records_written".to_string())),
            Some(&4)
        );
        assert_eq!(
            snap.get(&(slice::GROUP.to_string(), slice::PROCESS_DURATION.to_string())),
            Some(&12)
        );
    }

    #[test]
    fn renders_prometheus_text() {
        let counters = CounterRegistry::new();
        counters.add("io", "records_written", 1);
        let text = counters.render_prometheus();
        assert!(text.contains("dfl_task_counters_total"));
        assert!(text.contains("records_written"));
    }

    #[test]
    fn now_ms_is_after_epoch() {
        assert!(now_ms().expect("clock") > 0);
    }
}
