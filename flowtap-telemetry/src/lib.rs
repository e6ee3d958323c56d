#![forbid(unsafe_code)]

//! Process-wide counters (`§6` "Observability").
//!
//! A tiny named-counter registry, global like the rest of the workspace's
//! ambient logging: callers register a counter once and bump it from
//! wherever; nothing here is specific to flows or sessions, so
//! `flowtap-session`/`flowtap-daemon` record under whatever names they
//! choose (`sessions_live`, `packets_processed`, `packets_missed`, ...).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("telemetry init failed: {0}")]
    Init(String),
}

static COUNTERS: Lazy<Mutex<HashMap<String, &'static AtomicU64>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Increment a named counter, registering it with an initial value of zero
/// on first use.
pub fn record_counter(name: &str, delta: u64) {
    let mut counters = COUNTERS.lock();
    let cell = counters
        .entry(name.to_string())
        .or_insert_with(|| Box::leak(Box::new(AtomicU64::new(0))));
    cell.fetch_add(delta, Ordering::Relaxed);
}

/// Overwrite a named counter to an absolute value, for gauges like "live
/// session count" where accumulation doesn't make sense.
pub fn set_gauge(name: &str, value: u64) {
    let mut counters = COUNTERS.lock();
    let cell = counters
        .entry(name.to_string())
        .or_insert_with(|| Box::leak(Box::new(AtomicU64::new(0))));
    cell.store(value, Ordering::Relaxed);
}

/// Snapshot every counter currently registered, sorted by name for stable
/// log output.
pub fn snapshot() -> Vec<(String, u64)> {
    let counters = COUNTERS.lock();
    let mut out: Vec<_> = counters
        .iter()
        .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

/// Emit the current snapshot as a single structured log event.
pub fn log_snapshot() {
    for (name, value) in snapshot() {
        tracing::info!(counter = name.as_str(), value, "telemetry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates_across_calls() {
        record_counter("test_counter_accumulates", 1);
        record_counter("test_counter_accumulates", 2);
        let snap = snapshot();
        let (_, v) = snap
            .iter()
            .find(|(n, _)| n == "test_counter_accumulates")
            .expect("counter present");
        assert!(*v >= 3);
    }

    #[test]
    fn gauge_overwrites_rather_than_accumulates() {
        set_gauge("test_gauge_overwrites", 5);
        set_gauge("test_gauge_overwrites", 9);
        let snap = snapshot();
        let (_, v) = snap
            .iter()
            .find(|(n, _)| n == "test_gauge_overwrites")
            .expect("gauge present");
        assert_eq!(*v, 9);
    }
}
