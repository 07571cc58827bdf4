//! Metrics Surface: monotonic counters and gauges, computed rates, safe to
//! mutate from any thread. Every increment is wait-free — a registry of
//! primitive atomics, not a lock-guarded map, because the hot path
//! (receiver handlers) contends on it constantly.
//!
//! Counters/gauges are mirrored into the `metrics` crate facade
//! (`counter!`/`gauge!`) for external exposition (Prometheus, a `/metrics`
//! handler, whatever the deployment wires up), while this registry keeps
//! its own readable atomics so the derived values in [`Snapshot`] can be
//! computed on read without depending on an exporter round-trip.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use metrics::{counter, gauge};
use otlp_ingress_common::SignalKind;
use tracing::warn;

#[derive(Default)]
struct SignalCounters {
    received: AtomicU64,
    dropped: AtomicU64,
    queue_size: AtomicU64,
}

/// A point-in-time read of every derived metric in §4.C.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub total_received: u64,
    pub total_dropped: u64,
    pub records_produced: u64,
    pub max_queue_utilization_percent: f64,
    pub total_lag: i64,
    pub drop_rate: f64,
}

pub struct MetricsRegistry {
    traces: SignalCounters,
    metrics_signal: SignalCounters,
    logs: SignalCounters,
    records_produced: AtomicU64,
    queue_capacity: AtomicU64,
    connector_name: Mutex<Option<String>>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            traces: SignalCounters::default(),
            metrics_signal: SignalCounters::default(),
            logs: SignalCounters::default(),
            records_produced: AtomicU64::new(0),
            queue_capacity: AtomicU64::new(0),
            connector_name: Mutex::new(None),
        }
    }

    fn signal(&self, s: SignalKind) -> &SignalCounters {
        match s {
            SignalKind::Traces => &self.traces,
            SignalKind::Metrics => &self.metrics_signal,
            SignalKind::Logs => &self.logs,
        }
    }

    /// Registers this registry under an operational namespace keyed by
    /// `connector_name`. A prior registration under the same name is
    /// superseded, never treated as a collision error: a failed
    /// registration is logged and swallowed, metrics are a secondary
    /// concern and must never block startup.
    pub fn register(&self, connector_name: &str) {
        let mut guard = match self.connector_name.lock() {
            Ok(g) => g,
            Err(e) => {
                warn!("failed to register metrics: {e}");
                return;
            }
        };
        *guard = Some(connector_name.to_string());
    }

    pub fn unregister(&self) {
        if let Ok(mut guard) = self.connector_name.lock() {
            *guard = None;
        }
    }

    pub fn increment_received(&self, signal: SignalKind) {
        self.signal(signal).received.fetch_add(1, Ordering::Relaxed);
        counter!("otlp_ingress.received", "signal" => signal.name()).increment(1);
    }

    pub fn increment_dropped(&self, signal: SignalKind) {
        self.signal(signal).dropped.fetch_add(1, Ordering::Relaxed);
        counter!("otlp_ingress.dropped", "signal" => signal.name()).increment(1);
    }

    pub fn increment_records_produced(&self, k: u64) {
        self.records_produced.fetch_add(k, Ordering::Relaxed);
        counter!("otlp_ingress.records_produced").increment(k);
    }

    pub fn update_queue_size(&self, signal: SignalKind, n: u64) {
        self.signal(signal).queue_size.store(n, Ordering::Relaxed);
        gauge!("otlp_ingress.queue_size", "signal" => signal.name()).set(n as f64);
    }

    pub fn set_queue_capacity(&self, n: u64) {
        self.queue_capacity.store(n, Ordering::Relaxed);
        gauge!("otlp_ingress.queue_capacity").set(n as f64);
    }

    /// Clears counters but preserves gauges (queue size/capacity are
    /// current state, not accumulation, and stay meaningful across a
    /// reset).
    pub fn reset_counters(&self) {
        for s in SignalKind::ALL {
            let c = self.signal(s);
            c.received.store(0, Ordering::Relaxed);
            c.dropped.store(0, Ordering::Relaxed);
        }
        self.records_produced.store(0, Ordering::Relaxed);
    }

    pub fn received(&self, signal: SignalKind) -> u64 {
        self.signal(signal).received.load(Ordering::Relaxed)
    }

    pub fn dropped(&self, signal: SignalKind) -> u64 {
        self.signal(signal).dropped.load(Ordering::Relaxed)
    }

    pub fn queue_size(&self, signal: SignalKind) -> u64 {
        self.signal(signal).queue_size.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Snapshot {
        let total_received: u64 = SignalKind::ALL.iter().map(|s| self.received(*s)).sum();
        let total_dropped: u64 = SignalKind::ALL.iter().map(|s| self.dropped(*s)).sum();
        let records_produced = self.records_produced.load(Ordering::Relaxed);
        let capacity = self.queue_capacity.load(Ordering::Relaxed);

        let max_queue_utilization_percent = if capacity == 0 {
            0.0
        } else {
            SignalKind::ALL
                .iter()
                .map(|s| 100.0 * self.queue_size(*s) as f64 / capacity as f64)
                .fold(0.0, f64::max)
        };

        let drop_rate = if total_received == 0 {
            0.0
        } else {
            100.0 * total_dropped as f64 / total_received as f64
        };

        Snapshot {
            total_received,
            total_dropped,
            records_produced,
            max_queue_utilization_percent,
            total_lag: total_received as i64 - records_produced as i64,
            drop_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_metrics_avoid_division_by_zero() {
        let reg = MetricsRegistry::new();
        let snap = reg.snapshot();
        assert_eq!(snap.max_queue_utilization_percent, 0.0);
        assert_eq!(snap.drop_rate, 0.0);
    }

    #[test]
    fn snapshot_computes_totals_and_lag() {
        let reg = MetricsRegistry::new();
        reg.set_queue_capacity(100);
        reg.increment_received(SignalKind::Traces);
        reg.increment_received(SignalKind::Traces);
        reg.increment_dropped(SignalKind::Traces);
        reg.update_queue_size(SignalKind::Traces, 50);
        reg.increment_records_produced(1);

        let snap = reg.snapshot();
        assert_eq!(snap.total_received, 2);
        assert_eq!(snap.total_dropped, 1);
        assert_eq!(snap.records_produced, 1);
        assert_eq!(snap.total_lag, 1);
        assert_eq!(snap.drop_rate, 50.0);
        assert_eq!(snap.max_queue_utilization_percent, 50.0);
    }

    #[test]
    fn reset_counters_preserves_gauges() {
        let reg = MetricsRegistry::new();
        reg.set_queue_capacity(100);
        reg.update_queue_size(SignalKind::Logs, 10);
        reg.increment_received(SignalKind::Logs);

        reg.reset_counters();

        assert_eq!(reg.received(SignalKind::Logs), 0);
        assert_eq!(reg.queue_size(SignalKind::Logs), 10);
    }

    #[test]
    fn register_supersedes_prior_registration_without_error() {
        let reg = MetricsRegistry::new();
        reg.register("connector-a");
        reg.register("connector-a");
        reg.unregister();
    }
}
