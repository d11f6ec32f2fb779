use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::debug;

/// Monotonically increasing counter.
struct Counter {
    value: AtomicU64,
}

impl Counter {
    fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }
    fn increment(&self, n: u64) -> u64 {
        self.value.fetch_add(n, Ordering::Relaxed) + n
    }
    fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
    fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time view of the tool-loop counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySummary {
    pub total_iterations: u64,
    pub successful_executions: u64,
    pub repeated_signatures: u64,
    pub repeated_updates: u64,
    pub is_healthy: bool,
}

/// Loop-health counters shared by every run in the process.
///
/// Hand out one instance behind an `Arc`; increments are lock-free.
/// The loop is considered healthy while repeated observations (signatures
/// plus status updates) stay at or below half of all iterations.
pub struct LoopTelemetry {
    iterations: Counter,
    successes: Counter,
    repeated_signatures: Counter,
    repeated_updates: Counter,
}

impl Default for LoopTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopTelemetry {
    pub fn new() -> Self {
        Self {
            iterations: Counter::new(),
            successes: Counter::new(),
            repeated_signatures: Counter::new(),
            repeated_updates: Counter::new(),
        }
    }

    pub fn record_iteration(&self) {
        let total = self.iterations.increment(1);
        debug!(total, "tool loop iteration");
    }

    pub fn record_successes(&self, n: u64) {
        if n > 0 {
            let total = self.successes.increment(n);
            debug!(added = n, total, "successful tool executions");
        }
    }

    pub fn record_repeated_signatures(&self, n: u64) {
        if n > 0 {
            let total = self.repeated_signatures.increment(n);
            debug!(added = n, total, "repeated tool-call signatures");
        }
    }

    pub fn record_repeated_update(&self) {
        let total = self.repeated_updates.increment(1);
        debug!(total, "repeated assistant status update");
    }

    pub fn summary(&self) -> TelemetrySummary {
        let total_iterations = self.iterations.get();
        let repeated_signatures = self.repeated_signatures.get();
        let repeated_updates = self.repeated_updates.get();
        TelemetrySummary {
            total_iterations,
            successful_executions: self.successes.get(),
            repeated_signatures,
            repeated_updates,
            is_healthy: (repeated_signatures + repeated_updates) * 2 <= total_iterations,
        }
    }

    pub fn reset(&self) {
        self.iterations.reset();
        self.successes.reset();
        self.repeated_signatures.reset();
        self.repeated_updates.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fresh_counters_are_healthy() {
        let t = LoopTelemetry::new();
        assert_eq!(
            t.summary(),
            TelemetrySummary {
                is_healthy: true,
                ..Default::default()
            }
        );
    }

    #[test]
    fn counts_accumulate() {
        let t = LoopTelemetry::new();
        for _ in 0..4 {
            t.record_iteration();
        }
        t.record_successes(3);
        t.record_successes(0);
        t.record_repeated_signatures(1);
        t.record_repeated_update();

        let s = t.summary();
        assert_eq!(s.total_iterations, 4);
        assert_eq!(s.successful_executions, 3);
        assert_eq!(s.repeated_signatures, 1);
        assert_eq!(s.repeated_updates, 1);
        assert!(s.is_healthy);
    }

    #[test]
    fn mostly_repeats_is_unhealthy() {
        let t = LoopTelemetry::new();
        t.record_iteration();
        t.record_iteration();
        t.record_repeated_signatures(2);
        t.record_repeated_update();
        assert!(!t.summary().is_healthy);
    }

    #[test]
    fn reset_zeroes_everything() {
        let t = LoopTelemetry::new();
        t.record_iteration();
        t.record_repeated_update();
        t.reset();
        assert_eq!(t.summary().total_iterations, 0);
        assert_eq!(t.summary().repeated_updates, 0);
    }

    #[test]
    fn shared_across_threads() {
        let t = Arc::new(LoopTelemetry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = t.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        t.record_iteration();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(t.summary().total_iterations, 800);
    }

    #[test]
    fn summary_serializes_camel_case() {
        let json = serde_json::to_value(LoopTelemetry::new().summary()).unwrap();
        assert_eq!(json["isHealthy"], true);
        assert_eq!(json["totalIterations"], 0);
    }
}
