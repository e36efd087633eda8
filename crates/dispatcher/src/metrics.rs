//! Delivery stats for observability
//!
//! Always maintained by the dispatcher, independent of the injected
//! [`contracts::MetricsSink`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for a single dispatcher
#[derive(Debug, Default)]
pub struct DeliveryStats {
    /// Messages accepted into the queue
    enqueued: AtomicU64,
    /// Messages rejected at enqueue time
    enqueue_failures: AtomicU64,
    /// Messages answered with a 2xx status
    delivered: AtomicU64,
    /// Messages that failed with a status or transport error
    failed: AtomicU64,
    /// Messages dropped while waiting for a rate-limit token
    rate_limited: AtomicU64,
    /// Error reports dropped because no consumer was receiving
    errors_dropped: AtomicU64,
}

impl DeliveryStats {
    /// Create new stats instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn inc_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn enqueue_failures(&self) -> u64 {
        self.enqueue_failures.load(Ordering::Relaxed)
    }

    pub fn inc_enqueue_failures(&self) {
        self.enqueue_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rate_limited(&self) -> u64 {
        self.rate_limited.load(Ordering::Relaxed)
    }

    pub fn inc_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn errors_dropped(&self) -> u64 {
        self.errors_dropped.load(Ordering::Relaxed)
    }

    pub fn inc_errors_dropped(&self) {
        self.errors_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued(),
            enqueue_failures: self.enqueue_failures(),
            delivered: self.delivered(),
            failed: self.failed(),
            rate_limited: self.rate_limited(),
            errors_dropped: self.errors_dropped(),
        }
    }
}

/// Snapshot of delivery stats (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub enqueue_failures: u64,
    pub delivered: u64,
    pub failed: u64,
    pub rate_limited: u64,
    pub errors_dropped: u64,
}

impl StatsSnapshot {
    /// Messages whose delivery attempt resolved, successfully or not
    pub fn resolved(&self) -> u64 {
        self.delivered + self.failed + self.rate_limited
    }

    /// Share of resolved messages that were delivered, in percent
    pub fn success_rate(&self) -> f64 {
        let resolved = self.resolved();
        if resolved > 0 {
            self.delivered as f64 / resolved as f64 * 100.0
        } else {
            0.0
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Delivery Summary ===")?;
        writeln!(f, "Enqueued: {}", self.enqueued)?;
        writeln!(f, "Enqueue failures: {}", self.enqueue_failures)?;
        writeln!(
            f,
            "Delivered: {} ({:.2}%)",
            self.delivered,
            self.success_rate()
        )?;
        writeln!(f, "Failed: {}", self.failed)?;
        writeln!(f, "Rate limited: {}", self.rate_limited)?;
        write!(f, "Error reports dropped: {}", self.errors_dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = DeliveryStats::new();
        stats.inc_enqueued();
        stats.inc_enqueued();
        stats.inc_delivered();
        stats.inc_failed();
        stats.inc_errors_dropped();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.enqueued, 2);
        assert_eq!(snapshot.delivered, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.errors_dropped, 1);
        assert_eq!(snapshot.resolved(), 2);
        assert!((snapshot.success_rate() - 50.0).abs() < 1e-10);
    }

    #[test]
    fn test_summary_display() {
        let snapshot = StatsSnapshot {
            enqueued: 4,
            delivered: 3,
            failed: 1,
            ..Default::default()
        };

        let output = snapshot.to_string();
        assert!(output.contains("Enqueued: 4"));
        assert!(output.contains("75.00%"));
    }
}
