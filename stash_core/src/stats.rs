/**
 * Delivery counters.
 *
 * Drops and failed attempts are policy outcomes, not errors, so this is the
 * only place they become visible to the application.
 */
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Stats {
    accepted: AtomicU64,
    dropped_full: AtomicU64,
    dropped_shutdown: AtomicU64,
    delivered: AtomicU64,
    failed_attempts: AtomicU64,
    abandoned: AtomicU64,
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Messages admitted to the queue.
    pub accepted: u64,
    /// Messages rejected because the queue was at capacity.
    pub dropped_full: u64,
    /// Messages rejected because the dispatcher was stopping, stopped or degraded.
    pub dropped_shutdown: u64,
    /// Messages written and flushed to the collector.
    pub delivered: u64,
    /// Write attempts that failed and were retried.
    pub failed_attempts: u64,
    /// Accepted messages given up on during an aborted shutdown.
    pub abandoned: u64,
}

impl StatsSnapshot {
    pub fn dropped(&self) -> u64 {
        self.dropped_full + self.dropped_shutdown
    }
}

impl Stats {
    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_full(&self) {
        self.dropped_full.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_shutdown(&self) {
        self.dropped_shutdown.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_attempt(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abandoned(&self, count: u64) {
        self.abandoned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped_full: self.dropped_full.load(Ordering::Relaxed),
            dropped_shutdown: self.dropped_shutdown.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = Stats::default();
        stats.record_accepted();
        stats.record_accepted();
        stats.record_delivered();
        stats.record_dropped_full();
        stats.record_dropped_shutdown();
        stats.record_dropped_shutdown();
        stats.record_failed_attempt();
        stats.record_abandoned(3);

        let snapshot = stats.snapshot();
        assert_eq!(
            snapshot,
            StatsSnapshot {
                accepted: 2,
                dropped_full: 1,
                dropped_shutdown: 2,
                delivered: 1,
                failed_attempts: 1,
                abandoned: 3,
            }
        );
        assert_eq!(snapshot.dropped(), 3);
    }
}
