//! Progress tracking for group synchronization.
//!
//! `SyncProgressTracker` counts batch outcomes and remembers the last confirmed block, so the
//! service can log a one-line summary on shutdown.

use crate::sync::types::BatchOutcome;

use chrono::{DateTime, Utc};
use tracing::info;

/// Counters for batch cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncProgressTracker {
    batches_confirmed: usize,
    batches_failed: usize,
    cycles_skipped: usize,
    groups_anchored: usize,
    last_confirmed_block: Option<u64>,
    last_confirmed_at: Option<DateTime<Utc>>,
}

impl SyncProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a successful cycle
    pub fn record_outcome(&mut self, outcome: &BatchOutcome) {
        match outcome {
            BatchOutcome::Idle => {}
            BatchOutcome::Skipped => self.cycles_skipped += 1,
            BatchOutcome::Confirmed {
                block_number,
                groups,
                ..
            } => {
                self.batches_confirmed += 1;
                self.groups_anchored += groups;
                self.last_confirmed_block = Some(*block_number);
                self.last_confirmed_at = Some(Utc::now());
            }
        }
    }

    pub fn record_failure(&mut self) {
        self.batches_failed += 1;
    }

    /// Log the current totals
    pub fn log_progress(&self) {
        info!("Sync progress: {}", self.get_stats().summary());
    }

    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            batches_confirmed: self.batches_confirmed,
            batches_failed: self.batches_failed,
            cycles_skipped: self.cycles_skipped,
            groups_anchored: self.groups_anchored,
            last_confirmed_block: self.last_confirmed_block,
            last_confirmed_at: self.last_confirmed_at,
        }
    }
}

/// Statistics about the sync session
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStats {
    pub batches_confirmed: usize,
    pub batches_failed: usize,
    pub cycles_skipped: usize,
    pub groups_anchored: usize,
    pub last_confirmed_block: Option<u64>,
    pub last_confirmed_at: Option<DateTime<Utc>>,
}

impl SyncStats {
    /// Get a human-readable summary of the sync statistics
    pub fn summary(&self) -> String {
        format!(
            "{} batches confirmed ({} group roots), {} failed, {} skipped{}",
            self.batches_confirmed,
            self.groups_anchored,
            self.batches_failed,
            self.cycles_skipped,
            match self.last_confirmed_block {
                Some(block) => format!(", last confirmed in block {}", block),
                None => String::new(),
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;

    #[test]
    fn test_tracker_counts_outcomes() {
        let mut tracker = SyncProgressTracker::new();
        tracker.record_outcome(&BatchOutcome::Idle);
        tracker.record_outcome(&BatchOutcome::Skipped);
        tracker.record_failure();
        tracker.record_outcome(&BatchOutcome::Confirmed {
            tx_hash: B256::ZERO,
            block_number: 42,
            groups: 3,
            cleared: 2,
            still_dirty: 1,
        });

        let stats = tracker.get_stats();
        assert_eq!(stats.batches_confirmed, 1);
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.cycles_skipped, 1);
        assert_eq!(stats.groups_anchored, 3);
        assert_eq!(stats.last_confirmed_block, Some(42));
        assert_eq!(
            stats.summary(),
            "1 batches confirmed (3 group roots), 1 failed, 1 skipped, last confirmed in block 42"
        );
    }
}
