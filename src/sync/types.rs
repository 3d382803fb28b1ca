use crate::chain::{ChainError, FailureReason, GroupUpdate, TxHandle};
use crate::groups::GroupKey;

use alloy_primitives::{B256, U256};
use backoff::ExponentialBackoff;
use std::time::Duration;

/// Errors raised by the synchronizer and the reconciler
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Batch failed: {0}")]
    BatchFailed(FailureReason),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("On-chain root {onchain_root} of {group} is not a root of the local tree")]
    ReconciliationMismatch { group: GroupKey, onchain_root: U256 },
}

/// Configuration for the batch synchronizer
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Blocks (including the inclusion block) before a batch counts as confirmed
    pub confirmations: u64,
    /// Delay between batch cycles when nothing triggers one earlier
    pub batch_interval: Duration,
    /// Upper bound on waiting for a submitted batch to confirm
    pub confirmation_timeout: Duration,
    pub retry_initial_interval: Duration,
    pub retry_max_interval: Duration,
    pub retry_multiplier: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            confirmations: 1,
            batch_interval: Duration::from_secs(60),
            confirmation_timeout: Duration::from_secs(300),
            retry_initial_interval: Duration::from_secs(5),
            retry_max_interval: Duration::from_secs(300),
            retry_multiplier: 2.0,
        }
    }
}

impl SyncConfig {
    /// Backoff applied between failed batch cycles. It never gives up.
    pub fn retry_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.retry_initial_interval,
            initial_interval: self.retry_initial_interval,
            max_interval: self.retry_max_interval,
            multiplier: self.retry_multiplier,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }
}

/// Lifecycle of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchState {
    /// Snapshotting the roots of dirty groups.
    Collecting,
    Submitted {
        batch: Vec<GroupUpdate>,
        tx: TxHandle,
    },
    Confirmed {
        batch: Vec<GroupUpdate>,
        tx: TxHandle,
        block_number: u64,
    },
    Failed {
        reason: FailureReason,
    },
}

/// Result of one synchronizer cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// No group was dirty.
    Idle,
    /// Another cycle still has a batch in flight.
    Skipped,
    Confirmed {
        tx_hash: B256,
        block_number: u64,
        /// Groups included in the batch.
        groups: usize,
        /// Groups that became clean.
        cleared: usize,
        /// Groups that changed while the batch was in flight.
        still_dirty: usize,
    },
}
