use crate::chain::types::{ChainError, Confirmation, GroupUpdate, OnchainGroupRecord, TxHandle};

/// Submits batched group roots to the contract.
///
/// Implementations manage the sender account (nonce, gas); only the batch synchronizer holds one.
#[async_trait::async_trait]
pub trait ChainWriter: Send + Sync {
    /// Broadcast one `updateGroups` transaction carrying every record.
    async fn submit_batch(&self, records: &[GroupUpdate]) -> Result<TxHandle, ChainError>;

    /// Wait until the transaction has `confirmations` blocks on top of (and including) its block.
    ///
    /// This may wait indefinitely; callers bound it with a timeout.
    async fn await_confirmation(
        &self,
        tx: &TxHandle,
        confirmations: u64,
    ) -> Result<Confirmation, ChainError>;
}

/// Reads historical contract events.
#[async_trait::async_trait]
pub trait ChainReader: Send + Sync {
    /// All events named `event_name`, ordered by block order.
    async fn query_events(&self, event_name: &str) -> Result<Vec<OnchainGroupRecord>, ChainError>;
}
