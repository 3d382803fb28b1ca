//! Types exchanged with the Interep contract.

use crate::groups::GroupKey;
use crate::utils::EncodingError;

use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Name of the event the contract emits for every group root it stores.
pub const GROUP_UPDATED_EVENT: &str = "OffchainGroupUpdated";

/// One entry of a batched `updateGroups` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupUpdate {
    pub provider: String,
    pub name: String,
    pub depth: u8,
    pub root: U256,
}

/// Position of an event in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockOrder {
    pub block_number: u64,
    pub log_index: u64,
}

impl BlockOrder {
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

/// A decoded `OffchainGroupUpdated` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnchainGroupRecord {
    pub key: GroupKey,
    pub root: U256,
    pub depth: u8,
    pub order: BlockOrder,
}

/// Handle of a broadcast transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHandle {
    pub hash: B256,
}

/// Final state of a submitted transaction as seen by the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed { block_number: u64 },
    Failed(FailureReason),
}

/// Why a batch did not get confirmed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("transaction {0} reverted")]
    Reverted(B256),

    #[error("no confirmation within {0:?}")]
    TimedOut(Duration),

    #[error("error while awaiting confirmation: {0}")]
    ConfirmationError(String),
}

/// Error types for chain operations
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Encoding error: {0}")]
    EncodingError(#[from] EncodingError),

    #[error("Event decode error: {0}")]
    DecodeError(String),

    #[error("Unsupported event: {0}")]
    UnsupportedEvent(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),
}
