use crate::merkle::MerkleTreeError;
use crate::persistence::PersistenceError;
use crate::utils::encoding::MAX_BYTES32_STRING_LEN;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a group: the credential provider and the group name within it.
///
/// Both parts are stored on-chain as `bytes32` strings, so they must be non-empty and at most
/// 31 bytes long.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub provider: String,
    pub name: String,
}

impl GroupKey {
    pub fn new(provider: &str, name: &str) -> Result<Self, GroupError> {
        validate_identifier("provider", provider)?;
        validate_identifier("group name", name)?;

        Ok(Self {
            provider: provider.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.name)
    }
}

fn validate_identifier(field: &str, value: &str) -> Result<(), GroupError> {
    if value.is_empty() {
        return Err(GroupError::InvalidInput(format!("{} must not be empty", field)));
    }
    if value.len() > MAX_BYTES32_STRING_LEN {
        return Err(GroupError::InvalidInput(format!(
            "{} '{}' is longer than {} bytes",
            field, value, MAX_BYTES32_STRING_LEN
        )));
    }
    if value.contains('\0') {
        return Err(GroupError::InvalidInput(format!(
            "{} must not contain NUL characters",
            field
        )));
    }
    Ok(())
}

/// Outcome of comparing a group against its latest on-chain record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileStatus {
    /// The on-chain root is the current local root.
    InSync,
    /// The on-chain root is an earlier root of the local tree; newer leaves still need anchoring.
    Behind { onchain_size: u64, local_size: u64 },
    /// The on-chain root was never a root of the local tree.
    Mismatch { local_root: U256, onchain_root: U256 },
    /// The group has members but was never anchored.
    Unanchored { local_size: u64 },
    /// No members and no on-chain record.
    Empty,
}

/// Errors raised by group and registry operations
#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Identity commitment {0} is already a member of the group")]
    DuplicateLeaf(U256),

    #[error("Group is full ({capacity} members)")]
    TreeFull { capacity: u64 },

    #[error("Group {0} not found")]
    NotFound(GroupKey),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl From<MerkleTreeError> for GroupError {
    fn from(err: MerkleTreeError) -> Self {
        match err {
            MerkleTreeError::DuplicateLeaf(leaf) => GroupError::DuplicateLeaf(leaf),
            MerkleTreeError::TreeFull { capacity } => GroupError::TreeFull { capacity },
            MerkleTreeError::InvalidDepth(depth) => {
                GroupError::InvalidInput(format!("invalid tree depth {}", depth))
            }
        }
    }
}
