use crate::groups::GroupError;
use crate::merkle::MerkleProof;
use crate::persistence::PersistenceError;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Result of admitting a commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionReceipt {
    /// New group root, as a decimal string.
    pub root: String,
    pub index: u64,
    pub size: u64,
}

/// A membership proof with field elements rendered as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipProof {
    pub leaf: String,
    pub index: u64,
    pub siblings: Vec<String>,
    pub path_indices: Vec<u8>,
    pub root: String,
}

impl From<MerkleProof> for MembershipProof {
    fn from(proof: MerkleProof) -> Self {
        Self {
            leaf: proof.leaf.to_string(),
            index: proof.index,
            siblings: proof.siblings.iter().map(U256::to_string).collect(),
            path_indices: proof.path_indices,
            root: proof.root.to_string(),
        }
    }
}

/// Errors returned to admission callers
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Identity commitment {0} is already a member of the group")]
    DuplicateLeaf(U256),

    #[error("Group is full ({capacity} members)")]
    TreeFull { capacity: u64 },

    #[error("Group {0} not found")]
    NotFound(String),

    #[error("Identity commitment {0} is not a member of the group")]
    UnknownCommitment(U256),

    #[error("Could not record the commitment: {0}")]
    Persistence(#[from] PersistenceError),
}

impl From<GroupError> for AdmissionError {
    fn from(err: GroupError) -> Self {
        match err {
            GroupError::InvalidInput(message) => AdmissionError::InvalidInput(message),
            GroupError::DuplicateLeaf(leaf) => AdmissionError::DuplicateLeaf(leaf),
            GroupError::TreeFull { capacity } => AdmissionError::TreeFull { capacity },
            GroupError::NotFound(key) => AdmissionError::NotFound(key.to_string()),
            GroupError::Persistence(inner) => AdmissionError::Persistence(inner),
        }
    }
}
