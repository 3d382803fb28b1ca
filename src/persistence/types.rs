use crate::groups::GroupKey;
use crate::utils::parse_decimal_u256;

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One admitted identity commitment, as written to the commitment log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentRecord {
    pub provider: String,
    pub name: String,
    /// Decimal string of the commitment.
    pub commitment: String,
    /// Leaf index the commitment was inserted at.
    pub index: u64,
    pub recorded_at: DateTime<Utc>,
}

impl CommitmentRecord {
    pub fn new(key: &GroupKey, commitment: U256, index: u64) -> Self {
        Self {
            provider: key.provider.clone(),
            name: key.name.clone(),
            commitment: commitment.to_string(),
            index,
            recorded_at: Utc::now(),
        }
    }

    pub fn leaf(&self) -> Result<U256, PersistenceError> {
        parse_decimal_u256(&self.commitment).map_err(|e| {
            PersistenceError::Corrupt(format!(
                "invalid commitment in log for {}/{}: {}",
                self.provider, self.name, e
            ))
        })
    }
}

/// Summary of a registry restore
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub commitments: usize,
    pub groups: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Corrupt commitment log: {0}")]
    Corrupt(String),
}
