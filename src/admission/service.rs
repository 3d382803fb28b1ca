//! Admission service.
//!
//! Admits identity commitments into groups and answers membership proof requests. Admission
//! returns as soon as the local tree is updated; anchoring the new root on-chain is left to the
//! batch synchronizer, which picks up the group through its dirty flag.

use crate::admission::types::{AdmissionError, AdmissionReceipt, MembershipProof};
use crate::groups::GroupRegistry;
use crate::persistence::CommitmentLogRepository;
use crate::utils::parse_decimal_u256;

use alloy_primitives::U256;
use std::sync::Arc;
use tracing::{debug, info};

pub struct AdmissionService {
    registry: Arc<GroupRegistry>,
    log: Option<Arc<dyn CommitmentLogRepository>>,
}

impl AdmissionService {
    /// Admission without a commitment log; members are lost on restart.
    pub fn new(registry: Arc<GroupRegistry>) -> Self {
        Self {
            registry,
            log: None,
        }
    }

    /// Admission that records every commitment in `log` before inserting it.
    pub fn with_log(registry: Arc<GroupRegistry>, log: Arc<dyn CommitmentLogRepository>) -> Self {
        Self {
            registry,
            log: Some(log),
        }
    }

    /// Add `commitment` (a decimal field element) to the group `(provider, name)`.
    ///
    /// The group is created on first use. The returned root is the group root right after this
    /// insertion.
    pub async fn admit(
        &self,
        provider: &str,
        name: &str,
        commitment: &str,
    ) -> Result<AdmissionReceipt, AdmissionError> {
        let leaf = parse_commitment(commitment)?;
        let group = self.registry.get_or_create(provider, name).await?;
        let insertion = group.insert(leaf, self.log.as_deref()).await?;

        info!(
            "Admitted commitment into {} at index {}",
            group.key(),
            insertion.index
        );

        Ok(AdmissionReceipt {
            root: insertion.root.to_string(),
            index: insertion.index,
            size: insertion.index + 1,
        })
    }

    /// Merkle proof of `commitment` against the current root of its group.
    pub async fn membership_proof(
        &self,
        provider: &str,
        name: &str,
        commitment: &str,
    ) -> Result<MembershipProof, AdmissionError> {
        let leaf = parse_commitment(commitment)?;
        let group = self.registry.get(provider, name).await?;

        let proof = group
            .proof(&leaf)
            .await
            .ok_or(AdmissionError::UnknownCommitment(leaf))?;
        debug!("Built proof for index {} of {}", proof.index, group.key());
        Ok(proof.into())
    }
}

fn parse_commitment(commitment: &str) -> Result<U256, AdmissionError> {
    parse_decimal_u256(commitment.trim())
        .map_err(|e| AdmissionError::InvalidInput(format!("identity commitment: {}", e)))
}
