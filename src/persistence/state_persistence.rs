//! State persistence service for the group registry.
//!
//! This module provides the `StatePersistenceService`, which owns the commitment log and rebuilds
//! the in-memory registry from it on startup. Trees are reconstructed by replaying each group's
//! logged commitments in index order, so restored roots are exactly the roots the groups had
//! before shutdown. When an index was logged more than once the latest record wins: an earlier
//! record at the same index belongs to an admission that failed after its log write.
//! Whether those roots are anchored on-chain is settled afterwards by the event reconciler.

use crate::groups::{GroupError, GroupRegistry};
use crate::persistence::repositories::{CommitmentLogRepository, FileCommitmentLogRepository};
use crate::persistence::types::{CommitmentRecord, PersistenceError, RestoreSummary};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Service for managing the commitment log.
pub struct StatePersistenceService {
    log: Arc<dyn CommitmentLogRepository>,
}

impl StatePersistenceService {
    /// Create a service backed by the file log in `data_dir`.
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            log: Arc::new(FileCommitmentLogRepository::new(data_dir)),
        }
    }

    /// Create a service over an existing repository.
    #[cfg(test)]
    pub fn with_repository(log: Arc<dyn CommitmentLogRepository>) -> Self {
        Self { log }
    }

    /// The log admissions should append to.
    pub fn log(&self) -> Arc<dyn CommitmentLogRepository> {
        self.log.clone()
    }

    /// Replay the commitment log into `registry`.
    pub async fn restore_registry(
        &self,
        registry: &GroupRegistry,
    ) -> Result<RestoreSummary, PersistenceError> {
        let records = self.log.load_all().await?;

        let mut by_group: BTreeMap<(String, String), BTreeMap<u64, CommitmentRecord>> =
            BTreeMap::new();
        for record in records {
            let leaves = by_group
                .entry((record.provider.clone(), record.name.clone()))
                .or_default();
            let index = record.index;
            if let Some(replaced) = leaves.insert(index, record) {
                warn!(
                    "Commitment {} of {}/{} at index {} was logged again; keeping the later record",
                    replaced.commitment, replaced.provider, replaced.name, index
                );
            }
        }

        let mut summary = RestoreSummary::default();
        for ((provider, name), leaves) in &by_group {
            let group = registry
                .get_or_create(provider, name)
                .await
                .map_err(into_persistence_error)?;
            for record in leaves.values() {
                group
                    .restore_leaf(record.leaf()?, record.index)
                    .await
                    .map_err(into_persistence_error)?;
            }
            summary.commitments += leaves.len();
            summary.groups += 1;
        }

        info!(
            "Restored {} commitments into {} groups",
            summary.commitments, summary.groups
        );
        Ok(summary)
    }
}

fn into_persistence_error(err: GroupError) -> PersistenceError {
    match err {
        GroupError::Persistence(inner) => inner,
        other => PersistenceError::Corrupt(other.to_string()),
    }
}
