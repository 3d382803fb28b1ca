//! A single group and its Merkle tree.
//!
//! All reads and writes of a group's tree go through one async mutex, which serialises
//! concurrent admissions into the same group and the synchronizer's root snapshots. Different
//! groups never contend with each other.

use crate::chain::GroupUpdate;
use crate::groups::types::{GroupError, GroupKey, ReconcileStatus};
use crate::merkle::{IncrementalMerkleTree, Insertion, MerkleProof};
use crate::persistence::{CommitmentLogRepository, CommitmentRecord, PersistenceError};

use alloy_primitives::U256;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub type GroupHandle = Arc<Group>;

#[derive(Debug)]
struct GroupState {
    tree: IncrementalMerkleTree,
    /// The root changed since the last confirmed batch.
    dirty: bool,
    /// Last root known to be anchored on-chain.
    confirmed_root: Option<U256>,
    /// Reason automatic sync is stopped for this group.
    halted: Option<String>,
}

#[derive(Debug)]
pub struct Group {
    key: GroupKey,
    state: Mutex<GroupState>,
}

impl Group {
    pub fn new(key: GroupKey, depth: usize) -> Result<Self, GroupError> {
        Ok(Self {
            key,
            state: Mutex::new(GroupState {
                tree: IncrementalMerkleTree::new(depth)?,
                dirty: false,
                confirmed_root: None,
                halted: None,
            }),
        })
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    /// Insert an identity commitment and mark the group dirty.
    ///
    /// When a log is given the commitment is appended to it before the tree is touched; a failed
    /// append leaves the tree unchanged.
    pub async fn insert(
        &self,
        leaf: U256,
        log: Option<&dyn CommitmentLogRepository>,
    ) -> Result<Insertion, GroupError> {
        let mut state = self.state.lock().await;
        state.tree.ensure_insertable(&leaf)?;

        if let Some(log) = log {
            let record = CommitmentRecord::new(&self.key, leaf, state.tree.size());
            log.append(&record).await?;
        }

        let insertion = state.tree.insert(leaf)?;
        state.dirty = true;

        debug!(
            "Inserted commitment into {} at index {}, new root {}",
            self.key, insertion.index, insertion.root
        );
        Ok(insertion)
    }

    /// Replay a logged commitment, checking it lands at the index it was logged with.
    pub async fn restore_leaf(&self, leaf: U256, index: u64) -> Result<Insertion, GroupError> {
        let mut state = self.state.lock().await;
        let size = state.tree.size();
        if size != index {
            return Err(PersistenceError::Corrupt(format!(
                "commitment {} of {} logged at index {} but group holds {} leaves",
                leaf, self.key, index, size
            ))
            .into());
        }

        let insertion = state.tree.insert(leaf)?;
        state.dirty = true;
        Ok(insertion)
    }

    pub async fn root(&self) -> U256 {
        self.state.lock().await.tree.root()
    }

    pub async fn size(&self) -> u64 {
        self.state.lock().await.tree.size()
    }

    pub async fn is_dirty(&self) -> bool {
        self.state.lock().await.dirty
    }

    #[cfg(test)]
    pub async fn is_halted(&self) -> bool {
        self.state.lock().await.halted.is_some()
    }

    #[cfg(test)]
    pub async fn confirmed_root(&self) -> Option<U256> {
        self.state.lock().await.confirmed_root
    }

    pub async fn proof(&self, leaf: &U256) -> Option<MerkleProof> {
        let state = self.state.lock().await;
        let index = state.tree.index_of(leaf)?;
        state.tree.proof(index)
    }

    /// Snapshot the current root for submission, if the group needs anchoring.
    ///
    /// Halted groups never produce an update. The dirty flag is left untouched.
    pub async fn pending_update(&self) -> Option<GroupUpdate> {
        let state = self.state.lock().await;
        if !state.dirty || state.halted.is_some() {
            return None;
        }

        Some(GroupUpdate {
            provider: self.key.provider.clone(),
            name: self.key.name.clone(),
            depth: state.tree.depth() as u8,
            root: state.tree.root(),
        })
    }

    /// Record that `root` is anchored on-chain.
    ///
    /// Returns true when the group is clean afterwards, i.e. `root` is still the current root.
    pub async fn mark_confirmed(&self, root: U256) -> bool {
        let mut state = self.state.lock().await;
        state.confirmed_root = Some(root);

        if state.tree.root() == root {
            state.dirty = false;
            true
        } else {
            debug!(
                "Group {} changed while its root was being anchored, keeping it dirty",
                self.key
            );
            false
        }
    }

    /// Compare the local tree with the latest on-chain root for this group.
    ///
    /// Only the bookkeeping (dirty flag, confirmed root, halted marker) is updated; the tree is
    /// never modified.
    pub async fn reconcile(&self, onchain_root: Option<U256>) -> ReconcileStatus {
        let mut state = self.state.lock().await;
        let local_root = state.tree.root();
        let local_size = state.tree.size();

        let Some(onchain_root) = onchain_root else {
            if local_size == 0 {
                return ReconcileStatus::Empty;
            }
            state.dirty = true;
            return ReconcileStatus::Unanchored { local_size };
        };

        if onchain_root == local_root {
            state.confirmed_root = Some(onchain_root);
            state.dirty = false;
            state.halted = None;
            return ReconcileStatus::InSync;
        }

        match state.tree.size_for_root(&onchain_root) {
            Some(onchain_size) => {
                state.confirmed_root = Some(onchain_root);
                state.dirty = true;
                state.halted = None;
                ReconcileStatus::Behind {
                    onchain_size,
                    local_size,
                }
            }
            None => {
                error!(
                    "Reconciliation mismatch for {}: on-chain root {} is not a root of the local tree ({} leaves, root {}), halting sync",
                    self.key, onchain_root, local_size, local_root
                );
                state.halted = Some(format!(
                    "on-chain root {} is unknown to the local tree",
                    onchain_root
                ));
                ReconcileStatus::Mismatch {
                    local_root,
                    onchain_root,
                }
            }
        }
    }

    /// Lift a halt after operator intervention. Returns whether the group was halted.
    pub async fn resume(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.halted.take() {
            Some(reason) => {
                warn!("Resuming sync for {} (was halted: {})", self.key, reason);
                state.dirty = true;
                true
            }
            None => {
                info!("Group {} is not halted", self.key);
                false
            }
        }
    }
}
