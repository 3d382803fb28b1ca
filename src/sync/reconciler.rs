//! Event reconciler.
//!
//! Compares the latest `OffchainGroupUpdated` record of every group with the local tree. Matching
//! roots settle the group; an on-chain root from the local root history leaves it dirty for the
//! next batch; any other root halts automatic sync for that group.

use crate::chain::{ChainError, ChainReader, GROUP_UPDATED_EVENT, OnchainGroupRecord};
use crate::groups::{GroupKey, GroupRegistry, ReconcileStatus};
use crate::sync::events::{EventDispatcher, SyncEvent};
use crate::sync::types::SyncError;

use backoff::ExponentialBackoff;
use backoff::future::retry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Per-group outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub events: usize,
    pub statuses: BTreeMap<GroupKey, ReconcileStatus>,
}

impl ReconciliationReport {
    #[cfg(test)]
    pub fn status(&self, key: &GroupKey) -> Option<&ReconcileStatus> {
        self.statuses.get(key)
    }

    /// Groups halted by this pass.
    pub fn mismatches(&self) -> impl Iterator<Item = (&GroupKey, &ReconcileStatus)> {
        self.statuses
            .iter()
            .filter(|(_, status)| matches!(status, ReconcileStatus::Mismatch { .. }))
    }

    /// Fail with the first mismatch, if any.
    pub fn ensure_consistent(&self) -> Result<(), SyncError> {
        match self.mismatches().next() {
            Some((group, ReconcileStatus::Mismatch { onchain_root, .. })) => {
                Err(SyncError::ReconciliationMismatch {
                    group: group.clone(),
                    onchain_root: *onchain_root,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Keep only the latest record per group, by block order.
pub fn latest_roots(records: &[OnchainGroupRecord]) -> HashMap<GroupKey, OnchainGroupRecord> {
    let mut latest: HashMap<GroupKey, OnchainGroupRecord> = HashMap::new();
    for record in records {
        match latest.get(&record.key) {
            Some(current) if current.order >= record.order => {}
            _ => {
                latest.insert(record.key.clone(), record.clone());
            }
        }
    }
    latest
}

/// How long transient event query failures are retried before a pass gives up.
const EVENT_QUERY_MAX_ELAPSED: Duration = Duration::from_secs(120);

pub struct EventReconciler {
    registry: Arc<GroupRegistry>,
    reader: Arc<dyn ChainReader>,
    dispatcher: Arc<EventDispatcher>,
}

impl EventReconciler {
    pub fn new(registry: Arc<GroupRegistry>, reader: Arc<dyn ChainReader>) -> Self {
        Self {
            registry,
            reader,
            dispatcher: Arc::new(EventDispatcher::new()),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<EventDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Reconcile every local group, and every group seen on-chain, against its latest event.
    ///
    /// Groups that only exist on-chain are created empty, which reports them as mismatched unless
    /// their on-chain root is the empty root.
    pub async fn reconcile(&self) -> Result<ReconciliationReport, SyncError> {
        let records = self.fetch_records().await?;
        let latest = latest_roots(&records);

        for key in latest.keys() {
            if self.registry.get(&key.provider, &key.name).await.is_err() {
                warn!("Group {} exists on-chain but not locally", key);
                if let Err(e) = self.registry.get_or_create(&key.provider, &key.name).await {
                    warn!("Could not create group {}: {}", key, e);
                }
            }
        }

        let mut report = ReconciliationReport {
            events: records.len(),
            statuses: BTreeMap::new(),
        };

        for group in self.registry.groups().await {
            let onchain_root = latest.get(group.key()).map(|record| record.root);
            let status = group.reconcile(onchain_root).await;

            self.dispatcher
                .dispatch(&SyncEvent::GroupReconciled {
                    group: group.key().clone(),
                    status: status.clone(),
                })
                .await;
            report.statuses.insert(group.key().clone(), status);
        }

        info!(
            "Reconciled {} groups against {} events ({} mismatched)",
            report.statuses.len(),
            report.events,
            report.mismatches().count()
        );
        Ok(report)
    }

    async fn fetch_records(&self) -> Result<Vec<OnchainGroupRecord>, SyncError> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(EVENT_QUERY_MAX_ELAPSED),
            ..ExponentialBackoff::default()
        };

        let records = retry(policy, || async {
            self.reader
                .query_events(GROUP_UPDATED_EVENT)
                .await
                .map_err(|e| match e {
                    ChainError::RpcError(_) => {
                        warn!("Event query failed, retrying: {}", e);
                        backoff::Error::transient(e)
                    }
                    other => backoff::Error::permanent(other),
                })
        })
        .await?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::BlockOrder;
    use crate::chain::mock::MockChain;
    use crate::merkle::IncrementalMerkleTree;
    use alloy_primitives::U256;

    fn record(provider: &str, name: &str, root: u64, block: u64) -> OnchainGroupRecord {
        OnchainGroupRecord {
            key: GroupKey::new(provider, name).unwrap(),
            root: U256::from(root),
            depth: 20,
            order: BlockOrder::new(block, 0),
        }
    }

    fn setup() -> (Arc<GroupRegistry>, Arc<MockChain>, EventReconciler) {
        let registry = Arc::new(GroupRegistry::new(4).unwrap());
        let chain = Arc::new(MockChain::new());
        let reconciler = EventReconciler::new(registry.clone(), chain.clone());
        (registry, chain, reconciler)
    }

    #[test]
    fn test_latest_roots_keeps_highest_order() {
        let records = vec![
            record("twitter", "gold", 2, 5),
            record("twitter", "gold", 1, 1),
            record("github", "silver", 7, 3),
        ];
        let latest = latest_roots(&records);
        assert_eq!(latest.len(), 2);
        assert_eq!(
            latest[&GroupKey::new("twitter", "gold").unwrap()].root,
            U256::from(2u64)
        );

        let mut same_block = vec![record("twitter", "gold", 1, 4), record("twitter", "gold", 2, 4)];
        same_block[0].order.log_index = 3;
        same_block[1].order.log_index = 1;
        let latest = latest_roots(&same_block);
        assert_eq!(
            latest[&GroupKey::new("twitter", "gold").unwrap()].root,
            U256::from(1u64)
        );
    }

    #[tokio::test]
    async fn test_latest_event_wins() {
        let (registry, chain, reconciler) = setup();
        let group = registry.get_or_create("twitter", "gold").await.unwrap();
        let r1 = group.insert(U256::from(11u64), None).await.unwrap().root;
        let r2 = group.insert(U256::from(12u64), None).await.unwrap().root;

        chain.push_event("twitter", "gold", r2, BlockOrder::new(5, 0));
        chain.push_event("twitter", "gold", r1, BlockOrder::new(1, 0));

        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report.events, 2);
        assert_eq!(
            report.status(group.key()),
            Some(&ReconcileStatus::InSync)
        );
        assert!(!group.is_dirty().await);
        assert_eq!(group.confirmed_root().await, Some(r2));
        assert!(report.ensure_consistent().is_ok());
    }

    #[tokio::test]
    async fn test_behind_and_unanchored_stay_dirty() {
        let (registry, chain, reconciler) = setup();
        let gold = registry.get_or_create("twitter", "gold").await.unwrap();
        let r1 = gold.insert(U256::from(1u64), None).await.unwrap().root;
        gold.insert(U256::from(2u64), None).await.unwrap();
        let silver = registry.get_or_create("github", "silver").await.unwrap();
        silver.insert(U256::from(3u64), None).await.unwrap();
        registry.get_or_create("reddit", "bronze").await.unwrap();

        chain.push_event("twitter", "gold", r1, BlockOrder::new(2, 0));

        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(
            report.status(gold.key()),
            Some(&ReconcileStatus::Behind {
                onchain_size: 1,
                local_size: 2
            })
        );
        assert_eq!(
            report.status(silver.key()),
            Some(&ReconcileStatus::Unanchored { local_size: 1 })
        );
        assert_eq!(
            report.status(&GroupKey::new("reddit", "bronze").unwrap()),
            Some(&ReconcileStatus::Empty)
        );
        assert!(gold.is_dirty().await);
        assert!(silver.is_dirty().await);
    }

    #[tokio::test]
    async fn test_mismatch_halts_group_without_touching_tree() {
        let (registry, chain, reconciler) = setup();
        let gold = registry.get_or_create("twitter", "gold").await.unwrap();
        let local = gold.insert(U256::from(1u64), None).await.unwrap().root;

        let foreign = IncrementalMerkleTree::from_leaves(4, [U256::from(9u64)])
            .unwrap()
            .root();
        chain.push_event("twitter", "gold", foreign, BlockOrder::new(3, 1));

        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report.mismatches().count(), 1);
        assert!(matches!(
            report.ensure_consistent(),
            Err(SyncError::ReconciliationMismatch { onchain_root, .. }) if onchain_root == foreign
        ));
        assert!(gold.is_halted().await);
        assert_eq!(gold.root().await, local);
        assert!(gold.pending_update().await.is_none());
    }

    #[tokio::test]
    async fn test_onchain_only_group_is_created() {
        let (registry, chain, reconciler) = setup();
        chain.push_event("telegram", "chat", U256::from(77u64), BlockOrder::new(1, 0));

        let report = reconciler.reconcile().await.unwrap();
        let key = GroupKey::new("telegram", "chat").unwrap();
        assert!(matches!(
            report.status(&key),
            Some(ReconcileStatus::Mismatch { .. })
        ));
        assert_eq!(registry.len().await, 1);
    }
}
