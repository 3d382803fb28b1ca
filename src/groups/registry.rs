//! Process-scoped registry of groups.
//!
//! The registry is created empty at startup and shared by reference (`Arc`) with the admission
//! service, the synchronizer, the reconciler and the restore step. Groups are only ever added.

use crate::groups::group::{Group, GroupHandle};
use crate::groups::types::{GroupError, GroupKey};
use crate::merkle::MAX_TREE_DEPTH;

use futures::future::join_all;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

pub struct GroupRegistry {
    depth: usize,
    groups: RwLock<HashMap<GroupKey, GroupHandle>>,
}

impl GroupRegistry {
    /// Create an empty registry whose groups all use trees of `depth`.
    pub fn new(depth: usize) -> Result<Self, GroupError> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(GroupError::InvalidInput(format!(
                "tree depth must be between 1 and {}, got {}",
                MAX_TREE_DEPTH, depth
            )));
        }

        Ok(Self {
            depth,
            groups: RwLock::new(HashMap::new()),
        })
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Return the group for `(provider, name)`, creating an empty one if needed.
    ///
    /// Concurrent callers for the same unseen key all receive the same handle.
    pub async fn get_or_create(&self, provider: &str, name: &str) -> Result<GroupHandle, GroupError> {
        let key = GroupKey::new(provider, name)?;

        if let Some(group) = self.groups.read().await.get(&key) {
            return Ok(group.clone());
        }

        let mut groups = self.groups.write().await;
        match groups.entry(key) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let group = Arc::new(Group::new(entry.key().clone(), self.depth)?);
                info!("Created group {}", entry.key());
                entry.insert(group.clone());
                Ok(group)
            }
        }
    }

    pub async fn get(&self, provider: &str, name: &str) -> Result<GroupHandle, GroupError> {
        let key = GroupKey::new(provider, name)?;
        self.groups
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(GroupError::NotFound(key))
    }

    /// All groups, ordered by key.
    pub async fn groups(&self) -> Vec<GroupHandle> {
        let mut groups: Vec<GroupHandle> = self.groups.read().await.values().cloned().collect();
        groups.sort_by(|a, b| a.key().cmp(b.key()));
        groups
    }

    /// Groups whose root changed since their last confirmed sync, ordered by key.
    pub async fn list_dirty(&self) -> Vec<GroupHandle> {
        let groups = self.groups().await;
        let flags = join_all(groups.iter().map(|group| group.is_dirty())).await;

        groups
            .into_iter()
            .zip(flags)
            .filter_map(|(group, dirty)| dirty.then_some(group))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.groups.read().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.groups.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn test_invalid_depth() {
        assert!(GroupRegistry::new(0).is_err());
        assert!(GroupRegistry::new(33).is_err());
        assert_eq!(GroupRegistry::new(20).unwrap().depth(), 20);
    }

    #[tokio::test]
    async fn test_get_or_create_returns_existing_group() {
        let registry = GroupRegistry::new(4).unwrap();
        assert!(registry.is_empty().await);

        let first = registry.get_or_create("twitter", "gold").await.unwrap();
        let second = registry.get_or_create("twitter", "gold").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = registry.get_or_create("twitter", "silver").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_get_unknown_group() {
        let registry = GroupRegistry::new(4).unwrap();
        assert!(matches!(
            registry.get("github", "gold").await,
            Err(GroupError::NotFound(_))
        ));
        assert!(matches!(
            registry.get("", "gold").await,
            Err(GroupError::InvalidInput(_))
        ));

        registry.get_or_create("github", "gold").await.unwrap();
        assert!(registry.get("github", "gold").await.is_ok());
    }

    #[tokio::test]
    async fn test_get_or_create_rejects_invalid_identifiers() {
        let registry = GroupRegistry::new(4).unwrap();
        assert!(matches!(
            registry.get_or_create("", "gold").await,
            Err(GroupError::InvalidInput(_))
        ));
        assert!(registry.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creation_yields_single_group() {
        let registry = Arc::new(GroupRegistry::new(8).unwrap());

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create("telegram", "chat").await })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }

        assert_eq!(registry.len().await, 1);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
    }

    #[tokio::test]
    async fn test_list_dirty() {
        let registry = GroupRegistry::new(4).unwrap();
        let gold = registry.get_or_create("reddit", "gold").await.unwrap();
        registry.get_or_create("reddit", "silver").await.unwrap();
        assert!(registry.list_dirty().await.is_empty());

        let root = gold.insert(U256::from(1u64), None).await.unwrap().root;
        let dirty = registry.list_dirty().await;
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].key().name, "gold");

        gold.mark_confirmed(root).await;
        assert!(registry.list_dirty().await.is_empty());
    }
}
