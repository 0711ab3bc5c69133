//! Group-keyed cache capability.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::model::{Folder, StorageKey};

/// Key-value cache whose entries are grouped (by context id) so a whole
/// group can be dropped at once.
pub trait GroupCache: Send + Sync {
    fn get(&self, group: i32, key: &StorageKey) -> Option<Arc<Folder>>;

    fn put(&self, group: i32, key: StorageKey, folder: Arc<Folder>);

    /// Returns whether an entry was removed.
    fn remove_from_group(&self, group: i32, key: &StorageKey) -> bool;

    /// Drops every entry of the group, returning how many were removed.
    fn invalidate_group(&self, group: i32) -> usize;

    /// Total number of entries across all groups.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type Group = DashMap<StorageKey, Arc<Folder>>;

/// Process-local [`GroupCache`] with a per-group capacity. When a group is
/// full an arbitrary entry makes room for the new one.
pub struct InMemoryGroupCache {
    groups: DashMap<i32, Group>,
    capacity: usize,
}

impl InMemoryGroupCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn group_len(&self, group: i32) -> usize {
        self.groups.get(&group).map(|g| g.len()).unwrap_or(0)
    }

    fn with_group<R>(&self, group: i32, f: impl FnOnce(&Group) -> R) -> R {
        if let Some(existing) = self.groups.get(&group) {
            return f(existing.value());
        }
        let created = self.groups.entry(group).or_default().downgrade();
        f(created.value())
    }
}

impl GroupCache for InMemoryGroupCache {
    fn get(&self, group: i32, key: &StorageKey) -> Option<Arc<Folder>> {
        self.groups
            .get(&group)?
            .get(key)
            .map(|entry| entry.value().clone())
    }

    fn put(&self, group: i32, key: StorageKey, folder: Arc<Folder>) {
        let capacity = self.capacity;
        self.with_group(group, |entries| {
            while entries.len() >= capacity && !entries.contains_key(&key) {
                // Pick the victim first: removing while iterating deadlocks the shard.
                let victim = entries.iter().next().map(|e| e.key().clone());
                match victim {
                    Some(victim) => {
                        entries.remove(&victim);
                        debug!(
                            component = "group-cache",
                            event = "capacity_eviction",
                            group,
                            key = %victim,
                            "group full, entry evicted"
                        );
                    }
                    None => break,
                }
            }
            entries.insert(key, folder);
        });
    }

    fn remove_from_group(&self, group: i32, key: &StorageKey) -> bool {
        self.groups
            .get(&group)
            .map(|entries| entries.remove(key).is_some())
            .unwrap_or(false)
    }

    fn invalidate_group(&self, group: i32) -> usize {
        self.groups
            .remove(&group)
            .map(|(_, entries)| entries.len())
            .unwrap_or(0)
    }

    fn len(&self) -> usize {
        self.groups.iter().map(|g| g.len()).sum()
    }
}
