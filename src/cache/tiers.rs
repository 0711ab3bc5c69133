//! Glue over the two cache tiers.
//!
//! Global folders live in the group cache (grouped by context id), all other
//! folders in the acting user's session map. A key is never kept in both:
//! every put removes the key from the other tier.

use std::sync::Arc;
use tracing::debug;

use super::group::GroupCache;
use super::session_map::SessionFolderMap;
use crate::metrics::{CacheCounters, CacheStats};
use crate::model::{Folder, Session, StorageKey};

pub struct CacheTiers {
    group: Arc<dyn GroupCache>,
    sessions: SessionFolderMap,
    real_tree_id: String,
    counters: CacheCounters,
}

impl CacheTiers {
    pub fn new(group: Arc<dyn GroupCache>, real_tree_id: impl Into<String>) -> Self {
        Self {
            group,
            sessions: SessionFolderMap::new(),
            real_tree_id: real_tree_id.into(),
            counters: CacheCounters::new(),
        }
    }

    pub fn real_tree_id(&self) -> &str {
        &self.real_tree_id
    }

    /// Cached folder for the session, counted as a hit or a miss.
    pub fn get_ref(&self, tree_id: &str, folder_id: &str, session: &Session) -> Option<Arc<Folder>> {
        let found = self.lookup(tree_id, folder_id, session);
        match found {
            Some(_) => self.counters.hit(),
            None => self.counters.miss(),
        }
        found
    }

    /// Like [`get_ref`](Self::get_ref) but leaves the counters alone.
    pub fn contains(&self, tree_id: &str, folder_id: &str, session: &Session) -> bool {
        self.lookup(tree_id, folder_id, session).is_some()
    }

    fn lookup(&self, tree_id: &str, folder_id: &str, session: &Session) -> Option<Arc<Folder>> {
        let key = StorageKey::new(folder_id, tree_id);
        if let Some(folder) = self.group.get(session.context_id, &key) {
            return Some(folder);
        }
        let folder = self.sessions.get(session, &key)?;
        // A personalised copy is only served to its owner.
        match folder.owner {
            Some(owner) if owner.user_id != session.user_id || owner.context_id != session.context_id => None,
            _ => Some(folder),
        }
    }

    /// Snapshot in either tier, ignoring ownership and session visibility.
    fn peek(&self, key: &StorageKey, session: &Session) -> Option<Arc<Folder>> {
        self.group
            .get(session.context_id, key)
            .or_else(|| self.sessions.peek(session.user_id, session.context_id, key))
    }

    /// Caches `folder` under `tree_id` in the tier its global flag selects.
    ///
    /// With `invalidate_on_replace`, a replaced snapshot whose parent differs
    /// from the new one also evicts the old parent.
    pub fn put(&self, folder: Arc<Folder>, tree_id: &str, session: &Session, invalidate_on_replace: bool) {
        if !folder.is_cacheable() {
            return;
        }
        let folder = if folder.tree_id == tree_id {
            folder
        } else {
            Arc::new(folder.in_tree(tree_id))
        };
        let key = folder.key();

        if invalidate_on_replace {
            let old_parent = self
                .peek(&key, session)
                .and_then(|previous| previous.parent_id.clone())
                .filter(|old| folder.parent_id.as_ref() != Some(old));
            if let Some(old_parent) = old_parent {
                let removed = self.remove_everywhere(&old_parent, tree_id, session, false);
                self.counters.evicted(removed as u64);
            }
        }

        if folder.is_global_id() {
            self.sessions.remove(session.user_id, session.context_id, &key);
            self.group.put(session.context_id, key, folder);
        } else {
            self.group.remove_from_group(session.context_id, &key);
            self.sessions.put(session, folder);
        }
    }

    /// Evicts the folder from both tiers, in `tree_id` and the real tree,
    /// dropping every user's session copy in the context.
    ///
    /// With `cascade_to_parent`, the parent named by the evicted snapshot is
    /// evicted as well, again in both trees. Returns the removed entry count.
    pub fn evict(&self, folder_id: &str, tree_id: &str, session: &Session, cascade_to_parent: bool) -> usize {
        self.evict_in(folder_id, tree_id, session, cascade_to_parent, true)
    }

    /// Like [`evict`](Self::evict) but only touches the acting user's
    /// session map.
    pub fn evict_for_user(&self, folder_id: &str, tree_id: &str, session: &Session, cascade_to_parent: bool) -> usize {
        self.evict_in(folder_id, tree_id, session, cascade_to_parent, false)
    }

    fn evict_in(
        &self,
        folder_id: &str,
        tree_id: &str,
        session: &Session,
        cascade_to_parent: bool,
        context_wide: bool,
    ) -> usize {
        let trees = self.trees_of(tree_id);
        let mut removed = 0;

        for tree in &trees {
            let key = StorageKey::new(folder_id, *tree);
            let parent = if cascade_to_parent {
                self.peek(&key, session).and_then(|f| f.parent_id.clone())
            } else {
                None
            };
            removed += self.remove_key(&key, session, context_wide);
            if let Some(parent) = parent {
                removed += self.remove_everywhere(&parent, tree_id, session, context_wide);
            }
        }

        self.counters.evicted(removed as u64);
        debug!(
            component = "cache",
            event = "evict",
            folder = folder_id,
            tree = tree_id,
            cascade = cascade_to_parent,
            context_wide,
            removed,
            "folder evicted"
        );
        removed
    }

    /// Drops the session map of one user.
    pub fn clear_user(&self, user_id: i32, context_id: i32) -> usize {
        let removed = self.sessions.drop_user(user_id, context_id);
        self.counters.evicted(removed as u64);
        removed
    }

    /// Drops the whole context: its group and every user's session map.
    pub fn clear_context(&self, context_id: i32) -> usize {
        let removed = self.group.invalidate_group(context_id) + self.sessions.drop_context(context_id);
        self.counters.evicted(removed as u64);
        removed
    }

    /// Whether the key sits in the group tier and in the session tier.
    pub fn tiers_holding(&self, tree_id: &str, folder_id: &str, session: &Session) -> (bool, bool) {
        let key = StorageKey::new(folder_id, tree_id);
        (
            self.group.get(session.context_id, &key).is_some(),
            self.sessions
                .peek(session.user_id, session.context_id, &key)
                .is_some(),
        )
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    fn trees_of<'a>(&'a self, tree_id: &'a str) -> Vec<&'a str> {
        if tree_id == self.real_tree_id {
            vec![tree_id]
        } else {
            vec![tree_id, self.real_tree_id.as_str()]
        }
    }

    fn remove_everywhere(&self, folder_id: &str, tree_id: &str, session: &Session, context_wide: bool) -> usize {
        self.trees_of(tree_id)
            .into_iter()
            .map(|tree| self.remove_key(&StorageKey::new(folder_id, tree), session, context_wide))
            .sum()
    }

    fn remove_key(&self, key: &StorageKey, session: &Session, context_wide: bool) -> usize {
        let group = self.group.remove_from_group(session.context_id, key) as usize;
        let users = if context_wide {
            self.sessions.remove_in_context(session.context_id, key)
        } else {
            self.sessions.remove(session.user_id, session.context_id, key) as usize
        };
        group + users
    }
}
