//! Cache and lock addressing keys.

use std::fmt;

use super::session::Session;

/// Cache addressing unit: a folder inside one tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey {
    pub folder_id: String,
    pub tree_id: String,
}

impl StorageKey {
    pub fn new(folder_id: impl Into<String>, tree_id: impl Into<String>) -> Self {
        Self {
            folder_id: folder_id.into(),
            tree_id: tree_id.into(),
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.folder_id, self.tree_id)
    }
}

/// Unit of mutual exclusion for cache mutating sequences.
///
/// A scope without user and context is the tree-wide shared scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockScope {
    pub tree_id: String,
    pub user_id: Option<i32>,
    pub context_id: Option<i32>,
}

impl LockScope {
    pub fn new(tree_id: impl Into<String>, user_id: i32, context_id: i32) -> Self {
        Self {
            tree_id: tree_id.into(),
            user_id: Some(user_id),
            context_id: Some(context_id),
        }
    }

    /// Tree-wide scope used by operations that are not tied to one user.
    pub fn shared(tree_id: impl Into<String>) -> Self {
        Self {
            tree_id: tree_id.into(),
            user_id: None,
            context_id: None,
        }
    }

    pub fn for_session(tree_id: impl Into<String>, session: &Session) -> Self {
        Self::new(tree_id, session.user_id, session.context_id)
    }

    pub fn is_shared(&self) -> bool {
        self.user_id.is_none() && self.context_id.is_none()
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.user_id, self.context_id) {
            (Some(user), Some(ctx)) => write!(f, "tree={} user={} ctx={}", self.tree_id, user, ctx),
            _ => write!(f, "tree={} (shared)", self.tree_id),
        }
    }
}
