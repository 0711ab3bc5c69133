//! Folder snapshots.
//!
//! A [`Folder`] is an immutable value from the cache's point of view: the
//! cache hands out `Arc<Folder>` and every write produces a new snapshot that
//! replaces the cached one. Builders below return modified copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::keys::StorageKey;
use super::kinds::{ContentType, FolderType};

/// Explicit owner of a personalised folder copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub user_id: i32,
    pub context_id: i32,
}

impl Owner {
    pub fn new(user_id: i32, context_id: i32) -> Self {
        Self {
            user_id,
            context_id,
        }
    }
}

/// Folder snapshot as loaded from its owning storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub tree_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub content_type: ContentType,
    pub folder_type: FolderType,
    /// `None` means the listing is unknown and must be resolved from storage.
    pub subfolder_ids: Option<Vec<String>>,
    pub cacheable: bool,
    /// Shareable across the whole context (group tier) rather than per user.
    pub global: bool,
    /// Only visible to the session that loaded it.
    pub session_bound: bool,
    pub default_folder: bool,
    pub owner: Option<Owner>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Storage specific data the cache carries around untouched.
    pub payload: Option<serde_json::Value>,
}

impl Folder {
    /// Creates a cacheable, global folder with a system content type.
    pub fn new(id: impl Into<String>, tree_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            tree_id: tree_id.into(),
            parent_id: None,
            content_type: ContentType::system(),
            folder_type: FolderType::System,
            subfolder_ids: None,
            cacheable: true,
            global: true,
            session_bound: false,
            default_folder: false,
            owner: None,
            last_modified: None,
            payload: None,
        }
    }

    /// Cache address of this snapshot inside its own tree.
    pub fn key(&self) -> StorageKey {
        StorageKey::new(self.id.as_str(), self.tree_id.as_str())
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    pub fn is_global_id(&self) -> bool {
        self.global
    }

    pub fn has_subfolders(&self) -> bool {
        self.subfolder_ids
            .as_ref()
            .map(|ids| !ids.is_empty())
            .unwrap_or(false)
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_folder_type(mut self, folder_type: FolderType) -> Self {
        self.folder_type = folder_type;
        self
    }

    pub fn with_subfolder_ids(mut self, ids: Option<Vec<String>>) -> Self {
        self.subfolder_ids = ids;
        self
    }

    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Marks the folder as user scoped (session tier).
    pub fn user_scoped(mut self) -> Self {
        self.global = false;
        self
    }

    pub fn session_bound(mut self) -> Self {
        self.global = false;
        self.session_bound = true;
        self
    }

    pub fn uncacheable(mut self) -> Self {
        self.cacheable = false;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.default_folder = true;
        self
    }

    /// Copy of this snapshot addressed in another tree.
    pub fn in_tree(&self, tree_id: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.tree_id = tree_id.into();
        copy
    }
}
