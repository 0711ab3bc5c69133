//! In-process folder storage.
//!
//! Keeps folders in a map guarded by a `RwLock`, computes subfolder listings
//! on read and keeps tombstones for restore and the deleted-ids feed. Changes
//! are applied eagerly; a rollback only closes the transaction.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::kind::FolderKind;
use super::params::StorageParameters;
use super::storage::{FolderStorage, StoragePriority};
use crate::error::{FolderError, FolderResult};
use crate::model::{
    ContentType, Folder, FolderType, SortableId, StorageKey, StorageType, ROOT_FOLDER_ID,
};

#[derive(Debug, Clone)]
struct Stored {
    folder: Folder,
    ordinal: i32,
    // creator user id of every object held by the folder
    objects: Vec<i32>,
}

#[derive(Debug)]
struct Tombstone {
    stored: Stored,
    deleted_at: DateTime<Utc>,
    batch: u64,
}

#[derive(Debug, Default)]
struct State {
    folders: HashMap<StorageKey, Stored>,
    deleted: HashMap<StorageKey, Tombstone>,
    next_batch: u64,
}

impl State {
    fn children(&self, tree_id: &str, parent_id: &str) -> Vec<&Stored> {
        let mut children: Vec<&Stored> = self
            .folders
            .values()
            .filter(|s| s.folder.tree_id == tree_id && s.folder.parent_id.as_deref() == Some(parent_id))
            .collect();
        children.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.folder.id.cmp(&b.folder.id)));
        children
    }

    fn sibling_named(&self, tree_id: &str, parent_id: &str, name: &str, except: Option<&str>) -> bool {
        self.folders.values().any(|s| {
            s.folder.tree_id == tree_id
                && s.folder.parent_id.as_deref() == Some(parent_id)
                && s.folder.name == name
                && Some(s.folder.id.as_str()) != except
        })
    }

    /// Whether `candidate` lies in the subtree rooted at `ancestor`.
    fn is_within(&self, tree_id: &str, candidate: &str, ancestor: &str) -> bool {
        let mut current = Some(candidate.to_string());
        let mut steps = 0;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.folders.len() {
                return false;
            }
            current = self
                .folders
                .get(&StorageKey::new(id, tree_id))
                .and_then(|s| s.folder.parent_id.clone());
        }
        false
    }

    /// Pre-order ids of the subtree rooted at `root`, root included.
    fn subtree(&self, tree_id: &str, root: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_string()];
        while let Some(id) = stack.pop() {
            for child in self.children(tree_id, &id).into_iter().rev() {
                stack.push(child.folder.id.clone());
            }
            out.push(id);
        }
        out
    }
}

pub struct MemoryFolderStorage {
    id: String,
    kind: FolderKind,
    content_types: Vec<ContentType>,
    priority: StoragePriority,
    // folders whose listing spans several storages report `None`
    spanning: HashSet<String>,
    state: RwLock<State>,
    next_id: AtomicU64,
}

impl MemoryFolderStorage {
    pub fn new(id: impl Into<String>, kind: FolderKind) -> Self {
        Self {
            id: id.into(),
            kind,
            content_types: Vec::new(),
            priority: StoragePriority::Normal,
            spanning: HashSet::new(),
            state: RwLock::new(State::default()),
            next_id: AtomicU64::new(100),
        }
    }

    pub fn with_content_types(mut self, content_types: Vec<ContentType>) -> Self {
        self.content_types = content_types;
        self
    }

    pub fn with_priority(mut self, priority: StoragePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Marks a folder whose children live in several storages.
    pub fn with_spanning_listing(mut self, folder_id: impl Into<String>) -> Self {
        self.spanning.insert(folder_id.into());
        self
    }

    /// Seeds a folder outside of any transaction.
    pub fn insert(&self, mut folder: Folder) {
        let mut state = self.state.write();
        let ordinal = match folder.parent_id.as_deref() {
            Some(parent) => state.children(&folder.tree_id, parent).len() as i32,
            None => 0,
        };
        if folder.last_modified.is_none() {
            folder.last_modified = Some(Utc::now());
        }
        folder.subfolder_ids = None;
        state.folders.insert(
            folder.key(),
            Stored {
                folder,
                ordinal,
                objects: Vec::new(),
            },
        );
    }

    /// Puts an object created by `user_id` into a folder.
    pub fn add_object(&self, tree_id: &str, folder_id: &str, user_id: i32) -> bool {
        let mut state = self.state.write();
        match state.folders.get_mut(&StorageKey::new(folder_id, tree_id)) {
            Some(stored) => {
                stored.objects.push(user_id);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, tree_id: &str, folder_id: &str) -> bool {
        self.state
            .read()
            .folders
            .contains_key(&StorageKey::new(folder_id, tree_id))
    }

    /// Number of live folders across all trees.
    pub fn len(&self) -> usize {
        self.state.read().folders.len()
    }

    fn require_transaction(&self, params: &StorageParameters, modify: bool) -> FolderResult<()> {
        match params.transaction(&self.id) {
            None => Err(FolderError::backend(
                self.id.as_str(),
                anyhow::anyhow!("operation outside of a transaction"),
            )),
            Some(false) if modify => Err(FolderError::backend(
                self.id.as_str(),
                anyhow::anyhow!("write inside a read-only transaction"),
            )),
            Some(_) => Ok(()),
        }
    }

    fn snapshot(&self, state: &State, stored: &Stored) -> Folder {
        let folder = &stored.folder;
        let listing = if self.spanning.contains(&folder.id) {
            None
        } else {
            Some(
                state
                    .children(&folder.tree_id, &folder.id)
                    .into_iter()
                    .map(|s| s.folder.id.clone())
                    .collect(),
            )
        };
        folder.clone().with_subfolder_ids(listing)
    }

    fn is_local(&self, folder_id: &str) -> bool {
        self.kind.serves_folder_id(folder_id)
    }

    fn assign_id(&self, state: &State, folder: &Folder, parent_id: &str) -> String {
        if let FolderKind::MailAccount { .. } = self.kind {
            return format!("{}/{}", parent_id, folder.name);
        }
        loop {
            let candidate = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
            if !state
                .folders
                .contains_key(&StorageKey::new(candidate.as_str(), folder.tree_id.as_str()))
            {
                return candidate;
            }
        }
    }
}

impl FolderStorage for MemoryFolderStorage {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &FolderKind {
        &self.kind
    }

    fn content_types(&self) -> &[ContentType] {
        &self.content_types
    }

    fn priority(&self) -> StoragePriority {
        self.priority
    }

    fn start_transaction(&self, params: &mut StorageParameters, modify: bool) -> FolderResult<bool> {
        Ok(params.begin_transaction(&self.id, modify))
    }

    fn commit_transaction(&self, params: &mut StorageParameters) -> FolderResult<()> {
        params.end_transaction(&self.id);
        Ok(())
    }

    fn rollback(&self, params: &mut StorageParameters) {
        if let Some(modify) = params.end_transaction(&self.id) {
            debug!(
                component = "memory-storage",
                event = "rollback",
                storage = %self.id,
                modify,
                "transaction rolled back"
            );
        }
    }

    fn get_folder(
        &self,
        tree_id: &str,
        folder_id: &str,
        _storage_type: StorageType,
        params: &mut StorageParameters,
    ) -> FolderResult<Folder> {
        self.require_transaction(params, false)?;
        let state = self.state.read();
        state
            .folders
            .get(&StorageKey::new(folder_id, tree_id))
            .map(|stored| self.snapshot(&state, stored))
            .ok_or_else(|| FolderError::not_found(tree_id, folder_id))
    }

    fn create_folder(&self, folder: &Folder, params: &mut StorageParameters) -> FolderResult<String> {
        self.require_transaction(params, true)?;
        let parent_id = folder
            .parent_id
            .clone()
            .ok_or_else(|| FolderError::InvalidFolder("missing parent folder".to_string()))?;

        let mut state = self.state.write();
        let tree_id = folder.tree_id.as_str();
        if self.is_local(&parent_id)
            && !state
                .folders
                .contains_key(&StorageKey::new(parent_id.as_str(), tree_id))
        {
            return Err(FolderError::not_found(tree_id, parent_id));
        }
        if params.check_duplicates() && state.sibling_named(tree_id, &parent_id, &folder.name, None) {
            return Err(FolderError::InvalidFolder(format!(
                "duplicate folder name {} below {}",
                folder.name, parent_id
            )));
        }

        let id = if folder.id.is_empty() {
            self.assign_id(&state, folder, &parent_id)
        } else {
            folder.id.clone()
        };
        let key = StorageKey::new(id.as_str(), tree_id);
        if state.folders.contains_key(&key) {
            return Err(FolderError::InvalidFolder(format!("folder {} already exists", key)));
        }

        let ordinal = state.children(tree_id, &parent_id).len() as i32;
        let mut created = folder.clone();
        created.id = id.clone();
        created.subfolder_ids = None;
        created.last_modified = Some(Utc::now());
        state.deleted.remove(&key);
        state.folders.insert(
            key,
            Stored {
                folder: created,
                ordinal,
                objects: Vec::new(),
            },
        );
        Ok(id)
    }

    fn update_folder(&self, folder: &Folder, params: &mut StorageParameters) -> FolderResult<()> {
        self.require_transaction(params, true)?;
        let mut state = self.state.write();
        let tree_id = folder.tree_id.as_str();
        let key = folder.key();

        let current = state
            .folders
            .get(&key)
            .map(|s| s.folder.clone())
            .ok_or_else(|| FolderError::not_found(tree_id, folder.id.as_str()))?;

        let new_parent = folder
            .parent_id
            .as_ref()
            .filter(|p| current.parent_id.as_ref() != Some(*p))
            .cloned();

        if let Some(target) = new_parent.as_deref() {
            if state.is_within(tree_id, target, &folder.id) {
                return Err(FolderError::InvalidFolder(format!(
                    "cannot move {} below its own subtree",
                    folder.id
                )));
            }
            if self.is_local(target) && !state.folders.contains_key(&StorageKey::new(target, tree_id)) {
                return Err(FolderError::not_found(tree_id, target));
            }
        }

        let parent_after = new_parent.clone().or_else(|| current.parent_id.clone());
        if params.check_duplicates() && (new_parent.is_some() || folder.name != current.name) {
            if let Some(parent) = parent_after.as_deref() {
                if state.sibling_named(tree_id, parent, &folder.name, Some(&folder.id)) {
                    return Err(FolderError::InvalidFolder(format!(
                        "duplicate folder name {} below {}",
                        folder.name, parent
                    )));
                }
            }
        }

        let ordinal = match (&new_parent, parent_after.as_deref()) {
            (Some(_), Some(parent)) => Some(state.children(tree_id, parent).len() as i32),
            _ => None,
        };

        if let Some(stored) = state.folders.get_mut(&key) {
            let target = &mut stored.folder;
            target.name = folder.name.clone();
            target.parent_id = parent_after;
            target.content_type = folder.content_type.clone();
            target.folder_type = folder.folder_type;
            target.cacheable = folder.cacheable;
            target.global = folder.global;
            target.session_bound = folder.session_bound;
            target.default_folder = folder.default_folder;
            target.owner = folder.owner;
            target.payload = folder.payload.clone();
            target.last_modified = Some(Utc::now());
            if let Some(ordinal) = ordinal {
                stored.ordinal = ordinal;
            }
        }
        Ok(())
    }

    fn delete_folder(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<()> {
        self.require_transaction(params, true)?;
        let mut state = self.state.write();
        if !state.folders.contains_key(&StorageKey::new(folder_id, tree_id)) {
            return Err(FolderError::not_found(tree_id, folder_id));
        }

        state.next_batch += 1;
        let batch = state.next_batch;
        let now = Utc::now();
        for id in state.subtree(tree_id, folder_id) {
            let key = StorageKey::new(id, tree_id);
            if let Some(stored) = state.folders.remove(&key) {
                state.deleted.insert(
                    key,
                    Tombstone {
                        stored,
                        deleted_at: now,
                        batch,
                    },
                );
            }
        }
        Ok(())
    }

    fn clear_folder(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<()> {
        self.require_transaction(params, true)?;
        let mut state = self.state.write();
        let stored = state
            .folders
            .get_mut(&StorageKey::new(folder_id, tree_id))
            .ok_or_else(|| FolderError::not_found(tree_id, folder_id))?;
        stored.objects.clear();
        stored.folder.last_modified = Some(Utc::now());
        Ok(())
    }

    fn restore(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<()> {
        self.require_transaction(params, true)?;
        let mut state = self.state.write();
        let batch = state
            .deleted
            .get(&StorageKey::new(folder_id, tree_id))
            .map(|t| t.batch)
            .ok_or_else(|| FolderError::not_found(tree_id, folder_id))?;

        let keys: Vec<StorageKey> = state
            .deleted
            .iter()
            .filter(|(k, t)| t.batch == batch && k.tree_id == tree_id)
            .map(|(k, _)| k.clone())
            .collect();
        let now = Utc::now();
        for key in keys {
            if let Some(tombstone) = state.deleted.remove(&key) {
                let mut stored = tombstone.stored;
                stored.folder.last_modified = Some(now);
                state.folders.insert(key, stored);
            }
        }
        Ok(())
    }

    fn check_consistency(&self, tree_id: &str, params: &mut StorageParameters) -> FolderResult<()> {
        self.require_transaction(params, false)?;
        let mut state = self.state.write();
        let root_present = state
            .folders
            .contains_key(&StorageKey::new(ROOT_FOLDER_ID, tree_id));

        let orphans: Vec<StorageKey> = state
            .folders
            .iter()
            .filter(|(k, s)| {
                k.tree_id == tree_id
                    && match s.folder.parent_id.as_deref() {
                        Some(parent) => {
                            self.is_local(parent)
                                && !state.folders.contains_key(&StorageKey::new(parent, tree_id))
                        }
                        None => false,
                    }
            })
            .map(|(k, _)| k.clone())
            .collect();

        if orphans.is_empty() || !root_present {
            return Ok(());
        }

        warn!(
            component = "memory-storage",
            event = "orphans_reattached",
            storage = %self.id,
            tree = tree_id,
            count = orphans.len(),
            "re-attaching orphaned folders to the root folder"
        );
        let now = Utc::now();
        for key in orphans {
            if let Some(stored) = state.folders.get_mut(&key) {
                stored.folder.parent_id = Some(ROOT_FOLDER_ID.to_string());
                stored.folder.last_modified = Some(now);
            }
        }
        Ok(())
    }

    fn get_subfolders(
        &self,
        tree_id: &str,
        parent_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<SortableId>> {
        self.require_transaction(params, false)?;
        let state = self.state.read();
        Ok(state
            .children(tree_id, parent_id)
            .into_iter()
            .map(|s| SortableId::new(s.folder.id.as_str(), s.ordinal))
            .collect())
    }

    fn get_visible_folders(
        &self,
        tree_id: &str,
        content_type: &ContentType,
        folder_type: FolderType,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<SortableId>> {
        self.require_transaction(params, false)?;
        let state = self.state.read();
        let mut visible: Vec<&Stored> = state
            .folders
            .values()
            .filter(|s| {
                s.folder.tree_id == tree_id
                    && &s.folder.content_type == content_type
                    && s.folder.folder_type == folder_type
            })
            .collect();
        visible.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.folder.id.cmp(&b.folder.id)));
        Ok(visible
            .into_iter()
            .map(|s| SortableId::new(s.folder.id.as_str(), s.ordinal))
            .collect())
    }

    fn get_modified_folder_ids(
        &self,
        tree_id: &str,
        since: DateTime<Utc>,
        content_types: &[ContentType],
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<String>> {
        self.require_transaction(params, false)?;
        let state = self.state.read();
        let mut ids: Vec<String> = state
            .folders
            .values()
            .filter(|s| {
                s.folder.tree_id == tree_id
                    && s.folder.last_modified.map(|m| m > since).unwrap_or(false)
                    && (content_types.is_empty() || content_types.contains(&s.folder.content_type))
            })
            .map(|s| s.folder.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn get_deleted_folder_ids(
        &self,
        tree_id: &str,
        since: DateTime<Utc>,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<String>> {
        self.require_transaction(params, false)?;
        let state = self.state.read();
        let mut ids: Vec<String> = state
            .deleted
            .iter()
            .filter(|(k, t)| k.tree_id == tree_id && t.deleted_at > since)
            .map(|(k, _)| k.folder_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn get_default_folder_id(
        &self,
        user_id: i32,
        tree_id: &str,
        content_type: &ContentType,
        folder_type: FolderType,
        params: &mut StorageParameters,
    ) -> FolderResult<String> {
        self.require_transaction(params, false)?;
        let state = self.state.read();
        let mut candidates: Vec<&Stored> = state
            .folders
            .values()
            .filter(|s| {
                let f = &s.folder;
                f.tree_id == tree_id
                    && f.default_folder
                    && &f.content_type == content_type
                    && f.folder_type == folder_type
                    && f.owner.map(|o| o.user_id == user_id).unwrap_or(true)
            })
            .collect();
        // Personal defaults win over shared ones.
        candidates.sort_by_key(|s| (s.folder.owner.is_none(), s.folder.id.clone()));
        candidates
            .first()
            .map(|s| s.folder.id.clone())
            .ok_or_else(|| FolderError::not_found(tree_id, format!("default {} folder", content_type)))
    }

    fn contains_folder(
        &self,
        tree_id: &str,
        folder_id: &str,
        _storage_type: StorageType,
        params: &mut StorageParameters,
    ) -> FolderResult<bool> {
        self.require_transaction(params, false)?;
        Ok(self.contains(tree_id, folder_id))
    }

    fn is_empty(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<bool> {
        self.require_transaction(params, false)?;
        let state = self.state.read();
        state
            .folders
            .get(&StorageKey::new(folder_id, tree_id))
            .map(|s| s.objects.is_empty())
            .ok_or_else(|| FolderError::not_found(tree_id, folder_id))
    }

    fn update_last_modified(
        &self,
        last_modified: DateTime<Utc>,
        tree_id: &str,
        folder_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<()> {
        self.require_transaction(params, true)?;
        let mut state = self.state.write();
        let stored = state
            .folders
            .get_mut(&StorageKey::new(folder_id, tree_id))
            .ok_or_else(|| FolderError::not_found(tree_id, folder_id))?;
        stored.folder.last_modified = Some(last_modified);
        Ok(())
    }

    /// Hands back the caller's folder with the listing this storage holds.
    fn prepare_folder(
        &self,
        tree_id: &str,
        folder: &Folder,
        params: &mut StorageParameters,
    ) -> FolderResult<Folder> {
        self.require_transaction(params, false)?;
        let state = self.state.read();
        let stored = state
            .folders
            .get(&StorageKey::new(folder.id.as_str(), tree_id))
            .ok_or_else(|| FolderError::not_found(tree_id, folder.id.as_str()))?;
        let listing = self.snapshot(&state, stored).subfolder_ids;
        Ok(folder.clone().with_subfolder_ids(listing))
    }

    fn get_type_by_parent(
        &self,
        user_id: i32,
        tree_id: &str,
        parent_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<FolderType> {
        self.require_transaction(params, false)?;
        let state = self.state.read();
        let parent = state
            .folders
            .get(&StorageKey::new(parent_id, tree_id))
            .map(|s| &s.folder)
            .ok_or_else(|| FolderError::not_found(tree_id, parent_id))?;
        Ok(match parent.folder_type {
            FolderType::Private => match parent.owner {
                Some(owner) if owner.user_id != user_id => FolderType::Shared,
                _ => FolderType::Private,
            },
            FolderType::System => FolderType::Public,
            other => other,
        })
    }

    fn contains_foreign_objects(
        &self,
        user_id: i32,
        tree_id: &str,
        folder_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<bool> {
        self.require_transaction(params, false)?;
        let state = self.state.read();
        state
            .folders
            .get(&StorageKey::new(folder_id, tree_id))
            .map(|s| s.objects.iter().any(|creator| *creator != user_id))
            .ok_or_else(|| FolderError::not_found(tree_id, folder_id))
    }
}
