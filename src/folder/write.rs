//! Write path: mutate through the owning storage, then evict and re-cache
//! every folder whose snapshot the write made stale.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cache_storage::CacheFolderStorage;
use crate::error::{FolderError, FolderResult};
use crate::model::{Folder, Session, StorageType};
use crate::storage::{within, OpenedStorages, StorageParameters};

impl CacheFolderStorage {
    /// Creates the folder in the storage owning its parent and returns the
    /// id the storage assigned.
    pub fn create_folder(&self, folder: &Folder, params: &mut StorageParameters) -> FolderResult<String> {
        let session = params.session().clone();
        let tree_id = folder.tree_id.as_str();
        let _guard = self.locks.write(&self.scope(tree_id, &session))?;

        let parent_id = folder
            .parent_id
            .clone()
            .ok_or_else(|| FolderError::InvalidFolder(format!("folder {} has no parent", folder.name)))?;
        let storage = self.registry.storage_for(tree_id, &parent_id)?;
        let id = within(storage.as_ref(), params, true, |p| storage.create_folder(folder, p))?;

        self.tiers.evict(&parent_id, tree_id, &session, false);
        self.refresh(&id, tree_id, params);
        self.refresh(&parent_id, tree_id, params);

        info!(
            component = "folder-cache",
            event = "created",
            tree = tree_id,
            folder = %id,
            parent = %parent_id,
            "folder created"
        );
        Ok(id)
    }

    /// Updates (and possibly moves) a folder. Duplicate names are not
    /// checked here; that is up to the caller.
    pub fn update_folder(&self, folder: &Folder, params: &mut StorageParameters) -> FolderResult<()> {
        let session = params.session().clone();
        let tree_id = folder.tree_id.as_str();
        let _guard = self.locks.write(&self.scope(tree_id, &session))?;

        let original = self.load(tree_id, &folder.id, StorageType::Working, params)?;
        let old_parent = original.parent_id.clone();
        let new_parent = folder
            .parent_id
            .clone()
            .filter(|parent| old_parent.as_ref() != Some(parent));

        let storage = self.registry.storage_for(tree_id, &folder.id)?;
        let check_duplicates = params.check_duplicates();
        params.set_check_duplicates(false);
        let updated = within(storage.as_ref(), params, true, |p| storage.update_folder(folder, p));
        params.set_check_duplicates(check_duplicates);
        updated?;

        self.tiers.evict(&folder.id, tree_id, &session, true);
        for parent in old_parent.iter().chain(new_parent.iter()) {
            self.tiers.evict(parent, tree_id, &session, false);
        }

        self.refresh(&folder.id, tree_id, params);
        for parent in old_parent.iter().chain(new_parent.iter()) {
            self.refresh(parent, tree_id, params);
        }

        info!(
            component = "folder-cache",
            event = "updated",
            tree = tree_id,
            folder = %folder.id,
            moved = new_parent.is_some(),
            "folder updated"
        );
        Ok(())
    }

    /// Deletes a folder with its subtree. A folder that is already gone is
    /// not an error.
    pub fn delete_folder(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<()> {
        let session = params.session().clone();
        let _guard = self.locks.write(&self.scope(tree_id, &session))?;

        let storage = self.registry.storage_for(tree_id, folder_id)?;
        let folder = match within(storage.as_ref(), params, false, |p| {
            storage.get_folder(tree_id, folder_id, StorageType::Working, p)
        }) {
            Ok(folder) => folder,
            Err(e) if e.is_not_found() => {
                self.tiers.evict(folder_id, tree_id, &session, false);
                debug!(
                    component = "folder-cache",
                    event = "already_deleted",
                    tree = tree_id,
                    folder = folder_id,
                    "folder already deleted"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let descendants = self.collect_descendants(tree_id, folder_id, params)?;
        within(storage.as_ref(), params, true, |p| storage.delete_folder(tree_id, folder_id, p))?;

        for id in &descendants {
            self.tiers.evict(id, tree_id, &session, false);
        }
        self.tiers.evict(folder_id, tree_id, &session, true);
        if let Some(parent) = folder.parent_id.as_deref() {
            self.tiers.evict(parent, tree_id, &session, false);
            self.refresh(parent, tree_id, params);
        }

        info!(
            component = "folder-cache",
            event = "deleted",
            tree = tree_id,
            folder = folder_id,
            descendants = descendants.len(),
            "folder deleted"
        );
        Ok(())
    }

    /// Empties a folder. Its contents are not folder cache entries.
    pub fn clear_folder(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<()> {
        let session = params.session().clone();
        let _guard = self.locks.write(&self.scope(tree_id, &session))?;
        let storage = self.registry.storage_for(tree_id, folder_id)?;
        within(storage.as_ref(), params, true, |p| storage.clear_folder(tree_id, folder_id, p))
    }

    /// Restores a deleted folder and flushes the acting user's session cache.
    pub fn restore(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<()> {
        let session = params.session().clone();
        let _guard = self.locks.write(&self.scope(tree_id, &session))?;
        let storage = self.registry.storage_for(tree_id, folder_id)?;
        within(storage.as_ref(), params, true, |p| storage.restore(tree_id, folder_id, p))?;

        let flushed = self.tiers.clear_user(session.user_id, session.context_id);
        // The restored folder's parent lists it again.
        match self.reload(tree_id, folder_id, params) {
            Ok(restored) => {
                if let Some(parent) = restored.parent_id.as_deref() {
                    self.tiers.evict(parent, tree_id, &session, false);
                }
            }
            Err(e) => warn!(
                component = "folder-cache",
                event = "restore_reload_failed",
                tree = tree_id,
                folder = folder_id,
                error = %e,
                "restored folder could not be reloaded"
            ),
        }

        info!(
            component = "folder-cache",
            event = "restored",
            tree = tree_id,
            folder = folder_id,
            flushed,
            "folder restored"
        );
        Ok(())
    }

    pub fn update_last_modified(
        &self,
        last_modified: DateTime<Utc>,
        tree_id: &str,
        folder_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<()> {
        let session = params.session().clone();
        let _guard = self.locks.write(&self.scope(tree_id, &session))?;
        let storage = self.registry.storage_for(tree_id, folder_id)?;
        within(storage.as_ref(), params, true, |p| {
            storage.update_last_modified(last_modified, tree_id, folder_id, p)
        })?;

        self.tiers.evict(folder_id, tree_id, &session, false);
        self.refresh(folder_id, tree_id, params);
        Ok(())
    }

    /// Runs the consistency check of every storage of the tree. On the real
    /// tree this also kicks off the account warm-up in the background.
    pub fn check_consistency(&self, tree_id: &str, params: &mut StorageParameters) -> FolderResult<()> {
        let session = params.session().clone();
        let _guard = self.locks.read(&self.scope(tree_id, &session))?;

        let storages = self.registry.resolve_all_for_tree(tree_id);
        if storages.is_empty() {
            return Err(FolderError::NoBackendForTree {
                tree_id: tree_id.to_string(),
            });
        }

        let mut opened = OpenedStorages::new();
        let mut outcome = Ok(());
        for storage in &storages {
            outcome = opened
                .open(storage, params, false)
                .and_then(|_| storage.check_consistency(tree_id, params));
            if outcome.is_err() {
                break;
            }
        }
        match outcome {
            Ok(()) => opened.commit(params)?,
            Err(e) => {
                opened.rollback(params);
                return Err(e);
            }
        }

        debug!(
            component = "folder-cache",
            event = "consistency_checked",
            tree = tree_id,
            storages = storages.len(),
            "consistency check passed"
        );
        if tree_id == self.real_tree_id {
            self.spawn_warmup(session);
        }
        Ok(())
    }

    /// Pre-order ids below `root_id`, each storage opened once for the walk.
    fn collect_descendants(
        &self,
        tree_id: &str,
        root_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<String>> {
        let mut opened = OpenedStorages::new();
        match self.walk(tree_id, root_id, params, &mut opened) {
            Ok(ids) => {
                opened.commit(params)?;
                Ok(ids)
            }
            Err(e) => {
                opened.rollback(params);
                Err(e)
            }
        }
    }

    fn walk(
        &self,
        tree_id: &str,
        root_id: &str,
        params: &mut StorageParameters,
        opened: &mut OpenedStorages,
    ) -> FolderResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut stack = vec![root_id.to_string()];

        while let Some(parent) = stack.pop() {
            if !seen.insert(parent.clone()) {
                continue;
            }
            let mut children = Vec::new();
            for storage in self.registry.resolve_all_for_parent(tree_id, &parent) {
                opened.open(&storage, params, false)?;
                children.extend(storage.get_subfolders(tree_id, &parent, params)?);
            }
            stack.extend(children.into_iter().rev().map(|c| c.id));
            if parent != root_id {
                ids.push(parent);
            }
        }
        Ok(ids)
    }

    /// Loads straight from the owning storage, bypassing the cache.
    pub(super) fn reload(
        &self,
        tree_id: &str,
        folder_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<Folder> {
        let storage = self.registry.storage_for(tree_id, folder_id)?;
        within(storage.as_ref(), params, false, |p| {
            storage.get_folder(tree_id, folder_id, StorageType::Working, p)
        })
    }

    /// Re-caches fresh snapshots of a folder in the real tree and in
    /// `tree_id`. Failures are logged only: the write already succeeded.
    fn refresh(&self, folder_id: &str, tree_id: &str, params: &mut StorageParameters) {
        let session: Session = params.session().clone();
        let mut trees = vec![self.real_tree_id.clone()];
        if tree_id != self.real_tree_id {
            trees.push(tree_id.to_string());
        }

        for tree in trees {
            match self.reload(&tree, folder_id, params) {
                Ok(folder) => {
                    if folder.is_cacheable() {
                        self.tiers.put(Arc::new(folder), &tree, &session, false);
                    }
                }
                Err(e) if e.is_not_found() || matches!(e, FolderError::NoBackendForId { .. }) => {
                    debug!(
                        component = "folder-cache",
                        event = "refresh_skipped",
                        tree = %tree,
                        folder = folder_id,
                        "folder not present in tree"
                    );
                }
                Err(e) => warn!(
                    component = "folder-cache",
                    event = "refresh_failed",
                    tree = %tree,
                    folder = folder_id,
                    error = %e,
                    "could not reload folder after write"
                ),
            }
        }
    }
}
