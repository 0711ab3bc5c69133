//! Read path: cache lookups with storage fallback, listings and feeds.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::cache_storage::CacheFolderStorage;
use crate::error::{FolderError, FolderResult};
use crate::model::{ContentType, Folder, FolderType, SortableId, StorageType};
use crate::storage::{within, FolderStorage, StorageParameters};

impl CacheFolderStorage {
    /// Loads a folder, from cache when possible.
    pub fn get_folder(
        &self,
        tree_id: &str,
        folder_id: &str,
        storage_type: StorageType,
        params: &mut StorageParameters,
    ) -> FolderResult<Arc<Folder>> {
        let session = params.session().clone();
        let _guard = self.locks.read(&self.scope(tree_id, &session))?;
        self.load(tree_id, folder_id, storage_type, params)
    }

    /// Cache first, then the owning storage. Callers hold the scope lock.
    pub(super) fn load(
        &self,
        tree_id: &str,
        folder_id: &str,
        storage_type: StorageType,
        params: &mut StorageParameters,
    ) -> FolderResult<Arc<Folder>> {
        let session = params.session().clone();
        let cached = storage_type == StorageType::Working;
        if cached {
            if let Some(hit) = self.tiers.get_ref(tree_id, folder_id, &session) {
                return Ok(hit);
            }
        }

        let storage = self.registry.storage_for(tree_id, folder_id)?;
        let folder = within(storage.as_ref(), params, false, |p| {
            storage.get_folder(tree_id, folder_id, storage_type, p)
        })?;
        let folder = Arc::new(folder);
        if cached && folder.is_cacheable() {
            self.tiers.put(folder.clone(), tree_id, &session, false);
        }
        Ok(folder)
    }

    /// Bulk load in request order. Misses are grouped by owning storage;
    /// several storages are queried in parallel and any failure fails the
    /// whole call.
    pub fn get_folders(
        &self,
        tree_id: &str,
        folder_ids: &[String],
        storage_type: StorageType,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<Arc<Folder>>> {
        let session = params.session().clone();
        let _guard = self.locks.read(&self.scope(tree_id, &session))?;
        let cached = storage_type == StorageType::Working;

        let mut found: HashMap<String, Arc<Folder>> = HashMap::with_capacity(folder_ids.len());
        let mut groups: Vec<(Arc<dyn FolderStorage>, Vec<String>)> = Vec::new();
        for id in folder_ids {
            if found.contains_key(id) {
                continue;
            }
            if cached {
                if let Some(hit) = self.tiers.get_ref(tree_id, id, &session) {
                    found.insert(id.clone(), hit);
                    continue;
                }
            }
            let storage = self.registry.storage_for(tree_id, id)?;
            match groups.iter_mut().find(|(s, _)| s.id() == storage.id()) {
                Some((_, ids)) => {
                    if !ids.contains(id) {
                        ids.push(id.clone());
                    }
                }
                None => groups.push((storage, vec![id.clone()])),
            }
        }

        if !groups.is_empty() {
            debug!(
                component = "folder-cache",
                event = "bulk_miss",
                tree = tree_id,
                storages = groups.len(),
                hits = found.len(),
                "loading cache misses from storage"
            );
        }

        let requested: Vec<Vec<String>> = groups.iter().map(|(_, ids)| ids.clone()).collect();
        let tree = tree_id.to_string();
        let loaded = self.fan_out(params, groups, move |storage, ids: Vec<String>, p| {
            storage.get_folders(&tree, &ids, storage_type, p)
        })?;

        for (ids, folders) in requested.into_iter().zip(loaded) {
            for (id, folder) in ids.into_iter().zip(folders) {
                let folder = Arc::new(folder);
                if cached && folder.is_cacheable() {
                    self.tiers.put(folder.clone(), tree_id, &session, false);
                }
                found.insert(id, folder);
            }
        }

        folder_ids
            .iter()
            .map(|id| {
                found
                    .get(id)
                    .cloned()
                    .ok_or_else(|| FolderError::not_found(tree_id, id.as_str()))
            })
            .collect()
    }

    /// Subfolders of `parent_id`, from the cached parent's listing when it
    /// has one. Merged listings are never cached themselves.
    pub fn get_subfolders(
        &self,
        tree_id: &str,
        parent_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<SortableId>> {
        let session = params.session().clone();
        let _guard = self.locks.read(&self.scope(tree_id, &session))?;

        if let Some(parent) = self.tiers.get_ref(tree_id, parent_id, &session) {
            if let Some(ids) = &parent.subfolder_ids {
                return Ok(ids
                    .iter()
                    .enumerate()
                    .map(|(ordinal, id)| SortableId::new(id.as_str(), ordinal as i32))
                    .collect());
            }
        }

        let storages = self.registry.resolve_all_for_parent(tree_id, parent_id);
        if storages.is_empty() {
            return Err(FolderError::no_backend(tree_id, parent_id));
        }
        let (tree, parent) = (tree_id.to_string(), parent_id.to_string());
        let jobs = storages.into_iter().map(|s| (s, ())).collect();
        let lists = self.fan_out(params, jobs, move |storage, (), p| {
            storage.get_subfolders(&tree, &parent, p)
        })?;
        Ok(merge_sorted(lists))
    }

    pub fn get_visible_folders(
        &self,
        tree_id: &str,
        content_type: &ContentType,
        folder_type: FolderType,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<SortableId>> {
        let session = params.session().clone();
        let _guard = self.locks.read(&self.scope(tree_id, &session))?;

        let storages = match self.registry.resolve_by_content_type(tree_id, content_type) {
            Some(storage) => vec![storage],
            None => self.registry.resolve_all_for_tree(tree_id),
        };
        if storages.is_empty() {
            return Err(FolderError::NoBackendForTree {
                tree_id: tree_id.to_string(),
            });
        }
        let tree = tree_id.to_string();
        let content_type = content_type.clone();
        let jobs = storages.into_iter().map(|s| (s, ())).collect();
        let lists = self.fan_out(params, jobs, move |storage, (), p| {
            storage.get_visible_folders(&tree, &content_type, folder_type, p)
        })?;
        Ok(merge_sorted(lists))
    }

    pub fn get_modified_folder_ids(
        &self,
        tree_id: &str,
        since: DateTime<Utc>,
        content_types: &[ContentType],
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<String>> {
        let content_types = content_types.to_vec();
        self.collect_ids(tree_id, params, move |storage, tree, p| {
            storage.get_modified_folder_ids(tree, since, &content_types, p)
        })
    }

    pub fn get_deleted_folder_ids(
        &self,
        tree_id: &str,
        since: DateTime<Utc>,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<String>> {
        self.collect_ids(tree_id, params, move |storage, tree, p| {
            storage.get_deleted_folder_ids(tree, since, p)
        })
    }

    /// Change feeds span every storage of the tree and bypass the cache.
    fn collect_ids<F>(&self, tree_id: &str, params: &mut StorageParameters, feed: F) -> FolderResult<Vec<String>>
    where
        F: Fn(&dyn FolderStorage, &str, &mut StorageParameters) -> FolderResult<Vec<String>> + Clone + Send + 'static,
    {
        let session = params.session().clone();
        let _guard = self.locks.read(&self.scope(tree_id, &session))?;

        let storages = self.registry.resolve_all_for_tree(tree_id);
        if storages.is_empty() {
            return Err(FolderError::NoBackendForTree {
                tree_id: tree_id.to_string(),
            });
        }
        let tree = tree_id.to_string();
        let jobs = storages.into_iter().map(|s| (s, ())).collect();
        let lists = self.fan_out(params, jobs, move |storage, (), p| feed(storage, &tree, p))?;

        let mut ids: Vec<String> = lists.into_iter().flatten().collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    pub fn get_default_folder_id(
        &self,
        user_id: i32,
        tree_id: &str,
        content_type: &ContentType,
        folder_type: FolderType,
        params: &mut StorageParameters,
    ) -> FolderResult<String> {
        let session = params.session().clone();
        let _guard = self.locks.read(&self.scope(tree_id, &session))?;
        let storage = self.registry.storage_for_content_type(tree_id, content_type)?;
        within(storage.as_ref(), params, false, |p| {
            storage.get_default_folder_id(user_id, tree_id, content_type, folder_type, p)
        })
    }

    pub fn contains_folder(
        &self,
        tree_id: &str,
        folder_id: &str,
        storage_type: StorageType,
        params: &mut StorageParameters,
    ) -> FolderResult<bool> {
        let session = params.session().clone();
        let _guard = self.locks.read(&self.scope(tree_id, &session))?;
        if storage_type == StorageType::Working && self.tiers.contains(tree_id, folder_id, &session) {
            return Ok(true);
        }
        let storage = self.registry.storage_for(tree_id, folder_id)?;
        within(storage.as_ref(), params, false, |p| {
            storage.contains_folder(tree_id, folder_id, storage_type, p)
        })
    }

    pub fn is_empty(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<bool> {
        let session = params.session().clone();
        let _guard = self.locks.read(&self.scope(tree_id, &session))?;
        let storage = self.registry.storage_for(tree_id, folder_id)?;
        within(storage.as_ref(), params, false, |p| storage.is_empty(tree_id, folder_id, p))
    }

    /// Lets the owning storage personalise the folder. A folder its storage
    /// no longer knows is handed back unchanged.
    pub fn prepare_folder(
        &self,
        tree_id: &str,
        folder: &Folder,
        params: &mut StorageParameters,
    ) -> FolderResult<Folder> {
        let session = params.session().clone();
        let _guard = self.locks.read(&self.scope(tree_id, &session))?;
        let storage = self.registry.storage_for(tree_id, &folder.id)?;
        match within(storage.as_ref(), params, false, |p| storage.prepare_folder(tree_id, folder, p)) {
            Err(e) if e.is_not_found() => Ok(folder.clone()),
            other => other,
        }
    }

    pub fn get_type_by_parent(
        &self,
        user_id: i32,
        tree_id: &str,
        parent_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<FolderType> {
        let session = params.session().clone();
        let _guard = self.locks.read(&self.scope(tree_id, &session))?;
        let storage = self.registry.storage_for(tree_id, parent_id)?;
        within(storage.as_ref(), params, false, |p| {
            storage.get_type_by_parent(user_id, tree_id, parent_id, p)
        })
    }

    pub fn contains_foreign_objects(
        &self,
        user_id: i32,
        tree_id: &str,
        folder_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<bool> {
        let session = params.session().clone();
        let _guard = self.locks.read(&self.scope(tree_id, &session))?;
        let storage = self.registry.storage_for(tree_id, folder_id)?;
        within(storage.as_ref(), params, false, |p| {
            storage.contains_foreign_objects(user_id, tree_id, folder_id, p)
        })
    }
}

/// Concatenates per-storage listings and orders them by ordinal. The sort is
/// stable, so equal ordinals keep storage order; duplicates keep the first.
fn merge_sorted(lists: Vec<Vec<SortableId>>) -> Vec<SortableId> {
    let mut merged: Vec<SortableId> = Vec::new();
    for item in lists.into_iter().flatten() {
        if !merged.iter().any(|m| m.id == item.id) {
            merged.push(item);
        }
    }
    merged.sort_by_key(|s| s.ordinal);
    merged
}
