//! The folder storage capability.

use chrono::{DateTime, Utc};

use super::kind::FolderKind;
use super::params::StorageParameters;
use crate::error::FolderResult;
use crate::model::{ContentType, Folder, FolderType, SortableId, StorageType};

/// Registration priority. The registry refuses `Highest`, which is reserved
/// for the cache layer wrapping all other storages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum StoragePriority {
    Low,
    #[default]
    Normal,
    High,
    Highest,
}

/// Trait for folder storage backends.
///
/// Every operation runs inside the storage's own transaction protocol:
/// callers invoke [`start_transaction`](FolderStorage::start_transaction),
/// then either [`commit_transaction`](FolderStorage::commit_transaction) or
/// [`rollback`](FolderStorage::rollback). See [`super::transaction::within`].
pub trait FolderStorage: Send + Sync {
    /// Stable identifier used in logs and transaction bookkeeping.
    fn id(&self) -> &str;

    /// Which trees and folder ids this storage serves.
    fn kind(&self) -> &FolderKind;

    /// Content types claimed by this storage. Empty means general purpose.
    fn content_types(&self) -> &[ContentType] {
        &[]
    }

    fn priority(&self) -> StoragePriority {
        StoragePriority::Normal
    }

    /// Opens a transaction; returns whether a new one was started.
    fn start_transaction(&self, params: &mut StorageParameters, modify: bool) -> FolderResult<bool>;

    fn commit_transaction(&self, params: &mut StorageParameters) -> FolderResult<()>;

    /// Rolls back; never fails, problems are logged by the storage.
    fn rollback(&self, params: &mut StorageParameters);

    fn get_folder(
        &self,
        tree_id: &str,
        folder_id: &str,
        storage_type: StorageType,
        params: &mut StorageParameters,
    ) -> FolderResult<Folder>;

    /// Loads several folders, in request order.
    fn get_folders(
        &self,
        tree_id: &str,
        folder_ids: &[String],
        storage_type: StorageType,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<Folder>> {
        folder_ids
            .iter()
            .map(|id| self.get_folder(tree_id, id, storage_type, params))
            .collect()
    }

    /// Creates the folder and returns the id actually assigned.
    fn create_folder(&self, folder: &Folder, params: &mut StorageParameters) -> FolderResult<String>;

    /// Applies changed attributes; a differing non-empty parent is a move.
    fn update_folder(&self, folder: &Folder, params: &mut StorageParameters) -> FolderResult<()>;

    fn delete_folder(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<()>;

    /// Removes the objects held by a folder, not its subfolders.
    fn clear_folder(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<()>;

    /// Brings a previously deleted folder (and its subtree) back.
    fn restore(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<()>;

    fn check_consistency(&self, tree_id: &str, params: &mut StorageParameters) -> FolderResult<()>;

    fn get_subfolders(
        &self,
        tree_id: &str,
        parent_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<SortableId>>;

    fn get_visible_folders(
        &self,
        tree_id: &str,
        content_type: &ContentType,
        folder_type: FolderType,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<SortableId>>;

    fn get_modified_folder_ids(
        &self,
        tree_id: &str,
        since: DateTime<Utc>,
        content_types: &[ContentType],
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<String>>;

    fn get_deleted_folder_ids(
        &self,
        tree_id: &str,
        since: DateTime<Utc>,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<String>>;

    fn get_default_folder_id(
        &self,
        user_id: i32,
        tree_id: &str,
        content_type: &ContentType,
        folder_type: FolderType,
        params: &mut StorageParameters,
    ) -> FolderResult<String>;

    fn contains_folder(
        &self,
        tree_id: &str,
        folder_id: &str,
        storage_type: StorageType,
        params: &mut StorageParameters,
    ) -> FolderResult<bool>;

    fn is_empty(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<bool>;

    fn update_last_modified(
        &self,
        last_modified: DateTime<Utc>,
        tree_id: &str,
        folder_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<()>;

    /// Personalises a folder for the acting session before it is handed out.
    fn prepare_folder(
        &self,
        _tree_id: &str,
        folder: &Folder,
        _params: &mut StorageParameters,
    ) -> FolderResult<Folder> {
        Ok(folder.clone())
    }

    fn get_type_by_parent(
        &self,
        user_id: i32,
        tree_id: &str,
        parent_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<FolderType>;

    /// Whether the folder holds objects not created by `user_id`.
    fn contains_foreign_objects(
        &self,
        user_id: i32,
        tree_id: &str,
        folder_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<bool>;
}
