//! The caching folder storage.
//!
//! [`CacheFolderStorage`] wraps every registered backend behind the
//! [`FolderStorage`] capability. Each public operation follows the same
//! sequence: acquire the scope lock, try the cache tiers, fall back to the
//! owning backend inside its transaction, then evict and re-cache whatever
//! the operation touched before the lock is released.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::cache::{CacheTiers, GroupCache};
use crate::config::{Config, ConfigTrait, Warmup};
use crate::error::FolderResult;
use crate::executor::{BoundedExecutor, CompletionService};
use crate::lock::TreeLockManagement;
use crate::metrics::CacheStats;
use crate::model::{ContentType, Folder, FolderType, LockScope, Session, SortableId, StorageType};
use crate::storage::{within, FolderKind, FolderStorage, StorageParameters, StoragePriority, StorageRegistry};

pub const CACHE_STORAGE_ID: &str = "folder-cache";

pub struct CacheFolderStorage {
    pub(super) real_tree_id: String,
    pub(super) registry: Arc<StorageRegistry>,
    pub(super) locks: Arc<TreeLockManagement>,
    pub(super) tiers: Arc<CacheTiers>,
    pub(super) executor: Arc<BoundedExecutor>,
    pub(super) warmup: Option<Warmup>,
    kind: FolderKind,
}

impl CacheFolderStorage {
    pub fn new(
        cfg: &Config,
        registry: Arc<StorageRegistry>,
        group_cache: Arc<dyn GroupCache>,
        executor: Arc<BoundedExecutor>,
    ) -> Self {
        let real_tree_id = cfg.real_tree_id().to_string();
        Self {
            tiers: Arc::new(CacheTiers::new(group_cache, real_tree_id.as_str())),
            locks: Arc::new(TreeLockManagement::from_config(cfg)),
            warmup: cfg.warmup().cloned(),
            real_tree_id,
            registry,
            executor,
            kind: FolderKind::Any,
        }
    }

    /// Shares a lock registry with other components.
    pub fn with_locks(mut self, locks: Arc<TreeLockManagement>) -> Self {
        self.locks = locks;
        self
    }

    pub fn real_tree_id(&self) -> &str {
        &self.real_tree_id
    }

    pub fn registry(&self) -> &Arc<StorageRegistry> {
        &self.registry
    }

    pub fn locks(&self) -> &Arc<TreeLockManagement> {
        &self.locks
    }

    pub fn tiers(&self) -> &Arc<CacheTiers> {
        &self.tiers
    }

    pub fn stats(&self) -> CacheStats {
        self.tiers.stats()
    }

    pub(super) fn scope(&self, tree_id: &str, session: &Session) -> LockScope {
        LockScope::for_session(tree_id, session)
    }

    /// Drops cached folders of one user, or of the whole context when no
    /// user is given.
    pub fn clear_cache(&self, user_id: Option<i32>, context_id: i32) -> FolderResult<usize> {
        let _guard = self.locks.write(&LockScope::shared(self.real_tree_id.as_str()))?;
        let removed = match user_id {
            Some(user_id) => self.tiers.clear_user(user_id, context_id),
            None => self.tiers.clear_context(context_id),
        };
        let purged = self.locks.purge_idle();
        info!(
            component = "folder-cache",
            event = "cache_cleared",
            user = ?user_id,
            context = context_id,
            removed,
            purged_locks = purged,
            "folder cache cleared"
        );
        Ok(removed)
    }

    /// Evicts the given folders; unless `single_only`, their parents go too.
    pub fn remove_from_cache(
        &self,
        folder_ids: &[String],
        tree_id: &str,
        single_only: bool,
        session: &Session,
    ) -> FolderResult<usize> {
        let _guard = self.locks.write(&self.scope(tree_id, session))?;
        Ok(folder_ids
            .iter()
            .map(|id| self.tiers.evict_for_user(id, tree_id, session, !single_only))
            .sum())
    }

    /// Runs `job` against each storage inside its own read transaction.
    ///
    /// A single storage runs on the calling thread with `params`; several
    /// storages run on the executor, each with detached parameters, and the
    /// first failure aborts the whole call. Results keep the input order.
    pub(super) fn fan_out<J, T, F>(
        &self,
        params: &mut StorageParameters,
        jobs: Vec<(Arc<dyn FolderStorage>, J)>,
        job: F,
    ) -> FolderResult<Vec<T>>
    where
        J: Send + 'static,
        T: Send + 'static,
        F: Fn(&dyn FolderStorage, J, &mut StorageParameters) -> FolderResult<T> + Clone + Send + 'static,
    {
        if jobs.len() <= 1 {
            return jobs
                .into_iter()
                .map(|(storage, input)| {
                    within(storage.as_ref(), params, false, |p| job(storage.as_ref(), input, p))
                })
                .collect();
        }

        let mut service = CompletionService::new(&self.executor);
        for (storage, input) in jobs {
            let mut detached = params.detached();
            let job = job.clone();
            service.submit(move || {
                within(storage.as_ref(), &mut detached, false, |p| {
                    job(storage.as_ref(), input, p)
                })
            })?;
        }
        service.collect_all()
    }
}

impl FolderStorage for CacheFolderStorage {
    fn id(&self) -> &str {
        CACHE_STORAGE_ID
    }

    fn kind(&self) -> &FolderKind {
        &self.kind
    }

    fn priority(&self) -> StoragePriority {
        StoragePriority::Highest
    }

    // Backends run their own transactions; the cache has none.
    fn start_transaction(&self, _params: &mut StorageParameters, _modify: bool) -> FolderResult<bool> {
        Ok(false)
    }

    fn commit_transaction(&self, _params: &mut StorageParameters) -> FolderResult<()> {
        Ok(())
    }

    fn rollback(&self, _params: &mut StorageParameters) {}

    fn get_folder(
        &self,
        tree_id: &str,
        folder_id: &str,
        storage_type: StorageType,
        params: &mut StorageParameters,
    ) -> FolderResult<Folder> {
        let folder = Self::get_folder(self, tree_id, folder_id, storage_type, params)?;
        Ok(Folder::clone(&folder))
    }

    fn get_folders(
        &self,
        tree_id: &str,
        folder_ids: &[String],
        storage_type: StorageType,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<Folder>> {
        let folders = Self::get_folders(self, tree_id, folder_ids, storage_type, params)?;
        Ok(folders.iter().map(|f| Folder::clone(f)).collect())
    }

    fn create_folder(&self, folder: &Folder, params: &mut StorageParameters) -> FolderResult<String> {
        Self::create_folder(self, folder, params)
    }

    fn update_folder(&self, folder: &Folder, params: &mut StorageParameters) -> FolderResult<()> {
        Self::update_folder(self, folder, params)
    }

    fn delete_folder(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<()> {
        Self::delete_folder(self, tree_id, folder_id, params)
    }

    fn clear_folder(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<()> {
        Self::clear_folder(self, tree_id, folder_id, params)
    }

    fn restore(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<()> {
        Self::restore(self, tree_id, folder_id, params)
    }

    fn check_consistency(&self, tree_id: &str, params: &mut StorageParameters) -> FolderResult<()> {
        Self::check_consistency(self, tree_id, params)
    }

    fn get_subfolders(
        &self,
        tree_id: &str,
        parent_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<SortableId>> {
        Self::get_subfolders(self, tree_id, parent_id, params)
    }

    fn get_visible_folders(
        &self,
        tree_id: &str,
        content_type: &ContentType,
        folder_type: FolderType,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<SortableId>> {
        Self::get_visible_folders(self, tree_id, content_type, folder_type, params)
    }

    fn get_modified_folder_ids(
        &self,
        tree_id: &str,
        since: DateTime<Utc>,
        content_types: &[ContentType],
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<String>> {
        Self::get_modified_folder_ids(self, tree_id, since, content_types, params)
    }

    fn get_deleted_folder_ids(
        &self,
        tree_id: &str,
        since: DateTime<Utc>,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<String>> {
        Self::get_deleted_folder_ids(self, tree_id, since, params)
    }

    fn get_default_folder_id(
        &self,
        user_id: i32,
        tree_id: &str,
        content_type: &ContentType,
        folder_type: FolderType,
        params: &mut StorageParameters,
    ) -> FolderResult<String> {
        Self::get_default_folder_id(self, user_id, tree_id, content_type, folder_type, params)
    }

    fn contains_folder(
        &self,
        tree_id: &str,
        folder_id: &str,
        storage_type: StorageType,
        params: &mut StorageParameters,
    ) -> FolderResult<bool> {
        Self::contains_folder(self, tree_id, folder_id, storage_type, params)
    }

    fn is_empty(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<bool> {
        Self::is_empty(self, tree_id, folder_id, params)
    }

    fn update_last_modified(
        &self,
        last_modified: DateTime<Utc>,
        tree_id: &str,
        folder_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<()> {
        Self::update_last_modified(self, last_modified, tree_id, folder_id, params)
    }

    fn prepare_folder(
        &self,
        tree_id: &str,
        folder: &Folder,
        params: &mut StorageParameters,
    ) -> FolderResult<Folder> {
        Self::prepare_folder(self, tree_id, folder, params)
    }

    fn get_type_by_parent(
        &self,
        user_id: i32,
        tree_id: &str,
        parent_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<FolderType> {
        Self::get_type_by_parent(self, user_id, tree_id, parent_id, params)
    }

    fn contains_foreign_objects(
        &self,
        user_id: i32,
        tree_id: &str,
        folder_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<bool> {
        Self::contains_foreign_objects(self, user_id, tree_id, folder_id, params)
    }
}
