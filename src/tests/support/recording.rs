// Storage wrapper that counts calls and injects failures.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{FolderError, FolderResult};
use crate::model::{ContentType, Folder, FolderType, SortableId, StorageType};
use crate::storage::{FolderKind, FolderStorage, MemoryFolderStorage, StorageParameters, StoragePriority};

#[derive(Default)]
pub struct Calls {
    pub starts: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub loads: AtomicUsize,
    pub listings: AtomicUsize,
    pub checks: AtomicUsize,
}

impl Calls {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

/// Wraps a [`MemoryFolderStorage`], recording every transaction step and
/// read so tests can tell cache hits from storage hits.
pub struct RecordingStorage {
    pub inner: Arc<MemoryFolderStorage>,
    pub calls: Calls,
    fail_reads: AtomicBool,
    fail_commit: AtomicBool,
    fail_check: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl RecordingStorage {
    pub fn new(inner: MemoryFolderStorage) -> Self {
        Self {
            inner: Arc::new(inner),
            calls: Calls::default(),
            fail_reads: AtomicBool::new(false),
            fail_commit: AtomicBool::new(false),
            fail_check: AtomicBool::new(false),
            delay: Mutex::new(None),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_check(&self, fail: bool) {
        self.fail_check.store(fail, Ordering::SeqCst);
    }

    /// Slows down every read by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    fn read_step(&self) -> FolderResult<()> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(FolderError::backend(
                self.inner.id(),
                anyhow::anyhow!("injected read failure"),
            ));
        }
        Ok(())
    }
}

impl FolderStorage for RecordingStorage {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn kind(&self) -> &FolderKind {
        self.inner.kind()
    }

    fn content_types(&self) -> &[ContentType] {
        self.inner.content_types()
    }

    fn priority(&self) -> StoragePriority {
        self.inner.priority()
    }

    fn start_transaction(&self, params: &mut StorageParameters, modify: bool) -> FolderResult<bool> {
        let started = self.inner.start_transaction(params, modify)?;
        if started {
            self.calls.starts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(started)
    }

    fn commit_transaction(&self, params: &mut StorageParameters) -> FolderResult<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(FolderError::backend(
                self.inner.id(),
                anyhow::anyhow!("injected commit failure"),
            ));
        }
        self.calls.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit_transaction(params)
    }

    fn rollback(&self, params: &mut StorageParameters) {
        self.calls.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback(params)
    }

    fn get_folder(
        &self,
        tree_id: &str,
        folder_id: &str,
        storage_type: StorageType,
        params: &mut StorageParameters,
    ) -> FolderResult<Folder> {
        self.calls.loads.fetch_add(1, Ordering::SeqCst);
        self.read_step()?;
        self.inner.get_folder(tree_id, folder_id, storage_type, params)
    }

    fn create_folder(&self, folder: &Folder, params: &mut StorageParameters) -> FolderResult<String> {
        self.inner.create_folder(folder, params)
    }

    fn update_folder(&self, folder: &Folder, params: &mut StorageParameters) -> FolderResult<()> {
        self.inner.update_folder(folder, params)
    }

    fn delete_folder(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<()> {
        self.inner.delete_folder(tree_id, folder_id, params)
    }

    fn clear_folder(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<()> {
        self.inner.clear_folder(tree_id, folder_id, params)
    }

    fn restore(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<()> {
        self.inner.restore(tree_id, folder_id, params)
    }

    fn check_consistency(&self, tree_id: &str, params: &mut StorageParameters) -> FolderResult<()> {
        self.calls.checks.fetch_add(1, Ordering::SeqCst);
        if self.fail_check.load(Ordering::SeqCst) {
            return Err(FolderError::backend(
                self.inner.id(),
                anyhow::anyhow!("injected consistency failure"),
            ));
        }
        self.inner.check_consistency(tree_id, params)
    }

    fn get_subfolders(
        &self,
        tree_id: &str,
        parent_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<SortableId>> {
        self.calls.listings.fetch_add(1, Ordering::SeqCst);
        self.read_step()?;
        self.inner.get_subfolders(tree_id, parent_id, params)
    }

    fn get_visible_folders(
        &self,
        tree_id: &str,
        content_type: &ContentType,
        folder_type: FolderType,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<SortableId>> {
        self.inner
            .get_visible_folders(tree_id, content_type, folder_type, params)
    }

    fn get_modified_folder_ids(
        &self,
        tree_id: &str,
        since: DateTime<Utc>,
        content_types: &[ContentType],
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<String>> {
        self.read_step()?;
        self.inner
            .get_modified_folder_ids(tree_id, since, content_types, params)
    }

    fn get_deleted_folder_ids(
        &self,
        tree_id: &str,
        since: DateTime<Utc>,
        params: &mut StorageParameters,
    ) -> FolderResult<Vec<String>> {
        self.inner.get_deleted_folder_ids(tree_id, since, params)
    }

    fn get_default_folder_id(
        &self,
        user_id: i32,
        tree_id: &str,
        content_type: &ContentType,
        folder_type: FolderType,
        params: &mut StorageParameters,
    ) -> FolderResult<String> {
        self.inner
            .get_default_folder_id(user_id, tree_id, content_type, folder_type, params)
    }

    fn contains_folder(
        &self,
        tree_id: &str,
        folder_id: &str,
        storage_type: StorageType,
        params: &mut StorageParameters,
    ) -> FolderResult<bool> {
        self.inner
            .contains_folder(tree_id, folder_id, storage_type, params)
    }

    fn is_empty(&self, tree_id: &str, folder_id: &str, params: &mut StorageParameters) -> FolderResult<bool> {
        self.inner.is_empty(tree_id, folder_id, params)
    }

    fn update_last_modified(
        &self,
        last_modified: DateTime<Utc>,
        tree_id: &str,
        folder_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<()> {
        self.inner
            .update_last_modified(last_modified, tree_id, folder_id, params)
    }

    fn prepare_folder(
        &self,
        tree_id: &str,
        folder: &Folder,
        params: &mut StorageParameters,
    ) -> FolderResult<Folder> {
        self.inner.prepare_folder(tree_id, folder, params)
    }

    fn get_type_by_parent(
        &self,
        user_id: i32,
        tree_id: &str,
        parent_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<FolderType> {
        self.inner
            .get_type_by_parent(user_id, tree_id, parent_id, params)
    }

    fn contains_foreign_objects(
        &self,
        user_id: i32,
        tree_id: &str,
        folder_id: &str,
        params: &mut StorageParameters,
    ) -> FolderResult<bool> {
        self.inner
            .contains_foreign_objects(user_id, tree_id, folder_id, params)
    }
}
