//! Background pre-loading of external mail account folders.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cache_storage::CacheFolderStorage;
use crate::cache::CacheTiers;
use crate::error::{FolderError, FolderResult};
use crate::lock::TreeLockManagement;
use crate::metrics;
use crate::model::{Folder, LockScope, Session, StorageType};
use crate::storage::{within, StorageParameters, StorageRegistry};

/// Loads each account root and its immediate children into the cache.
pub(super) struct WarmupTask {
    real_tree_id: String,
    registry: Arc<StorageRegistry>,
    locks: Arc<TreeLockManagement>,
    tiers: Arc<CacheTiers>,
    session: Session,
    account_roots: Vec<String>,
}

impl WarmupTask {
    /// Returns the number of folders put into the cache.
    pub(super) fn run(self) -> usize {
        let scope = LockScope::for_session(self.real_tree_id.as_str(), &self.session);
        // Puts happen off the request path, so take the scope exclusively.
        let _guard = match self.locks.write(&scope) {
            Ok(guard) => guard,
            Err(e) => {
                warn!(
                    component = "warmup",
                    event = "lock_failed",
                    scope = %scope,
                    error = %e,
                    "warm-up skipped"
                );
                return 0;
            }
        };

        let mut warmed = 0;
        for root in &self.account_roots {
            if self.tiers.contains(&self.real_tree_id, root, &self.session) {
                continue;
            }
            match self.warm_account(root) {
                Ok(count) => warmed += count,
                Err(e) => warn!(
                    component = "warmup",
                    event = "account_failed",
                    account = %root,
                    error = %e,
                    "account warm-up failed"
                ),
            }
        }

        info!(
            component = "warmup",
            event = "finished",
            accounts = self.account_roots.len(),
            warmed,
            "account warm-up finished"
        );
        warmed
    }

    fn warm_account(&self, root_id: &str) -> FolderResult<usize> {
        let tree_id = self.real_tree_id.as_str();
        let storage = self.registry.storage_for(tree_id, root_id)?;
        let mut params = StorageParameters::new(self.session.clone());

        // One storage, loaded on this worker: no nested fan-out.
        let folders: Vec<Folder> = within(storage.as_ref(), &mut params, false, |p| {
            let root = storage.get_folder(tree_id, root_id, StorageType::Working, p)?;
            let children: Vec<String> = storage
                .get_subfolders(tree_id, root_id, p)?
                .into_iter()
                .map(|c| c.id)
                .collect();
            let mut folders = vec![root];
            folders.extend(storage.get_folders(tree_id, &children, StorageType::Working, p)?);
            Ok(folders)
        })?;

        let mut cached = 0;
        for folder in folders.into_iter().filter(|f| f.is_cacheable()) {
            self.tiers.put(Arc::new(folder), tree_id, &self.session, false);
            cached += 1;
        }
        Ok(cached)
    }
}

impl CacheFolderStorage {
    /// Submits the warm-up without waiting for it. A saturated executor
    /// means the warm-up is skipped.
    pub(super) fn spawn_warmup(&self, session: Session) {
        let Some(warmup) = self.warmup.as_ref() else {
            return;
        };
        let account_roots = warmup.account_roots();
        if account_roots.is_empty() {
            return;
        }

        let task = WarmupTask {
            real_tree_id: self.real_tree_id.clone(),
            registry: self.registry.clone(),
            locks: self.locks.clone(),
            tiers: self.tiers.clone(),
            session,
            account_roots,
        };
        match self.executor.try_submit(move || task.run()) {
            Ok(_) => debug!(
                component = "warmup",
                event = "submitted",
                "account warm-up submitted"
            ),
            Err(FolderError::Rejected) => {
                metrics::inc_warmup_rejected();
                debug!(
                    component = "warmup",
                    event = "rejected",
                    "executor saturated, warm-up skipped"
                );
            }
            Err(e) => warn!(
                component = "warmup",
                event = "submit_failed",
                error = %e,
                "warm-up not submitted"
            ),
        }
    }
}
