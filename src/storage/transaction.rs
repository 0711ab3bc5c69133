//! Transaction protocol helpers around [`FolderStorage`].

use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use super::params::StorageParameters;
use super::storage::FolderStorage;
use crate::error::FolderResult;

/// Runs `f` inside the storage's transaction.
///
/// Commits on success and rolls back on failure, but only when this call
/// actually started the transaction; an enclosing one stays untouched.
pub fn within<T, F>(
    storage: &dyn FolderStorage,
    params: &mut StorageParameters,
    modify: bool,
    f: F,
) -> FolderResult<T>
where
    F: FnOnce(&mut StorageParameters) -> FolderResult<T>,
{
    let started = storage.start_transaction(params, modify)?;
    match f(params) {
        Ok(value) => {
            if started {
                if let Err(e) = storage.commit_transaction(params) {
                    storage.rollback(params);
                    return Err(e);
                }
            }
            Ok(value)
        }
        Err(e) => {
            if started {
                storage.rollback(params);
            }
            Err(e)
        }
    }
}

/// Storages opened during a multi-storage walk, each exactly once.
#[derive(Default)]
pub struct OpenedStorages {
    visited: HashSet<String>,
    opened: Vec<Arc<dyn FolderStorage>>,
}

impl OpenedStorages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the storage's transaction unless it was already visited.
    pub fn open(
        &mut self,
        storage: &Arc<dyn FolderStorage>,
        params: &mut StorageParameters,
        modify: bool,
    ) -> FolderResult<()> {
        if !self.visited.insert(storage.id().to_string()) {
            return Ok(());
        }
        if storage.start_transaction(params, modify)? {
            self.opened.push(storage.clone());
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.opened.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opened.is_empty()
    }

    /// Commits in opening order; after the first failure the rest is rolled back.
    pub fn commit(self, params: &mut StorageParameters) -> FolderResult<()> {
        let mut pending = self.opened.into_iter();
        while let Some(storage) = pending.next() {
            if let Err(e) = storage.commit_transaction(params) {
                storage.rollback(params);
                for rest in pending {
                    rest.rollback(params);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn rollback(self, params: &mut StorageParameters) {
        for storage in self.opened.into_iter().rev() {
            warn!(
                component = "transaction",
                event = "rollback",
                storage = storage.id(),
                "rolling back storage transaction"
            );
            storage.rollback(params);
        }
    }
}
