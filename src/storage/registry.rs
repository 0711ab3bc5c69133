//! Storage registry: which backend owns a (tree, folder) or (tree, content type).
//!
//! Lookups read an immutable snapshot through `ArcSwap` and never block;
//! registration copies the snapshot under a writer mutex and swaps it in.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::content_type::ContentTypeRegistry;
use super::storage::{FolderStorage, StoragePriority};
use crate::error::{FolderError, FolderResult};
use crate::model::ContentType;

/// Tree id under which general purpose (wildcard) storages register.
pub const ALL_TREES: &str = "*";

#[derive(Clone, Default)]
struct Snapshot {
    general: Vec<Arc<dyn FolderStorage>>,
    trees: HashMap<String, Vec<Arc<dyn FolderStorage>>>,
    content_types: ContentTypeRegistry,
}

pub struct StorageRegistry {
    snapshot: ArcSwap<Snapshot>,
    writer: Mutex<()>,
}

impl Default for StorageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            writer: Mutex::new(()),
        }
    }

    /// Registers a storage for `tree_id` (or [`ALL_TREES`]).
    ///
    /// Returns `Ok(false)` when nothing was registered: the storage has the
    /// reserved highest priority or is already present.
    pub fn register(&self, tree_id: &str, storage: Arc<dyn FolderStorage>) -> FolderResult<bool> {
        if storage.priority() == StoragePriority::Highest {
            warn!(
                component = "registry",
                event = "register_skipped",
                storage = storage.id(),
                tree = tree_id,
                "highest priority storage is not registrable"
            );
            return Ok(false);
        }

        let _guard = self.writer.lock();
        let mut next = Snapshot::clone(&self.snapshot.load());

        if tree_id == ALL_TREES {
            if next.general.iter().any(|s| s.id() == storage.id()) {
                return Ok(false);
            }
            next.general.push(storage.clone());
            sort_by_priority(&mut next.general);
        } else {
            let already = next
                .trees
                .get(tree_id)
                .map(|list| list.iter().any(|s| s.id() == storage.id()))
                .unwrap_or(false);
            if already {
                return Ok(false);
            }
            next.content_types.register(tree_id, &storage)?;
            let list = next.trees.entry(tree_id.to_string()).or_default();
            list.push(storage.clone());
            sort_by_priority(list);
        }

        self.snapshot.store(Arc::new(next));
        info!(
            component = "registry",
            event = "registered",
            storage = storage.id(),
            tree = tree_id,
            content_types = storage.content_types().len(),
            "folder storage registered"
        );
        Ok(true)
    }

    /// Removes a storage and its content type claims.
    pub fn unregister(&self, tree_id: &str, storage_id: &str) -> bool {
        let _guard = self.writer.lock();
        let mut next = Snapshot::clone(&self.snapshot.load());

        let removed = if tree_id == ALL_TREES {
            let before = next.general.len();
            next.general.retain(|s| s.id() != storage_id);
            before != next.general.len()
        } else {
            next.content_types.unregister(tree_id, storage_id);
            match next.trees.get_mut(tree_id) {
                Some(list) => {
                    let before = list.len();
                    list.retain(|s| s.id() != storage_id);
                    before != list.len()
                }
                None => false,
            }
        };

        if removed {
            self.snapshot.store(Arc::new(next));
            info!(
                component = "registry",
                event = "unregistered",
                storage = storage_id,
                tree = tree_id,
                "folder storage unregistered"
            );
        }
        removed
    }

    /// Wildcard storages serving the tree win, then the tree's own list.
    pub fn resolve(&self, tree_id: &str, folder_id: &str) -> Option<Arc<dyn FolderStorage>> {
        let snap = self.snapshot.load();
        snap.general
            .iter()
            .find(|s| s.kind().serves_tree_id(tree_id))
            .or_else(|| {
                snap.trees
                    .get(tree_id)?
                    .iter()
                    .find(|s| s.kind().serves_folder_id(folder_id))
            })
            .cloned()
    }

    /// Like [`resolve`](Self::resolve), but a missing storage is an error.
    pub fn storage_for(&self, tree_id: &str, folder_id: &str) -> FolderResult<Arc<dyn FolderStorage>> {
        self.resolve(tree_id, folder_id)
            .ok_or_else(|| FolderError::no_backend(tree_id, folder_id))
    }

    pub fn resolve_by_content_type(
        &self,
        tree_id: &str,
        content_type: &ContentType,
    ) -> Option<Arc<dyn FolderStorage>> {
        self.snapshot
            .load()
            .content_types
            .resolve(tree_id, content_type)
    }

    pub fn storage_for_content_type(
        &self,
        tree_id: &str,
        content_type: &ContentType,
    ) -> FolderResult<Arc<dyn FolderStorage>> {
        self.resolve_by_content_type(tree_id, content_type)
            .ok_or_else(|| FolderError::NoBackendForContentType {
                tree_id: tree_id.to_string(),
                content_type: content_type.to_string(),
            })
    }

    pub fn resolve_all_for_tree(&self, tree_id: &str) -> Vec<Arc<dyn FolderStorage>> {
        let snap = self.snapshot.load();
        let mut out: Vec<Arc<dyn FolderStorage>> = snap
            .general
            .iter()
            .filter(|s| s.kind().serves_tree_id(tree_id))
            .cloned()
            .collect();
        if let Some(list) = snap.trees.get(tree_id) {
            for storage in list {
                if !out.iter().any(|s| s.id() == storage.id()) {
                    out.push(storage.clone());
                }
            }
        }
        out
    }

    pub fn resolve_all_for_parent(&self, tree_id: &str, parent_id: &str) -> Vec<Arc<dyn FolderStorage>> {
        let snap = self.snapshot.load();
        let mut out: Vec<Arc<dyn FolderStorage>> = snap
            .general
            .iter()
            .filter(|s| s.kind().serves_tree_id(tree_id))
            .cloned()
            .collect();
        if let Some(list) = snap.trees.get(tree_id) {
            for storage in list.iter().filter(|s| s.kind().serves_parent_id(parent_id)) {
                if !out.iter().any(|s| s.id() == storage.id()) {
                    out.push(storage.clone());
                }
            }
        }
        out
    }
}

fn sort_by_priority(list: &mut [Arc<dyn FolderStorage>]) {
    // Stable: equal priorities keep registration order.
    list.sort_by(|a, b| b.priority().cmp(&a.priority()));
}
