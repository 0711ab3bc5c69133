//! Content type to storage index, one per tree.

use std::collections::HashMap;
use std::sync::Arc;

use super::storage::FolderStorage;
use crate::error::{FolderError, FolderResult};
use crate::model::ContentType;

/// Maps (tree, content type) to the storage claiming it. Storages without
/// content types are kept as general purpose fallbacks for their tree.
#[derive(Clone, Default)]
pub struct ContentTypeRegistry {
    claimed: HashMap<(String, ContentType), Arc<dyn FolderStorage>>,
    general: HashMap<String, Vec<Arc<dyn FolderStorage>>>,
}

impl ContentTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims every declared content type of `storage` in `tree_id`.
    /// Nothing is claimed when one of the types is already taken.
    pub fn register(&mut self, tree_id: &str, storage: &Arc<dyn FolderStorage>) -> FolderResult<()> {
        let types = storage.content_types();
        if types.is_empty() {
            self.general
                .entry(tree_id.to_string())
                .or_default()
                .push(storage.clone());
            return Ok(());
        }

        if let Some(taken) = types
            .iter()
            .find(|ct| self.claimed.contains_key(&(tree_id.to_string(), (*ct).clone())))
        {
            return Err(FolderError::DuplicateContentType {
                tree_id: tree_id.to_string(),
                content_type: taken.to_string(),
            });
        }

        for ct in types {
            self.claimed
                .insert((tree_id.to_string(), ct.clone()), storage.clone());
        }
        Ok(())
    }

    /// Drops every claim and fallback entry of the storage in `tree_id`.
    pub fn unregister(&mut self, tree_id: &str, storage_id: &str) {
        self.claimed
            .retain(|(tree, _), s| !(tree == tree_id && s.id() == storage_id));
        if let Some(list) = self.general.get_mut(tree_id) {
            list.retain(|s| s.id() != storage_id);
        }
    }

    /// Claimed storage first, then the first general purpose one.
    pub fn resolve(&self, tree_id: &str, content_type: &ContentType) -> Option<Arc<dyn FolderStorage>> {
        self.claimed
            .get(&(tree_id.to_string(), content_type.clone()))
            .or_else(|| self.general.get(tree_id).and_then(|list| list.first()))
            .cloned()
    }
}
