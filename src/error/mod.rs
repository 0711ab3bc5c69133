// Error taxonomy shared by storages, the registry and the cache layer.

use std::time::Duration;

pub type FolderResult<T> = Result<T, FolderError>;

#[derive(Debug, thiserror::Error)]
pub enum FolderError {
    #[error("no folder storage for tree {tree_id} and folder {folder_id}")]
    NoBackendForId { tree_id: String, folder_id: String },
    #[error("no folder storage for tree {tree_id} and content type {content_type}")]
    NoBackendForContentType { tree_id: String, content_type: String },
    #[error("no folder storage registered for tree {tree_id}")]
    NoBackendForTree { tree_id: String },
    #[error("content type {content_type} is already claimed in tree {tree_id}")]
    DuplicateContentType { tree_id: String, content_type: String },
    #[error("timed out after {waited:?} waiting for lock on {scope}")]
    LockTimeout { scope: String, waited: Duration },
    #[error("folder {folder_id} not found in tree {tree_id}")]
    NotFound { tree_id: String, folder_id: String },
    #[error("folder storage {storage} failed: {source}")]
    Backend {
        storage: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("executor queue is full, task rejected")]
    Rejected,
    #[error("executor is shut down")]
    ExecutorShutdown,
    #[error("timed out after {waited:?} awaiting storage tasks")]
    TaskTimeout { waited: Duration },
    #[error("storage task panicked")]
    TaskPanicked,
    #[error("invalid folder: {0}")]
    InvalidFolder(String),
}

impl FolderError {
    /// Wraps an unexpected storage failure.
    pub fn backend(storage: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Backend {
            storage: storage.into(),
            source: source.into(),
        }
    }

    pub fn not_found(tree_id: impl Into<String>, folder_id: impl Into<String>) -> Self {
        Self::NotFound {
            tree_id: tree_id.into(),
            folder_id: folder_id.into(),
        }
    }

    pub fn no_backend(tree_id: impl Into<String>, folder_id: impl Into<String>) -> Self {
        Self::NoBackendForId {
            tree_id: tree_id.into(),
            folder_id: folder_id.into(),
        }
    }

    /// Whether the caller should retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. } | Self::TaskTimeout { .. })
    }

    /// Benign for delete and prepare paths.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
