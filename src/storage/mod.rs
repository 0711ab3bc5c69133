//! Folder storage capability, backend registry and transaction plumbing.

pub mod content_type;
pub mod kind;
pub mod memory;
pub mod params;
pub mod registry;
pub mod storage;
pub mod transaction;

#[cfg(test)]
mod registry_test;

// Re-export main types
pub use content_type::ContentTypeRegistry;
pub use kind::FolderKind;
pub use memory::MemoryFolderStorage;
pub use params::StorageParameters;
pub use registry::{StorageRegistry, ALL_TREES};
pub use storage::{FolderStorage, StoragePriority};
pub use transaction::{within, OpenedStorages};
