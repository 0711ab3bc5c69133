// Package model provides folder snapshots, cache keys and session identity.

pub mod folder;
pub mod keys;
pub mod kinds;
pub mod session;


/// Identifier of the root folder every tree hangs from.
pub const ROOT_FOLDER_ID: &str = "0";
/// Identifier of the private folder below which mail account roots appear.
pub const PRIVATE_FOLDER_ID: &str = "1";

// Re-export main types
pub use folder::{Folder, Owner};
pub use keys::{LockScope, StorageKey};
pub use kinds::{ContentType, FolderType, SortableId, StorageType};
pub use session::Session;
