pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod folder;
pub mod lock;
pub mod metrics;
pub mod model;
pub mod storage;

#[cfg(test)]
mod tests;

#[cfg(test)]
pub use tests::support;

pub use error::{FolderError, FolderResult};
pub use folder::CacheFolderStorage;
