//! The caching folder storage: the single entry point callers use to read
//! and write folders across all registered backends.

pub mod cache_storage;
mod read;
mod warmup;
mod write;


pub use cache_storage::{CacheFolderStorage, CACHE_STORAGE_ID};
