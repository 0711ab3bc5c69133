//! Small value types shared by storages and the cache.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const SYSTEM: &str = "system";
pub const MAIL: &str = "mail";
pub const CALENDAR: &str = "calendar";
pub const CONTACTS: &str = "contacts";
pub const TASKS: &str = "tasks";
pub const FILES: &str = "files";

/// Module a folder holds objects for (mail, calendar, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentType(String);

impl ContentType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn system() -> Self {
        Self::new(SYSTEM)
    }

    pub fn mail() -> Self {
        Self::new(MAIL)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderType {
    Private,
    Public,
    Shared,
    System,
    Trash,
}

/// Which copy of a folder is requested. Only working copies are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageType {
    #[default]
    Working,
    Backup,
}

/// Subfolder listing element carrying the storage's intrinsic ordering key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortableId {
    pub id: String,
    pub ordinal: i32,
}

impl SortableId {
    pub fn new(id: impl Into<String>, ordinal: i32) -> Self {
        Self {
            id: id.into(),
            ordinal,
        }
    }
}
