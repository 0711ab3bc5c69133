//! Backend dispatch predicates.
//!
//! Every storage declares which folders it serves through one of these tagged
//! variants; the registry iterates storages in priority order and asks them.

use crate::model::PRIVATE_FOLDER_ID;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderKind {
    /// Serves every folder of exactly one tree (virtual trees).
    Tree { tree_id: String },
    /// Database folders, identified by numeric ids.
    Database,
    /// Mail account folders: `<prefix><account>` for the account root and
    /// `<prefix><account>/<path>` below it.
    MailAccount { prefix: String },
    /// Serves everything. Only the cache layer itself uses this.
    Any,
}

impl FolderKind {
    pub fn mail_account(prefix: impl Into<String>) -> Self {
        Self::MailAccount {
            prefix: prefix.into(),
        }
    }

    pub fn serves_tree_id(&self, tree_id: &str) -> bool {
        match self {
            Self::Tree { tree_id: served } => served == tree_id,
            Self::Any => true,
            Self::Database | Self::MailAccount { .. } => false,
        }
    }

    pub fn serves_folder_id(&self, folder_id: &str) -> bool {
        match self {
            Self::Tree { .. } | Self::Any => true,
            Self::Database => is_numeric(folder_id),
            Self::MailAccount { prefix } => mail_account_of(prefix, folder_id).is_some(),
        }
    }

    pub fn serves_parent_id(&self, parent_id: &str) -> bool {
        match self {
            Self::Tree { .. } | Self::Any => true,
            Self::Database => is_numeric(parent_id),
            // Account roots are listed below the private folder.
            Self::MailAccount { prefix } => {
                parent_id == PRIVATE_FOLDER_ID || mail_account_of(prefix, parent_id).is_some()
            }
        }
    }
}

fn is_numeric(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Extracts the account id of a mail folder id.
pub fn mail_account_of<'a>(prefix: &str, folder_id: &'a str) -> Option<&'a str> {
    let rest = folder_id.strip_prefix(prefix)?;
    let account = rest.split('/').next()?;
    is_numeric(account).then_some(account)
}
