//! Per-call parameters handed to every storage operation.

use std::collections::HashMap;

use crate::model::Session;

/// Session, decorator options and the set of storage transactions opened on
/// behalf of one call sequence.
#[derive(Debug, Clone)]
pub struct StorageParameters {
    session: Session,
    check_duplicates: bool,
    // storage id -> opened for modification
    transactions: HashMap<String, bool>,
}

impl StorageParameters {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            check_duplicates: true,
            transactions: HashMap::new(),
        }
    }

    /// Fresh parameters for the same session, without open transactions.
    pub fn detached(&self) -> Self {
        Self::new(self.session.clone())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn user_id(&self) -> i32 {
        self.session.user_id
    }

    pub fn context_id(&self) -> i32 {
        self.session.context_id
    }

    pub fn check_duplicates(&self) -> bool {
        self.check_duplicates
    }

    pub fn set_check_duplicates(&mut self, check: bool) {
        self.check_duplicates = check;
    }

    /// Records a transaction for `storage_id`. Returns false when one is
    /// already open, in which case the caller must not commit it.
    pub fn begin_transaction(&mut self, storage_id: &str, modify: bool) -> bool {
        if self.transactions.contains_key(storage_id) {
            return false;
        }
        self.transactions.insert(storage_id.to_string(), modify);
        true
    }

    /// Forgets the transaction of `storage_id`, returning its modify flag.
    pub fn end_transaction(&mut self, storage_id: &str) -> Option<bool> {
        self.transactions.remove(storage_id)
    }

    pub fn in_transaction(&self, storage_id: &str) -> bool {
        self.transactions.contains_key(storage_id)
    }

    /// Modify flag of the open transaction of `storage_id`, if any.
    pub fn transaction(&self, storage_id: &str) -> Option<bool> {
        self.transactions.get(storage_id).copied()
    }
}
