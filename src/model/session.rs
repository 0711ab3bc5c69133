//! Acting user identity.

use std::sync::atomic::{AtomicU64, Ordering};

use super::folder::Owner;

static SESSION_SEQ: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Session {
    pub session_id: String,
    pub user_id: i32,
    pub context_id: i32,
}

impl Session {
    /// Creates a session with a process-unique identifier.
    pub fn new(user_id: i32, context_id: i32) -> Self {
        let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
        Self::with_id(format!("{}-{}-{}", context_id, user_id, seq), user_id, context_id)
    }

    pub fn with_id(session_id: impl Into<String>, user_id: i32, context_id: i32) -> Self {
        Self {
            session_id: session_id.into(),
            user_id,
            context_id,
        }
    }

    pub fn owner(&self) -> Owner {
        Owner::new(self.user_id, self.context_id)
    }
}
