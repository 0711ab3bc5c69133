//! Per-user folder map for folders that are not shareable across a context.

use dashmap::DashMap;
use std::sync::Arc;

use crate::model::{Folder, Session, StorageKey};

#[derive(Debug, Clone)]
struct Entry {
    folder: Arc<Folder>,
    // set for session bound folders only
    session_id: Option<String>,
}

impl Entry {
    fn visible_to(&self, session: &Session) -> bool {
        match &self.session_id {
            Some(owner) => owner == &session.session_id,
            None => true,
        }
    }
}

type UserMap = DashMap<StorageKey, Entry>;

#[derive(Default)]
pub struct SessionFolderMap {
    // (user id, context id) -> folders
    maps: DashMap<(i32, i32), UserMap>,
}

impl SessionFolderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folder cached for the session's user, if visible to this session.
    pub fn get(&self, session: &Session, key: &StorageKey) -> Option<Arc<Folder>> {
        let map = self.maps.get(&(session.user_id, session.context_id))?;
        let entry = map.get(key)?;
        entry.visible_to(session).then(|| entry.folder.clone())
    }

    /// Like [`get`](Self::get) without the session visibility filter.
    pub fn peek(&self, user_id: i32, context_id: i32, key: &StorageKey) -> Option<Arc<Folder>> {
        self.maps
            .get(&(user_id, context_id))?
            .get(key)
            .map(|entry| entry.folder.clone())
    }

    /// Caches the folder under its own key for the session's user.
    pub fn put(&self, session: &Session, folder: Arc<Folder>) {
        let entry = Entry {
            session_id: folder.session_bound.then(|| session.session_id.clone()),
            folder,
        };
        let user = (session.user_id, session.context_id);
        let key = entry.folder.key();
        if let Some(map) = self.maps.get(&user) {
            map.insert(key, entry);
            return;
        }
        self.maps.entry(user).or_default().insert(key, entry);
    }

    pub fn remove(&self, user_id: i32, context_id: i32, key: &StorageKey) -> bool {
        self.maps
            .get(&(user_id, context_id))
            .map(|map| map.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Removes the key from every user map of the context.
    pub fn remove_in_context(&self, context_id: i32, key: &StorageKey) -> usize {
        self.maps
            .iter()
            .filter(|e| e.key().1 == context_id)
            .filter(|e| e.value().remove(key).is_some())
            .count()
    }

    /// Drops everything cached for one user.
    pub fn drop_user(&self, user_id: i32, context_id: i32) -> usize {
        self.maps
            .remove(&(user_id, context_id))
            .map(|(_, map)| map.len())
            .unwrap_or(0)
    }

    /// Drops everything cached for all users of a context.
    pub fn drop_context(&self, context_id: i32) -> usize {
        let users: Vec<(i32, i32)> = self
            .maps
            .iter()
            .filter(|e| e.key().1 == context_id)
            .map(|e| *e.key())
            .collect();
        users
            .into_iter()
            .map(|(user, ctx)| self.drop_user(user, ctx))
            .sum()
    }

    pub fn len(&self) -> usize {
        self.maps.iter().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
