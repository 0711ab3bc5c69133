//! Lock registry keyed by [`LockScope`].
//!
//! Locks are created lazily in a concurrent map and acquired with a bounded
//! wait. Acquisition is reentrant per thread: a thread already holding the
//! scope gets a no-op guard instead of deadlocking on itself.

use dashmap::DashMap;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::config::{Config, ConfigTrait};
use crate::error::{FolderError, FolderResult};
use crate::metrics;
use crate::model::LockScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Read,
    Write,
}

struct Held {
    mode: Mode,
    depth: usize,
}

thread_local! {
    static HELD: RefCell<HashMap<LockScope, Held>> = RefCell::new(HashMap::new());
}

#[allow(dead_code)]
enum Inner {
    Read(ArcRwLockReadGuard<RawRwLock, ()>),
    Write(ArcRwLockWriteGuard<RawRwLock, ()>),
    Reentered,
}

/// Releases the scope when dropped. Not `Send`: it must be dropped on the
/// thread that acquired it.
pub struct TreeLockGuard {
    scope: LockScope,
    inner: Inner,
}

impl TreeLockGuard {
    pub fn scope(&self) -> &LockScope {
        &self.scope
    }

    /// Whether this guard piggybacks on a lock the thread already held.
    pub fn is_reentered(&self) -> bool {
        matches!(self.inner, Inner::Reentered)
    }
}

impl Drop for TreeLockGuard {
    fn drop(&mut self) {
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(entry) = held.get_mut(&self.scope) {
                entry.depth -= 1;
                if entry.depth == 0 {
                    held.remove(&self.scope);
                }
            }
        });
    }
}

pub struct TreeLockManagement {
    locks: DashMap<LockScope, Arc<RwLock<()>>>,
    timeout: Duration,
}

impl TreeLockManagement {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.lock_timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn read(&self, scope: &LockScope) -> FolderResult<TreeLockGuard> {
        self.acquire(scope, Mode::Read)
    }

    pub fn write(&self, scope: &LockScope) -> FolderResult<TreeLockGuard> {
        self.acquire(scope, Mode::Write)
    }

    /// Number of scopes with a lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Drops lock entries nobody holds or waits on.
    pub fn purge_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    fn acquire(&self, scope: &LockScope, mode: Mode) -> FolderResult<TreeLockGuard> {
        let held_mode = HELD.with(|held| held.borrow().get(scope).map(|h| h.mode));
        match (held_mode, mode) {
            (Some(Mode::Write), _) | (Some(Mode::Read), Mode::Read) => {
                HELD.with(|held| {
                    if let Some(entry) = held.borrow_mut().get_mut(scope) {
                        entry.depth += 1;
                    }
                });
                return Ok(TreeLockGuard {
                    scope: scope.clone(),
                    inner: Inner::Reentered,
                });
            }
            (Some(Mode::Read), Mode::Write) => {
                // Upgrading a held read lock would wait on ourselves.
                warn!(
                    component = "lock",
                    event = "upgrade_refused",
                    scope = %scope,
                    "write lock requested while holding the read lock"
                );
                return Err(FolderError::LockTimeout {
                    scope: scope.to_string(),
                    waited: Duration::ZERO,
                });
            }
            (None, _) => {}
        }

        let lock = self
            .locks
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone();

        let started = Instant::now();
        let inner = match mode {
            Mode::Read => lock.try_read_arc_for(self.timeout).map(Inner::Read),
            Mode::Write => lock.try_write_arc_for(self.timeout).map(Inner::Write),
        };
        let inner = match inner {
            Some(inner) => inner,
            None => {
                let waited = started.elapsed();
                metrics::inc_lock_timeouts();
                warn!(
                    component = "lock",
                    event = "timeout",
                    scope = %scope,
                    write = mode == Mode::Write,
                    waited_ms = waited.as_millis() as u64,
                    "lock wait timed out"
                );
                return Err(FolderError::LockTimeout {
                    scope: scope.to_string(),
                    waited,
                });
            }
        };

        HELD.with(|held| {
            held.borrow_mut().insert(scope.clone(), Held { mode, depth: 1 });
        });
        Ok(TreeLockGuard {
            scope: scope.clone(),
            inner,
        })
    }
}
