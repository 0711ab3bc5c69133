#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use crate::error::FolderError;
    use crate::lock::TreeLockManagement;
    use crate::model::LockScope;

    /// Holds the write lock of `scope` on another thread until the returned
    /// barrier is passed a second time.
    fn hold_write(locks: Arc<TreeLockManagement>, scope: LockScope) -> (Arc<Barrier>, thread::JoinHandle<()>) {
        let barrier = Arc::new(Barrier::new(2));
        let b = barrier.clone();
        let handle = thread::spawn(move || {
            let _guard = locks.write(&scope).unwrap();
            b.wait();
            b.wait();
        });
        barrier.wait();
        (barrier, handle)
    }

    #[test]
    fn test_readers_share_scope() {
        let locks = Arc::new(TreeLockManagement::new(Duration::from_millis(50)));
        let scope = LockScope::new("0", 3, 1);
        let _first = locks.read(&scope).unwrap();

        let other = locks.clone();
        let s = scope.clone();
        let ok = thread::spawn(move || other.read(&s).is_ok()).join().unwrap();
        assert!(ok);
    }

    #[test]
    fn test_write_times_out_concurrent_reader() {
        let locks = Arc::new(TreeLockManagement::new(Duration::from_millis(1)));
        let scope = LockScope::new("0", 3, 1);
        let (barrier, handle) = hold_write(locks.clone(), scope.clone());

        let err = locks.read(&scope).err().unwrap();
        assert!(matches!(err, FolderError::LockTimeout { .. }));
        assert!(err.is_retryable());

        barrier.wait();
        handle.join().unwrap();
        assert!(locks.read(&scope).is_ok());
    }

    #[test]
    fn test_scopes_are_independent() {
        let locks = Arc::new(TreeLockManagement::new(Duration::from_millis(1)));
        let (barrier, handle) = hold_write(locks.clone(), LockScope::new("0", 3, 1));

        assert!(locks.write(&LockScope::new("0", 4, 1)).is_ok());
        assert!(locks.write(&LockScope::new("1", 3, 1)).is_ok());
        assert!(locks.write(&LockScope::shared("0")).is_ok());

        barrier.wait();
        handle.join().unwrap();
    }

    #[test]
    fn test_reentrant_acquisition() {
        let locks = TreeLockManagement::new(Duration::from_millis(1));
        let scope = LockScope::new("0", 3, 1);

        let outer = locks.write(&scope).unwrap();
        assert!(!outer.is_reentered());
        {
            let nested_write = locks.write(&scope).unwrap();
            let nested_read = locks.read(&scope).unwrap();
            assert!(nested_write.is_reentered());
            assert!(nested_read.is_reentered());
        }
        drop(outer);

        // Fully released: another thread can take it.
        let locks = Arc::new(locks);
        let other = locks.clone();
        let ok = thread::spawn(move || other.write(&scope).is_ok()).join().unwrap();
        assert!(ok);
    }

    #[test]
    fn test_read_to_write_upgrade_is_refused() {
        let locks = TreeLockManagement::new(Duration::from_secs(5));
        let scope = LockScope::new("0", 3, 1);
        let _read = locks.read(&scope).unwrap();

        let err = locks.write(&scope).err().unwrap();
        assert!(matches!(err, FolderError::LockTimeout { waited, .. } if waited.is_zero()));
    }

    #[test]
    fn test_purge_idle() {
        let locks = TreeLockManagement::new(Duration::from_millis(10));
        let busy = LockScope::new("0", 3, 1);
        let guard = locks.read(&busy).unwrap();
        drop(locks.write(&LockScope::new("0", 4, 1)).unwrap());
        assert_eq!(locks.len(), 2);

        assert_eq!(locks.purge_idle(), 1);
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert_eq!(locks.purge_idle(), 1);
        assert!(locks.is_empty());
    }
}
