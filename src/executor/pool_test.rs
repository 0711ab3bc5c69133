#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    use crate::error::FolderError;
    use crate::executor::BoundedExecutor;

    #[test]
    fn test_submit_and_wait() {
        let executor = BoundedExecutor::new("test", 2, 8, Duration::from_secs(1)).unwrap();
        let pending = executor.submit(|| 21 * 2).unwrap();
        assert_eq!(pending.wait(Duration::from_secs(1)).unwrap(), 42);
        assert_eq!(executor.workers(), 2);
        executor.shutdown();
    }

    #[test]
    fn test_panicking_task_keeps_worker_alive() {
        let executor = BoundedExecutor::new("test", 1, 8, Duration::from_secs(1)).unwrap();
        let failed = executor.submit(|| -> u32 { panic!("boom") }).unwrap();
        assert!(matches!(failed.wait(Duration::from_secs(1)), Err(FolderError::TaskPanicked)));

        let ok = executor.submit(|| 7).unwrap();
        assert_eq!(ok.wait(Duration::from_secs(1)).unwrap(), 7);
    }

    /// Test that a saturated pool rejects instead of queueing without bound.
    #[test]
    fn test_try_submit_rejects_when_full() {
        let executor = BoundedExecutor::new("test", 1, 1, Duration::from_millis(10)).unwrap();
        let gate = Arc::new(Barrier::new(2));

        // Occupy the only worker; the single queue slot fills up next.
        let g = gate.clone();
        let running = executor.submit(move || g.wait()).unwrap();
        let mut rejected = false;
        for _ in 0..3 {
            if let Err(FolderError::Rejected) = executor.try_submit(|| ()) {
                rejected = true;
                break;
            }
        }
        assert!(rejected);

        gate.wait();
        running.wait(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_wait_times_out() {
        let executor = BoundedExecutor::new("test", 1, 4, Duration::from_secs(1)).unwrap();
        let slow = executor
            .submit(|| std::thread::sleep(Duration::from_millis(200)))
            .unwrap();
        let err = slow.wait(Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, FolderError::TaskTimeout { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_submit_after_shutdown() {
        let executor = BoundedExecutor::new("test", 1, 4, Duration::from_secs(1)).unwrap();
        executor.shutdown();
        assert!(matches!(executor.submit(|| 1), Err(FolderError::ExecutorShutdown)));
        assert_eq!(executor.queued(), 0);
    }
}
