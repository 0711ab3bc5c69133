//! Submit-many, collect-all on top of [`BoundedExecutor`].

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::Instant;

use super::pool::BoundedExecutor;
use crate::error::{FolderError, FolderResult};

type Outcome<T> = (usize, thread::Result<FolderResult<T>>);

/// Runs fallible tasks on the executor and gathers their results in
/// submission order. The first failure wins; results of still running
/// siblings are discarded.
pub struct CompletionService<'a, T> {
    executor: &'a BoundedExecutor,
    tx: Sender<Outcome<T>>,
    rx: Receiver<Outcome<T>>,
    submitted: usize,
}

impl<'a, T: Send + 'static> CompletionService<'a, T> {
    pub fn new(executor: &'a BoundedExecutor) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            executor,
            tx,
            rx,
            submitted: 0,
        }
    }

    pub fn submit<F>(&mut self, task: F) -> FolderResult<()>
    where
        F: FnOnce() -> FolderResult<T> + Send + 'static,
    {
        let index = self.submitted;
        let tx = self.tx.clone();
        self.executor.enqueue(
            Box::new(move || {
                let result = catch_unwind(AssertUnwindSafe(task));
                let _ = tx.send((index, result));
            }),
            Some(self.executor.await_timeout()),
        )?;
        self.submitted += 1;
        Ok(())
    }

    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Waits for every submitted task, bounded by the executor's await timeout.
    pub fn collect_all(self) -> FolderResult<Vec<T>> {
        let Self { executor, tx, rx, submitted } = self;
        drop(tx);

        let started = Instant::now();
        let deadline = started + executor.await_timeout();
        let mut slots: Vec<Option<T>> = (0..submitted).map(|_| None).collect();

        for _ in 0..submitted {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((index, Ok(Ok(value)))) => slots[index] = Some(value),
                Ok((_, Ok(Err(e)))) => return Err(e),
                Ok((_, Err(_))) => return Err(FolderError::TaskPanicked),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(FolderError::TaskTimeout {
                        waited: started.elapsed(),
                    })
                }
                Err(RecvTimeoutError::Disconnected) => return Err(FolderError::ExecutorShutdown),
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }
}
