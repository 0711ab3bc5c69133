//! Fixed-size thread pool over a bounded crossbeam channel.

use anyhow::Context;
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::config::{Config, ConfigTrait};
use crate::error::{FolderError, FolderResult};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Result handle of a submitted task.
pub struct Pending<T> {
    rx: Receiver<thread::Result<T>>,
}

impl<T> Pending<T> {
    /// Blocks until the task finished or `timeout` elapsed.
    pub fn wait(self, timeout: Duration) -> FolderResult<T> {
        let started = Instant::now();
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(FolderError::TaskPanicked),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(FolderError::TaskTimeout {
                waited: started.elapsed(),
            }),
            // The job was dropped unexecuted.
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(FolderError::ExecutorShutdown),
        }
    }
}

pub struct BoundedExecutor {
    name: String,
    sender: RwLock<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    await_timeout: Duration,
}

impl BoundedExecutor {
    /// Spawns `workers` named threads sharing a queue of `queue` jobs.
    pub fn new(name: &str, workers: usize, queue: usize, await_timeout: Duration) -> anyhow::Result<Self> {
        let workers = workers.max(1);
        let (tx, rx) = crossbeam_channel::bounded::<Job>(queue.max(1));

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, i))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                })
                .with_context(|| format!("failed to spawn {} worker {}", name, i))?;
            handles.push(handle);
        }

        info!(
            component = "executor",
            event = "started",
            name,
            workers,
            queue,
            "bounded executor started"
        );

        Ok(Self {
            name: name.to_string(),
            sender: RwLock::new(Some(tx)),
            workers: Mutex::new(handles),
            worker_count: workers,
            await_timeout,
        })
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        Self::new(
            "folder-worker",
            cfg.executor_workers(),
            cfg.executor_queue(),
            cfg.executor_await_timeout(),
        )
    }

    pub fn workers(&self) -> usize {
        self.worker_count
    }

    /// Upper bound for waiting on fan-out results.
    pub fn await_timeout(&self) -> Duration {
        self.await_timeout
    }

    /// Jobs waiting in the queue.
    pub fn queued(&self) -> usize {
        self.sender.read().as_ref().map(|s| s.len()).unwrap_or(0)
    }

    /// Submits a task, waiting up to the await timeout for queue space.
    pub fn submit<T, F>(&self, task: F) -> FolderResult<Pending<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (job, pending) = self.wrap(task);
        self.enqueue(job, Some(self.await_timeout))?;
        Ok(pending)
    }

    /// Submits a task only if the queue has room; `Rejected` otherwise.
    pub fn try_submit<T, F>(&self, task: F) -> FolderResult<Pending<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (job, pending) = self.wrap(task);
        self.enqueue(job, None)?;
        Ok(pending)
    }

    pub(crate) fn enqueue(&self, job: Job, wait: Option<Duration>) -> FolderResult<()> {
        let sender = self
            .sender
            .read()
            .clone()
            .ok_or(FolderError::ExecutorShutdown)?;
        match wait {
            Some(timeout) => sender.send_timeout(job, timeout).map_err(|e| match e {
                SendTimeoutError::Timeout(_) => FolderError::Rejected,
                SendTimeoutError::Disconnected(_) => FolderError::ExecutorShutdown,
            }),
            None => sender.try_send(job).map_err(|e| match e {
                TrySendError::Full(_) => FolderError::Rejected,
                TrySendError::Disconnected(_) => FolderError::ExecutorShutdown,
            }),
        }
    }

    fn wrap<T, F>(&self, task: F) -> (Job, Pending<T>)
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let name = self.name.clone();
        let job: Job = Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(task));
            if result.is_err() {
                error!(component = "executor", event = "task_panicked", name = %name, "task panicked");
            }
            // Nobody waiting is fine.
            let _ = tx.send(result);
        });
        (job, Pending { rx })
    }

    /// Stops accepting tasks, lets queued ones finish and joins the workers.
    pub fn shutdown(&self) {
        self.sender.write().take();
        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        let joined = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                error!(component = "executor", event = "join_failed", name = %self.name, "worker panicked");
            }
        }
        info!(
            component = "executor",
            event = "stopped",
            name = %self.name,
            joined,
            "bounded executor stopped"
        );
    }
}
