//! Fixed-size worker pool: `submit(task) -> Future<T>`, `shutdown()`.
//!
//! The pool is an external collaborator rather than a bespoke scheduler;
//! `threadpool` is a standard, maintained implementation. The future half
//! of the contract is layered on top with `futures-channel` oneshot
//! channels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_channel::oneshot;

use crate::error::{NetError, Result};

/// The future side of [`WorkerPool::submit`]. Resolves with the task's
/// return value once the worker finishes, or [`NetError::PoolStopped`]-shaped
/// cancellation if the pool is torn down before the task runs.
pub type TaskHandle<T> = oneshot::Receiver<T>;

/// A fixed-size pool of OS threads that run submitted closures.
///
/// Pool size is fixed at construction (spec §4.4); there is no resizing
/// API. One `WorkerPool` is owned per server instance (spec §5).
pub struct WorkerPool {
    inner: threadpool::ThreadPool,
    stopped: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Creates a pool of `worker_num` threads. `worker_num` must be > 0
    /// (spec §6, `enable_thread_pool`).
    pub fn new(worker_num: usize) -> Result<Self> {
        if worker_num == 0 {
            return Err(NetError::Config(
                "worker pool size must be greater than zero".into(),
            ));
        }
        Ok(Self {
            inner: threadpool::Builder::new()
                .num_threads(worker_num)
                .thread_name("netkit-worker".into())
                .build(),
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Number of worker threads in the pool.
    pub fn worker_count(&self) -> usize {
        self.inner.max_count()
    }

    /// Submits `task` to run on a worker thread, returning a handle that
    /// resolves with its return value. Fails immediately with
    /// [`NetError::PoolStopped`] if `shutdown` has already been called —
    /// the runtime never retries a failed submission (spec §7).
    pub fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.stopped.load(Ordering::Acquire) {
            return Err(NetError::PoolStopped);
        }
        let (tx, rx) = oneshot::channel();
        self.inner.execute(move || {
            let _ = tx.send(task());
        });
        Ok(rx)
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stops accepting new submissions, drains the queue, and joins every
    /// worker thread. Idempotent.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        self.inner.join();
    }
}
