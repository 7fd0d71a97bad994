//! Capacity-bounded executor for connection tasks.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use futures::FutureExt;
use tokio::{
    sync::{Semaphore, TryAcquireError},
    time::timeout,
};
use tokio_util::task::TaskTracker;

use crate::panic::format_panic;

/// A task the [`WorkerPool`] refused because every worker stayed busy for
/// the whole submit wait, or because the pool was closed.
///
/// The task is handed back untouched; dropping it drops whatever it owns,
/// which for a connection task closes the socket.
pub struct Rejected<T> {
    task: T,
}

impl<T> Rejected<T> {
    /// Recover the refused task.
    pub fn into_inner(self) -> T { self.task }
}

impl<T> fmt::Debug for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected").finish_non_exhaustive()
    }
}

impl<T> fmt::Display for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("worker pool at capacity") }
}

impl<T> std::error::Error for Rejected<T> {}

/// Runs at most `capacity` tasks at once.
///
/// Each task holds a semaphore permit for its whole lifetime. Tasks are
/// tracked so shutdown can wait for them to finish; nothing is aborted.
#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    capacity: usize,
    submit_timeout: Duration,
}

impl WorkerPool {
    /// Create a pool running at most `capacity` tasks, clamped to
    /// `1..=Semaphore::MAX_PERMITS`. A full pool makes
    /// [`submit`](Self::submit) wait up to `submit_timeout`.
    #[must_use]
    pub fn new(capacity: usize, submit_timeout: Duration) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            tracker: TaskTracker::new(),
            capacity,
            submit_timeout,
        }
    }

    /// Spawn `task` once a worker is free.
    ///
    /// A panic inside the task is caught and logged; the permit is released
    /// either way.
    ///
    /// # Errors
    ///
    /// Returns [`Rejected`] with the task if no worker frees up within the
    /// submit wait or the pool has been closed.
    pub async fn submit<F>(&self, task: F) -> Result<(), Rejected<F>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(Rejected { task }),
            Err(TryAcquireError::NoPermits) => {
                match timeout(self.submit_timeout, Arc::clone(&self.permits).acquire_owned()).await {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) | Err(_) => return Err(Rejected { task }),
                }
            }
        };

        self.tracker.spawn(async move {
            let _permit = permit;
            if let Err(panic) = std::panic::AssertUnwindSafe(task).catch_unwind().await {
                tracing::error!(panic = %format_panic(panic), "worker task panicked");
            }
        });
        Ok(())
    }

    /// Maximum number of concurrent tasks.
    #[must_use]
    pub fn capacity(&self) -> usize { self.capacity }

    /// Number of tasks currently running.
    #[must_use]
    pub fn active(&self) -> usize { self.capacity - self.permits.available_permits() }

    /// Refuse further submissions. Running tasks continue.
    pub fn close(&self) {
        self.permits.close();
        self.tracker.close();
    }

    /// Wait for every running task to finish. Only returns after
    /// [`close`](Self::close).
    pub async fn wait(&self) { self.tracker.wait().await; }
}
