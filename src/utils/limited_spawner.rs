use std::future::Future;
use std::sync::Arc;

use tokio::sync::{AcquireError, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Spawns tokio tasks while keeping at most `max_concurrent` of them alive.
///
/// Permits are granted in FIFO order, so tasks start in submission order.
pub struct LimitedSpawner {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl LimitedSpawner {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of spawned tasks currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    /// Waits for a free slot, then spawns `f` on it. The slot is released when
    /// the task finishes, panics or is aborted.
    pub async fn spawn<F>(&self, f: F) -> Result<JoinHandle<F::Output>, AcquireError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await?;
        Ok(tokio::spawn(async move {
            let _permit = permit;
            f.await
        }))
    }

    /// Like [`spawn`](Self::spawn), but stops waiting for a slot once `cancel`
    /// fires. Returns `Ok(None)` in that case and `f` is dropped unstarted.
    pub async fn spawn_unless_cancelled<F>(
        &self,
        f: F,
        cancel: &CancellationToken,
    ) -> Result<Option<JoinHandle<F::Output>>, AcquireError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            handle = self.spawn(f) => handle.map(Some),
        }
    }
}
