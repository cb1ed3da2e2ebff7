use crate::pool::error::{PoolError, PoolResult};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Bounded pool of blocking workers.
///
/// Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> PoolResult<Self> {
        if threads == 0 {
            return Err(PoolError::InvalidSize);
        }

        Ok(Self {
            permits: Arc::new(Semaphore::new(threads)),
            size: threads,
        })
    }

    /// Maximum number of tasks running at once
    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers not currently running a task
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Queue a blocking closure and get a handle to its result
    pub fn submit<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();

        let inner = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| PoolError::Closed)?;

            let output = tokio::task::spawn_blocking(task).await?;
            Ok(output)
        });

        TaskHandle { inner }
    }

    /// Reject queued and future submissions. Running tasks finish normally.
    pub fn close(&self) {
        self.permits.close();
    }
}

/// Awaitable result of a submitted task
#[derive(Debug)]
pub struct TaskHandle<T> {
    inner: JoinHandle<PoolResult<T>>,
}

impl<T> TaskHandle<T> {
    pub async fn join(self) -> PoolResult<T> {
        self.inner.await?
    }
}
