//! Bounded background execution for deferred stages.
//!
//! Tasks run on the tokio runtime once a permit is free. A task that depends
//! on another waits for it before taking a permit, so a chain never holds a
//! slot its prerequisite needs.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

#[derive(Clone)]
pub struct BackgroundScheduler {
    permits: Arc<Semaphore>,
}

impl BackgroundScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn spawn<F, T>(&self, name: &'static str, job_id: Uuid, task: F) -> JoinHandle<Option<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::warn!(task = name, job_id = %job_id, "Scheduler closed, task not run");
                return None;
            };
            let start = std::time::Instant::now();
            tracing::debug!(task = name, job_id = %job_id, "Background task started");
            let output = task.await;
            tracing::debug!(
                task = name,
                job_id = %job_id,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Background task finished"
            );
            Some(output)
        })
    }

    /// Run `task` with the result of `prerequisite` once it has finished.
    pub fn spawn_after<A, F, Fut, T>(
        &self,
        name: &'static str,
        job_id: Uuid,
        prerequisite: JoinHandle<A>,
        task: F,
    ) -> JoinHandle<Option<T>>
    where
        A: Send + 'static,
        F: FnOnce(Result<A, JoinError>) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let upstream = prerequisite.await;
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::warn!(task = name, job_id = %job_id, "Scheduler closed, task not run");
                return None;
            };
            tracing::debug!(task = name, job_id = %job_id, "Background task started");
            Some(task(upstream).await)
        })
    }
}
