//! Worker pool: N independent loops sharing one store and one stop token.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::store::{JobStore, PolicySource};

use super::executor::{Executor, ShellExecutor};
use super::worker::{Worker, WorkerConfig};

/// Spawns and supervises workers.
#[derive(Clone)]
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    policy: Arc<dyn PolicySource>,
    executor: Arc<dyn Executor>,
    config: WorkerConfig,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn JobStore>,
        policy: Arc<dyn PolicySource>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            policy,
            executor: Arc::new(ShellExecutor),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Replace the shell executor.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// The token every worker watches.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask all workers to stop after their current iteration.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Build the worker at `index`. Ids are `<pid>-<index>` so that logs from
    /// several processes sharing one database stay distinguishable.
    pub fn worker(&self, index: usize) -> Worker {
        Worker::new(
            format!("{}-{index}", std::process::id()),
            Arc::clone(&self.store),
            Arc::clone(&self.policy),
            Arc::clone(&self.executor),
            self.config.clone(),
            self.shutdown.clone(),
        )
    }

    /// Run `count` workers until all of them exit.
    ///
    /// A fatal error ends only the worker that hit it. The first such error
    /// is returned once every worker has exited.
    pub async fn run(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Err(Error::Config("worker count must be at least 1".to_string()));
        }

        let mut workers = JoinSet::new();
        for index in 0..count {
            let worker = self.worker(index);
            workers.spawn(async move {
                let id = worker.id().to_string();
                (id, worker.run().await)
            });
        }
        info!(count, "worker pool started");

        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((worker, Err(e))) => {
                    error!(worker = %worker, error = %e, "worker exited with error");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!(error = %e, "worker task panicked");
                    first_error.get_or_insert(Error::Other(format!("worker task failed: {e}")));
                }
            }
        }

        info!("worker pool stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn zero_workers_is_a_config_error() {
        let store = Arc::new(MemoryStore::new());
        let pool = WorkerPool::new(store.clone(), store, WorkerConfig::default());
        assert!(matches!(pool.run(0).await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn workers_get_distinct_ids() {
        let store = Arc::new(MemoryStore::new());
        let pool = WorkerPool::new(store.clone(), store, WorkerConfig::default());
        assert_ne!(pool.worker(0).id(), pool.worker(1).id());
    }

    #[tokio::test]
    async fn shutdown_before_run_exits_immediately() {
        let store = Arc::new(MemoryStore::new());
        let pool = WorkerPool::new(store.clone(), store, WorkerConfig::default());
        pool.shutdown();
        pool.run(3).await.unwrap();
        assert!(pool.shutdown_token().is_cancelled());
    }
}
