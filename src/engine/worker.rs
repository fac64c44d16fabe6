//! Worker loop: claim, execute, decide, persist, back off.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::error::Result;
use crate::model::{Job, State};
use crate::store::{Claim, JobStore, PolicySource};
use crate::telemetry::job::{record_state_transition, start_job_span};
use crate::telemetry::metrics;

use super::executor::Executor;
use super::retry::{Decision, decide};

/// Configuration for a worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between claim attempts when the queue is empty.
    pub idle_interval: Duration,
    /// Length of one backoff time unit.
    pub backoff_unit: Duration,
    /// Exit once no pending job is left instead of polling.
    pub drain: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(1),
            backoff_unit: Duration::from_secs(1),
            drain: false,
        }
    }
}

/// What one loop iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Nothing was pending.
    Idle,
    /// Another worker won the claim.
    Lost,
    /// A job ran and its outcome was persisted.
    Processed(Decision),
}

/// One sequential job processor. Many may share a store.
pub struct Worker {
    id: String,
    store: Arc<dyn JobStore>,
    policy: Arc<dyn PolicySource>,
    executor: Arc<dyn Executor>,
    config: WorkerConfig,
    shutdown: CancellationToken,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        store: Arc<dyn JobStore>,
        policy: Arc<dyn PolicySource>,
        executor: Arc<dyn Executor>,
        config: WorkerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id: id.into(),
            store,
            policy,
            executor,
            config,
            shutdown,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run until the shutdown token is cancelled (or, in drain mode, until
    /// the queue is empty).
    ///
    /// Cancellation is observed between iterations only. A running command
    /// or a pending sleep always finishes first.
    pub async fn run(&self) -> Result<()> {
        info!(worker = %self.id, "worker started");

        while !self.shutdown.is_cancelled() {
            match self.run_once().await? {
                Step::Idle => {
                    if self.config.drain {
                        info!(worker = %self.id, "queue drained");
                        break;
                    }
                    tokio::time::sleep(self.config.idle_interval).await;
                }
                Step::Lost => continue,
                Step::Processed(decision) => {
                    let delay = decision.backoff();
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        info!(worker = %self.id, "worker stopped");
        Ok(())
    }

    /// One iteration without any sleeping.
    pub async fn run_once(&self) -> Result<Step> {
        match self.store.claim_next_pending().await? {
            Claim::Empty => Ok(Step::Idle),
            Claim::Lost => {
                debug!(worker = %self.id, "claim lost, reselecting");
                Ok(Step::Lost)
            }
            Claim::Claimed(job) => self.process(job).await.map(Step::Processed),
        }
    }

    async fn process(&self, job: Job) -> Result<Decision> {
        let span = start_job_span(&job.id, &self.id);

        async {
            record_state_transition(&span, State::Pending, State::Processing, job.attempts);

            let started = Instant::now();
            let outcome = self.executor.run(&job).await;
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
            metrics::execution_duration_ms().record(
                duration_ms,
                &[KeyValue::new(
                    "outcome",
                    if outcome.success() { "success" } else { "failure" },
                )],
            );

            let policy = self.policy.retry_policy().await?;
            let decision = decide(&job, &outcome, &policy, self.config.backoff_unit);
            self.store.persist(&job.id, &decision.to_update()).await?;
            record_state_transition(
                &span,
                State::Processing,
                decision.next_state(),
                decision.attempts(),
            );

            match &decision {
                Decision::Complete { attempts } => {
                    info!(id = %job.id, attempts, duration_ms, "job completed");
                }
                Decision::Retry {
                    attempts,
                    last_error,
                    delay,
                } => {
                    warn!(
                        id = %job.id,
                        attempts,
                        max_retries = job.max_retries,
                        exit_code = outcome.exit_code,
                        delay_ms = delay.as_millis() as u64,
                        error = %last_error,
                        "job failed, will retry"
                    );
                }
                Decision::Dead {
                    attempts,
                    last_error,
                } => {
                    error!(
                        id = %job.id,
                        attempts,
                        exit_code = outcome.exit_code,
                        error = %last_error,
                        "job exhausted its attempts, moved to dead-letter"
                    );
                }
            }

            Ok(decision)
        }
        .instrument(span.clone())
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::executor::ExecOutcome;
    use crate::model::{NewJob, RetryPolicy};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;

    /// Succeeds or fails without spawning anything.
    struct Scripted(i32);

    #[async_trait]
    impl Executor for Scripted {
        async fn run(&self, _job: &Job) -> ExecOutcome {
            ExecOutcome {
                exit_code: self.0,
                stderr: if self.0 == 0 { String::new() } else { "scripted failure".into() },
            }
        }
    }

    fn worker(store: Arc<MemoryStore>, exit_code: i32) -> Worker {
        Worker::new(
            "test-0",
            store.clone(),
            store,
            Arc::new(Scripted(exit_code)),
            WorkerConfig {
                backoff_unit: Duration::from_millis(1),
                ..WorkerConfig::default()
            },
            CancellationToken::new(),
        )
    }

    async fn seed(store: &MemoryStore, id: &str, max_retries: u32) {
        let job = NewJob::new("true")
            .id(id)
            .max_retries(max_retries)
            .into_job(RetryPolicy::default().max_retries, Utc::now());
        store.insert(&job).await.unwrap();
    }

    #[tokio::test]
    async fn empty_queue_is_idle() {
        let store = Arc::new(MemoryStore::new());
        assert_eq!(worker(store, 0).run_once().await.unwrap(), Step::Idle);
    }

    #[tokio::test]
    async fn success_is_persisted() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "ok", 3).await;

        let step = worker(store.clone(), 0).run_once().await.unwrap();
        assert_eq!(step, Step::Processed(Decision::Complete { attempts: 1 }));

        let job = store.get(&"ok".into()).await.unwrap();
        assert_eq!(job.state, State::Completed);
        assert_eq!(job.attempts, 1);
        assert!(job.last_error.is_none());
    }

    #[tokio::test]
    async fn failure_is_persisted_as_pending_with_error() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "flaky", 3).await;

        worker(store.clone(), 1).run_once().await.unwrap();

        let job = store.get(&"flaky".into()).await.unwrap();
        assert_eq!(job.state, State::Pending);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.last_error.as_deref(), Some("scripted failure"));
    }

    #[tokio::test]
    async fn drain_mode_exits_once_queue_is_empty() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "a", 2).await;
        seed(&store, "b", 2).await;

        let mut w = worker(store.clone(), 1);
        w.config.drain = true;
        w.run().await.unwrap();

        for id in ["a", "b"] {
            let job = store.get(&id.into()).await.unwrap();
            assert_eq!(job.state, State::Dead);
            assert_eq!(job.attempts, 2);
        }
    }

    #[tokio::test]
    async fn cancelled_worker_does_not_claim() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "untouched", 3).await;

        let w = worker(store.clone(), 0);
        w.shutdown.cancel();
        w.run().await.unwrap();

        let job = store.get(&"untouched".into()).await.unwrap();
        assert_eq!(job.state, State::Pending);
        assert_eq!(job.attempts, 0);
    }
}
