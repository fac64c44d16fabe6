//! Persistence seam between the worker engine and a durable store.
//!
//! The engine only needs a handful of operations; the one with teeth is
//! [`JobStore::claim_next_pending`], which must be a compare-and-swap on
//! the job's state so that any number of workers (in any number of
//! processes) can share one queue without an in-memory coordinator.

pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Job, JobId, JobUpdate, RetryPolicy, State};

pub use memory::MemoryStore;

/// Result of one claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// This caller now owns the job; it is `processing` in the store.
    Claimed(Job),
    /// No pending job exists.
    Empty,
    /// A pending job was selected but another caller claimed it first.
    /// Retry selection rather than the same candidate.
    Lost,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with `DuplicateJob` if the id is taken.
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Select the oldest pending job and atomically move it to
    /// `processing`, but only if it is still pending at write time.
    async fn claim_next_pending(&self) -> Result<Claim>;

    /// Overwrite the given fields and refresh `updated_at`. Only the
    /// current owner of a job calls this, so no state guard is applied.
    async fn persist(&self, id: &JobId, update: &JobUpdate) -> Result<()>;

    /// Move a job from `dead` back to `pending` with `attempts = 0` and no
    /// `last_error`, but only if it is still dead at write time. Returns
    /// `false` when the job is missing or in any other state.
    async fn requeue_dead(&self, id: &JobId) -> Result<bool>;

    /// Get a job by ID.
    async fn get(&self, id: &JobId) -> Result<Job>;

    /// List jobs, optionally filtered by state, oldest first.
    async fn list_by_state(&self, state: Option<State>) -> Result<Vec<Job>>;

    /// Number of jobs per state. Every state is present, zero or not.
    async fn count_by_state(&self) -> Result<BTreeMap<State, u64>> {
        let mut counts = zeroed_counts();
        for job in self.list_by_state(None).await? {
            *counts.entry(job.state).or_default() += 1;
        }
        Ok(counts)
    }
}

/// Read-only source of the retry policy. Implementations must not cache:
/// operators change the policy while workers are running.
#[async_trait]
pub trait PolicySource: Send + Sync {
    async fn retry_policy(&self) -> Result<RetryPolicy>;
}

pub(crate) fn zeroed_counts() -> BTreeMap<State, u64> {
    State::ALL.into_iter().map(|s| (s, 0)).collect()
}
