//! In-process job store.
//!
//! Same contract as the SQLite store, with a mutex standing in for the
//! database's atomic conditional write. Useful for tests and for embedding
//! the engine where durability is not needed.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::model::{Job, JobId, JobUpdate, RetryPolicy, State};
use crate::store::{Claim, JobStore, PolicySource};

#[derive(Debug)]
struct Entry {
    /// Insertion order, the FIFO tie-break for equal `created_at`.
    seq: u64,
    job: Job,
}

#[derive(Debug, Default)]
struct Jobs {
    entries: HashMap<JobId, Entry>,
    next_seq: u64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: Mutex<Jobs>,
    policy: RwLock<RetryPolicy>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            jobs: Mutex::default(),
            policy: RwLock::new(policy),
        }
    }

    /// Replace the retry policy. Workers see it on their next decision.
    pub async fn set_policy(&self, policy: RetryPolicy) {
        *self.policy.write().await = policy;
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if jobs.entries.contains_key(&job.id) {
            return Err(Error::DuplicateJob(job.id.to_string()));
        }
        let seq = jobs.next_seq;
        jobs.next_seq += 1;
        jobs.entries.insert(
            job.id.clone(),
            Entry {
                seq,
                job: job.clone(),
            },
        );
        Ok(())
    }

    async fn claim_next_pending(&self) -> Result<Claim> {
        let mut jobs = self.jobs.lock().await;

        let next = jobs
            .entries
            .values_mut()
            .filter(|e| e.job.state == State::Pending)
            .min_by_key(|e| (e.job.created_at, e.seq));

        let Some(entry) = next else {
            return Ok(Claim::Empty);
        };

        entry.job.state = State::Processing;
        entry.job.updated_at = Utc::now();
        Ok(Claim::Claimed(entry.job.clone()))
    }

    async fn persist(&self, id: &JobId, update: &JobUpdate) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs
            .entries
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        update.apply_to(&mut entry.job, Utc::now());
        Ok(())
    }

    async fn requeue_dead(&self, id: &JobId) -> Result<bool> {
        let mut jobs = self.jobs.lock().await;
        match jobs.entries.get_mut(id) {
            Some(entry) if entry.job.state == State::Dead => {
                JobUpdate::state(State::Pending)
                    .attempts(0)
                    .last_error(None)
                    .apply_to(&mut entry.job, Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, id: &JobId) -> Result<Job> {
        let jobs = self.jobs.lock().await;
        jobs.entries
            .get(id)
            .map(|e| e.job.clone())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn list_by_state(&self, state: Option<State>) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock().await;
        let mut matching: Vec<&Entry> = jobs
            .entries
            .values()
            .filter(|e| state.is_none_or(|s| e.job.state == s))
            .collect();
        matching.sort_by_key(|e| (e.job.created_at, e.seq));
        Ok(matching.into_iter().map(|e| e.job.clone()).collect())
    }
}

#[async_trait]
impl PolicySource for MemoryStore {
    async fn retry_policy(&self) -> Result<RetryPolicy> {
        Ok(*self.policy.read().await)
    }
}
