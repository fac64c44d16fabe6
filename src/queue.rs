//! Operator-facing queue operations: submit work, requeue dead jobs, summarize.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{SubsecRound, Utc};
use tracing::info;

use crate::error::{Error, Result};
use crate::model::{Job, JobId, NewJob, State};
use crate::store::{JobStore, PolicySource};
use crate::telemetry::metrics;

/// Validate and insert a new `pending` job.
///
/// Jobs without their own `max_retries` take the policy default current at
/// enqueue time; later policy changes do not touch them.
pub async fn enqueue(
    store: &dyn JobStore,
    policy: &dyn PolicySource,
    new: NewJob,
) -> Result<Job> {
    new.validate()?;
    let default_max_retries = policy.retry_policy().await?.max_retries;
    // Microseconds is the precision the database keeps.
    let job = new.into_job(default_max_retries, Utc::now().trunc_subsecs(6));

    store.insert(&job).await?;
    metrics::jobs_enqueued().add(1, &[]);
    info!(id = %job.id, max_retries = job.max_retries, "job enqueued");
    Ok(job)
}

/// Move a dead job back to `pending` with a fresh attempt budget.
///
/// The state check and the write are one conditional update, so a job that
/// a worker has already claimed is never pulled back.
pub async fn requeue_dead(store: &dyn JobStore, id: &JobId) -> Result<Job> {
    if !store.requeue_dead(id).await? {
        let job = store.get(id).await?;
        return Err(Error::InvalidTransition {
            from: job.state,
            to: State::Pending,
        });
    }

    metrics::jobs_requeued().add(1, &[]);
    info!(id = %id, "dead job requeued");

    store.get(id).await
}

/// Job counts per state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummary {
    counts: BTreeMap<State, u64>,
}

impl StatusSummary {
    pub fn count(&self, state: State) -> u64 {
        self.counts.get(&state).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for state in State::ALL {
            writeln!(f, "{:<12}{}", state.as_str(), self.count(state))?;
        }
        write!(f, "{:<12}{}", "total", self.total())
    }
}

pub async fn summary(store: &dyn JobStore) -> Result<StatusSummary> {
    Ok(StatusSummary {
        counts: store.count_by_state().await?,
    })
}
