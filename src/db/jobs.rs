//! Job persistence: insert, claim with compare-and-swap, owner writes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use super::{Db, from_db_timestamp, to_db_timestamp};
use crate::error::{Error, Result};
use crate::model::{Job, JobId, JobUpdate, State};
use crate::store::{Claim, JobStore, zeroed_counts};
use crate::telemetry::metrics;

const JOB_COLUMNS: &str =
    "id, command, state, attempts, max_retries, created_at, updated_at, last_error";

impl Db {
    /// The claim primitive: move one job from `pending` to `processing`
    /// if and only if it is still pending. Exactly one concurrent caller
    /// per job sees `true`.
    pub async fn try_claim(&self, id: &JobId, now: DateTime<Utc>) -> Result<bool> {
        let rows_affected = sqlx::query(
            "UPDATE jobs SET state = 'processing', updated_at = ?1
             WHERE id = ?2 AND state = 'pending'",
        )
        .bind(to_db_timestamp(now))
        .bind(id.as_str())
        .execute(self.pool())
        .await?
        .rows_affected();

        Ok(rows_affected == 1)
    }
}

#[async_trait]
impl JobStore for Db {
    async fn insert(&self, job: &Job) -> Result<()> {
        sqlx::query(
            "INSERT INTO jobs (id, command, state, attempts, max_retries, created_at, updated_at, last_error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(job.id.as_str())
        .bind(&job.command)
        .bind(job.state.as_str())
        .bind(i64::from(job.attempts))
        .bind(i64::from(job.max_retries))
        .bind(to_db_timestamp(job.created_at))
        .bind(to_db_timestamp(job.updated_at))
        .bind(&job.last_error)
        .execute(self.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Error::DuplicateJob(job.id.to_string())
            }
            e => Error::Storage(e),
        })?;
        Ok(())
    }

    async fn claim_next_pending(&self) -> Result<Claim> {
        // Selection and the conditional write are separate autocommit
        // statements. Only the write decides ownership.
        let candidate: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE state = 'pending'
             ORDER BY created_at ASC, rowid ASC
             LIMIT 1"
        ))
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = candidate else {
            return Ok(Claim::Empty);
        };

        let mut job = row.try_into_job()?;
        let now = Utc::now().trunc_subsecs(6);
        if !self.try_claim(&job.id, now).await? {
            debug!(job.id = %job.id, "claim lost to a concurrent worker");
            metrics::claim_races().add(1, &[]);
            return Ok(Claim::Lost);
        }

        job.state = State::Processing;
        job.updated_at = now;
        Ok(Claim::Claimed(job))
    }

    async fn persist(&self, id: &JobId, update: &JobUpdate) -> Result<()> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE jobs SET ");
        let mut fields = query.separated(", ");
        if let Some(state) = update.state {
            fields.push("state = ").push_bind_unseparated(state.as_str());
        }
        if let Some(attempts) = update.attempts {
            fields
                .push("attempts = ")
                .push_bind_unseparated(i64::from(attempts));
        }
        if let Some(ref last_error) = update.last_error {
            fields
                .push("last_error = ")
                .push_bind_unseparated(last_error.clone());
        }
        fields
            .push("updated_at = ")
            .push_bind_unseparated(to_db_timestamp(Utc::now()));
        query.push(" WHERE id = ").push_bind(id.0.clone());

        let rows_affected = query
            .build()
            .execute(self.pool())
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn requeue_dead(&self, id: &JobId) -> Result<bool> {
        let rows_affected = sqlx::query(
            "UPDATE jobs SET state = 'pending', attempts = 0, last_error = NULL, updated_at = ?1
             WHERE id = ?2 AND state = 'dead'",
        )
        .bind(to_db_timestamp(Utc::now()))
        .bind(id.as_str())
        .execute(self.pool())
        .await?
        .rows_affected();

        Ok(rows_affected == 1)
    }

    async fn get(&self, id: &JobId) -> Result<Job> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))
                .bind(id.as_str())
                .fetch_optional(self.pool())
                .await?;

        row.ok_or_else(|| Error::NotFound(id.to_string()))?
            .try_into_job()
    }

    async fn list_by_state(&self, state: Option<State>) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE ?1 IS NULL OR state = ?1
             ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(state.map(State::as_str))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(JobRow::try_into_job).collect()
    }

    async fn count_by_state(&self) -> Result<BTreeMap<State, u64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(self.pool())
                .await?;

        let mut counts = zeroed_counts();
        for (state, count) in rows {
            counts.insert(state.parse()?, count as u64);
        }
        Ok(counts)
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    command: String,
    state: String,
    attempts: i64,
    max_retries: i64,
    created_at: String,
    updated_at: String,
    last_error: Option<String>,
}

impl JobRow {
    fn try_into_job(self) -> Result<Job> {
        Ok(Job {
            id: JobId(self.id),
            command: self.command,
            state: self.state.parse()?,
            attempts: u32::try_from(self.attempts)
                .map_err(|_| Error::Other(format!("invalid attempts: {}", self.attempts)))?,
            max_retries: u32::try_from(self.max_retries)
                .map_err(|_| Error::Other(format!("invalid max_retries: {}", self.max_retries)))?,
            created_at: from_db_timestamp("created_at", &self.created_at)?,
            updated_at: from_db_timestamp("updated_at", &self.updated_at)?,
            last_error: self.last_error,
        })
    }
}
