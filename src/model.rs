//! Core data model.
//!
//! A job is a shell command waiting to be run. It has identity, a lifecycle
//! state, an attempt counter bounded by its own `max_retries`, and the last
//! failure text for dead-letter inspection.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A unit of work tracked by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier. Supplied by the caller or generated at enqueue.
    pub id: JobId,

    /// Shell command line. Opaque to the queue; only the executor looks at it.
    pub command: String,

    /// Current lifecycle state.
    pub state: State,

    /// Number of execution attempts so far.
    pub attempts: u32,

    /// Attempts allowed before the job goes dead. Fixed at enqueue.
    pub max_retries: u32,

    /// FIFO ordering key. Never changes, not even on retry.
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Most recent failure detail. Cleared on success and by a manual requeue.
    pub last_error: Option<String>,
}

/// Newtype for job IDs.
///
/// IDs are opaque strings so callers can bring their own; generated IDs
/// are UUID v4.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Waiting for a worker.
    Pending,
    /// Claimed by exactly one worker.
    Processing,
    /// Exited 0. Terminal.
    Completed,
    /// Exhausted its attempts. Terminal until requeued by an operator.
    Dead,
}

impl State {
    pub const ALL: [State; 4] = [
        State::Pending,
        State::Processing,
        State::Completed,
        State::Dead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            State::Pending => "pending",
            State::Processing => "processing",
            State::Completed => "completed",
            State::Dead => "dead",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(State::Pending),
            "processing" => Ok(State::Processing),
            "completed" => Ok(State::Completed),
            "dead" => Ok(State::Dead),
            _ => Err(Error::Other(format!("unknown state: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Operator-tunable retry settings. Stored alongside the jobs and re-read on
/// every retry decision, so changes apply to running workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Default `max_retries` for jobs enqueued without one.
    pub max_retries: u32,
    /// Backoff delay after attempt `n` is `backoff_base^n` time units.
    pub backoff_base: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 2,
        }
    }
}

impl RetryPolicy {
    /// Set a single policy value by its config key.
    pub fn set(&mut self, key: &str, value: u32) -> Result<()> {
        if value == 0 {
            return Err(Error::Config(format!("{key} must be at least 1")));
        }
        match key {
            "max_retries" => self.max_retries = value,
            "backoff_base" => self.backoff_base = value,
            _ => {
                return Err(Error::Config(format!(
                    "unknown config key '{key}' (expected max_retries or backoff_base)"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// Fields to overwrite on a stored job. `None` leaves a field untouched;
/// `last_error: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobUpdate {
    pub state: Option<State>,
    pub attempts: Option<u32>,
    pub last_error: Option<Option<String>>,
}

impl JobUpdate {
    pub fn state(state: State) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn last_error(mut self, last_error: Option<String>) -> Self {
        self.last_error = Some(last_error);
        self
    }

    /// Apply to an in-memory copy of the job.
    pub fn apply_to(&self, job: &mut Job, now: DateTime<Utc>) {
        if let Some(state) = self.state {
            job.state = state;
        }
        if let Some(attempts) = self.attempts {
            job.attempts = attempts;
        }
        if let Some(ref last_error) = self.last_error {
            job.last_error = last_error.clone();
        }
        job.updated_at = now;
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// A job to enqueue. The queue's public API for submitting work.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub(crate) id: Option<JobId>,
    pub(crate) command: String,
    pub(crate) max_retries: Option<u32>,
}

/// Wire shape of an enqueue request: `{"id"?, "command", "max_retries"?}`.
#[derive(Debug, Deserialize)]
struct EnqueuePayload {
    id: Option<String>,
    command: Option<String>,
    max_retries: Option<u32>,
}

impl NewJob {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            id: None,
            command: command.into(),
            max_retries: None,
        }
    }

    pub fn id(mut self, id: impl Into<JobId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Parse an enqueue request from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let payload: EnqueuePayload = serde_json::from_str(json.trim())
            .map_err(|e| Error::InvalidJob(format!("malformed job JSON: {e}")))?;

        let command = payload
            .command
            .ok_or_else(|| Error::InvalidJob("missing 'command' field".to_string()))?;

        let new = Self {
            id: payload.id.map(JobId),
            command,
            max_retries: payload.max_retries,
        };
        new.validate()?;
        Ok(new)
    }

    /// Reject input that must never become a job.
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(Error::InvalidJob("'command' must not be empty".to_string()));
        }
        if let Some(ref id) = self.id {
            if id.0.trim().is_empty() {
                return Err(Error::InvalidJob("'id' must not be empty".to_string()));
            }
        }
        if self.max_retries == Some(0) {
            return Err(Error::InvalidJob(
                "'max_retries' must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Materialize a pending job.
    pub(crate) fn into_job(self, default_max_retries: u32, now: DateTime<Utc>) -> Job {
        Job {
            id: self.id.unwrap_or_default(),
            command: self.command,
            state: State::Pending,
            attempts: 0,
            max_retries: self.max_retries.unwrap_or(default_max_retries),
            created_at: now,
            updated_at: now,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_str() {
        for state in State::ALL {
            assert_eq!(state.to_string().parse::<State>().unwrap(), state);
        }
        assert!("queued".parse::<State>().is_err());
    }

    #[test]
    fn from_json_accepts_minimal_payload() {
        let new = NewJob::from_json(r#"{"command":"echo hi"}"#).unwrap();
        assert_eq!(new.command, "echo hi");
        assert!(new.id.is_none());
        assert!(new.max_retries.is_none());
    }

    #[test]
    fn from_json_keeps_supplied_id_and_retries() {
        let new = NewJob::from_json(r#"{"id":"job1","command":"sleep 1","max_retries":5}"#)
            .unwrap();
        assert_eq!(new.id, Some(JobId::from("job1")));
        assert_eq!(new.max_retries, Some(5));
    }

    #[test]
    fn from_json_rejects_missing_command() {
        let err = NewJob::from_json(r#"{"id":"job1"}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidJob(_)), "got {err:?}");
    }

    #[test]
    fn from_json_rejects_garbage_and_blank_command() {
        assert!(matches!(
            NewJob::from_json("not json").unwrap_err(),
            Error::InvalidJob(_)
        ));
        assert!(matches!(
            NewJob::from_json(r#"{"command":"   "}"#).unwrap_err(),
            Error::InvalidJob(_)
        ));
        assert!(matches!(
            NewJob::from_json(r#"{"command":"true","max_retries":0}"#).unwrap_err(),
            Error::InvalidJob(_)
        ));
    }

    #[test]
    fn into_job_uses_policy_default_when_unset() {
        let now = Utc::now();
        let job = NewJob::new("true").into_job(7, now);
        assert_eq!(job.state, State::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_retries, 7);
        assert_eq!(job.created_at, job.updated_at);

        let job = NewJob::new("true").max_retries(2).into_job(7, now);
        assert_eq!(job.max_retries, 2);
    }

    #[test]
    fn policy_set_validates_keys_and_values() {
        let mut policy = RetryPolicy::default();
        policy.set("backoff_base", 3).unwrap();
        policy.set("max_retries", 5).unwrap();
        assert_eq!(
            policy,
            RetryPolicy {
                max_retries: 5,
                backoff_base: 3
            }
        );
        assert!(policy.set("backoff_base", 0).is_err());
        assert!(policy.set("color", 1).is_err());
    }

    #[test]
    fn partial_policy_json_falls_back_to_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"backoff_base":4}"#).unwrap();
        assert_eq!(policy.backoff_base, 4);
        assert_eq!(policy.max_retries, 3);
    }

    #[test]
    fn update_apply_clears_last_error() {
        let now = Utc::now();
        let mut job = NewJob::new("false").into_job(3, now);
        job.state = State::Dead;
        job.attempts = 3;
        job.last_error = Some("boom".to_string());

        JobUpdate::state(State::Pending)
            .attempts(0)
            .last_error(None)
            .apply_to(&mut job, now);

        assert_eq!(job.state, State::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.last_error, None);
    }
}
