//! Retry decisions: what to persist after one execution.
//!
//! Pure function of the job, the execution outcome, and the policy that is
//! current at decision time. The worker writes the result and, for a retry,
//! waits out the backoff before claiming again.

use std::time::Duration;

use crate::model::{Job, JobUpdate, RetryPolicy, State};

use super::backoff::delay_for;
use super::executor::ExecOutcome;

/// Next step for a job that just finished an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Exit 0.
    Complete { attempts: u32 },
    /// Failed with attempts to spare. Back to pending after `delay`.
    Retry {
        attempts: u32,
        last_error: String,
        delay: Duration,
    },
    /// Failed on its last allowed attempt.
    Dead { attempts: u32, last_error: String },
}

impl Decision {
    pub fn next_state(&self) -> State {
        match self {
            Decision::Complete { .. } => State::Completed,
            Decision::Retry { .. } => State::Pending,
            Decision::Dead { .. } => State::Dead,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Decision::Complete { attempts }
            | Decision::Retry { attempts, .. }
            | Decision::Dead { attempts, .. } => *attempts,
        }
    }

    /// Delay the worker waits before its next claim. Zero unless retrying.
    pub fn backoff(&self) -> Duration {
        match self {
            Decision::Retry { delay, .. } => *delay,
            _ => Duration::ZERO,
        }
    }

    /// The write that records this decision.
    pub fn to_update(&self) -> JobUpdate {
        let update = JobUpdate::state(self.next_state()).attempts(self.attempts());
        match self {
            Decision::Complete { .. } => update.last_error(None),
            Decision::Retry { last_error, .. } | Decision::Dead { last_error, .. } => {
                update.last_error(Some(last_error.clone()))
            }
        }
    }
}

/// Decide what happens to `job` after `outcome`.
///
/// `job.attempts` is the count before this attempt. `unit` is the length of
/// one backoff time unit (one second in production).
pub fn decide(job: &Job, outcome: &ExecOutcome, policy: &RetryPolicy, unit: Duration) -> Decision {
    let attempts = job.attempts.saturating_add(1);

    if outcome.success() {
        return Decision::Complete { attempts };
    }

    let last_error = failure_text(outcome);
    if attempts >= job.max_retries {
        Decision::Dead {
            attempts,
            last_error,
        }
    } else {
        Decision::Retry {
            attempts,
            last_error,
            delay: delay_for(attempts, policy.backoff_base, unit),
        }
    }
}

/// Trimmed stderr, or a generic line naming the exit code when the command
/// wrote nothing.
fn failure_text(outcome: &ExecOutcome) -> String {
    let stderr = outcome.stderr.trim();
    if stderr.is_empty() {
        format!("command exited with status {}", outcome.exit_code)
    } else {
        stderr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewJob;
    use chrono::Utc;
    use proptest::prelude::*;

    const SECOND: Duration = Duration::from_secs(1);

    fn job(attempts: u32, max_retries: u32) -> Job {
        let mut job = NewJob::new("false").id("retry-test").into_job(max_retries, Utc::now());
        job.attempts = attempts;
        job
    }

    fn failed(code: i32, stderr: &str) -> ExecOutcome {
        ExecOutcome {
            exit_code: code,
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn success_completes_and_clears_error() {
        let ok = failed(0, "");
        let decision = decide(&job(2, 3), &ok, &RetryPolicy::default(), SECOND);
        assert_eq!(decision, Decision::Complete { attempts: 3 });
        assert_eq!(
            decision.to_update(),
            JobUpdate::state(State::Completed)
                .attempts(3)
                .last_error(None)
        );
        assert_eq!(decision.backoff(), Duration::ZERO);
    }

    #[test]
    fn failure_with_attempts_left_retries_after_backoff() {
        let decision = decide(&job(0, 3), &failed(1, "boom\n"), &RetryPolicy::default(), SECOND);
        assert_eq!(
            decision,
            Decision::Retry {
                attempts: 1,
                last_error: "boom".to_string(),
                delay: Duration::from_secs(2),
            }
        );
        assert_eq!(decision.next_state(), State::Pending);
    }

    #[test]
    fn second_failure_waits_base_squared() {
        let decision = decide(&job(1, 3), &failed(1, "x"), &RetryPolicy::default(), SECOND);
        assert_eq!(decision.backoff(), Duration::from_secs(4));
    }

    #[test]
    fn last_allowed_attempt_goes_dead() {
        let decision = decide(&job(2, 3), &failed(2, ""), &RetryPolicy::default(), SECOND);
        assert_eq!(
            decision,
            Decision::Dead {
                attempts: 3,
                last_error: "command exited with status 2".to_string(),
            }
        );
        assert_eq!(decision.backoff(), Duration::ZERO);
    }

    #[test]
    fn single_attempt_job_goes_dead_on_first_failure() {
        let decision = decide(&job(0, 1), &failed(1, "nope"), &RetryPolicy::default(), SECOND);
        assert_eq!(decision.next_state(), State::Dead);
        assert_eq!(decision.attempts(), 1);
    }

    #[test]
    fn backoff_uses_the_current_policy_base() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_base: 3,
        };
        let decision = decide(&job(1, 5), &failed(1, "x"), &policy, SECOND);
        assert_eq!(decision.backoff(), Duration::from_secs(9));
    }

    #[test]
    fn job_max_retries_wins_over_policy_default() {
        let policy = RetryPolicy {
            max_retries: 1,
            backoff_base: 2,
        };
        let decision = decide(&job(0, 4), &failed(1, "x"), &policy, SECOND);
        assert_eq!(decision.next_state(), State::Pending);
    }

    proptest! {
        /// However a run of failures plays out, the job dies at exactly
        /// `max_retries` attempts.
        #[test]
        fn failures_never_exceed_max_retries(max_retries in 1u32..20) {
            let policy = RetryPolicy::default();
            let mut current = job(0, max_retries);
            loop {
                let decision = decide(&current, &failed(1, "x"), &policy, Duration::from_millis(1));
                prop_assert!(decision.attempts() <= max_retries);
                if decision.next_state() == State::Dead {
                    prop_assert_eq!(decision.attempts(), max_retries);
                    break;
                }
                current.attempts = decision.attempts();
            }
        }
    }
}
