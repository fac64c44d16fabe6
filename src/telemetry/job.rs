//! Job execution span helpers.

use opentelemetry::KeyValue;
use tracing::Span;

use crate::model::{JobId, State};
use crate::telemetry::metrics;

/// Start a span covering one claimed job, from execution to the final write.
///
/// `job.state` and `job.attempts` are declared empty and filled in by
/// [`record_state_transition`].
pub fn start_job_span(job_id: &JobId, worker: &str) -> Span {
    tracing::info_span!(
        "job.execute",
        "job.id" = %job_id,
        "worker" = worker,
        "job.state" = tracing::field::Empty,
        "job.attempts" = tracing::field::Empty,
    )
}

/// Record a state transition on the span and count it.
pub fn record_state_transition(span: &Span, from: State, to: State, attempts: u32) {
    span.record("job.state", to.as_str());
    span.record("job.attempts", attempts);
    span.in_scope(|| {
        tracing::debug!(from = from.as_str(), to = to.as_str(), "state_transition");
    });
    metrics::job_state_transitions().add(
        1,
        &[
            KeyValue::new("from", from.as_str()),
            KeyValue::new("to", to.as_str()),
        ],
    );
}
