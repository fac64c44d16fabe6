//! Metric instrument factories.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`
//! (a no-op until telemetry is initialized with an endpoint).

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("queuectl")
}

/// Counter: jobs enqueued.
pub fn jobs_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("queuectl.jobs.enqueued")
        .with_description("Number of jobs enqueued")
        .build()
}

/// Counter: job state transitions.
/// Labels: `from`, `to`.
pub fn job_state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("queuectl.jobs.state_transitions")
        .with_description("Number of job state transitions")
        .build()
}

/// Counter: claims lost to a concurrent worker.
pub fn claim_races() -> Counter<u64> {
    meter()
        .u64_counter("queuectl.claims.lost")
        .with_description("Claims lost to a concurrent worker")
        .build()
}

/// Counter: dead jobs requeued by an operator.
pub fn jobs_requeued() -> Counter<u64> {
    meter()
        .u64_counter("queuectl.jobs.requeued")
        .with_description("Dead jobs moved back to pending")
        .build()
}

/// Histogram: command execution duration in milliseconds.
/// Labels: `outcome` ("success" | "failure").
pub fn execution_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("queuectl.jobs.execution_duration_ms")
        .with_description("Command execution duration in milliseconds")
        .with_unit("ms")
        .build()
}
