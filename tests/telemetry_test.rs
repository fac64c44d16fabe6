//! Integration tests for telemetry initialization and span helpers.

use queuectl::model::{JobId, State};
use queuectl::telemetry::job::{record_state_transition, start_job_span};
use queuectl::telemetry::{TelemetryConfig, init_telemetry};

#[test]
fn telemetry_initializes_without_endpoint() {
    let config = TelemetryConfig {
        endpoint: None,
        service_name: "queuectl-test".to_string(),
        log_level: "info".to_string(),
    };
    // A global subscriber can be installed once per process; a second
    // attempt from another test reports an error instead of panicking.
    if let Ok(guard) = init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn invalid_log_filter_is_a_config_error() {
    let result = init_telemetry(TelemetryConfig {
        endpoint: None,
        service_name: "queuectl-test".to_string(),
        log_level: "queuectl=notalevel".to_string(),
    });
    // RUST_LOG, when set, takes precedence over the configured level.
    if std::env::var("RUST_LOG").is_err() {
        assert!(result.is_err());
    }
}

#[test]
fn job_span_records_transitions() {
    let id = JobId::from("span-test");
    let span = start_job_span(&id, "test-0");
    record_state_transition(&span, State::Pending, State::Processing, 0);
    record_state_transition(&span, State::Processing, State::Completed, 1);
}
