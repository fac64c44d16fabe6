use std::collections::HashMap;

use queuectl::config::Config;
use queuectl::config::secrets::ExposeSecret;
use queuectl::error::Error;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn config_defaults_when_nothing_is_set() {
    let config = Config::from_lookup(lookup(&[])).unwrap();
    assert_eq!(config.database_url.expose_secret(), "sqlite://queuectl.db");
    assert_eq!(config.log_level, "info");
    assert!(config.otel_endpoint.is_none());
}

#[test]
fn config_reads_all_fields() {
    let config = Config::from_lookup(lookup(&[
        ("DATABASE_URL", "sqlite:///var/lib/queuectl/jobs.db"),
        ("OTEL_ENDPOINT", "http://localhost:4317"),
        ("LOG_LEVEL", "queuectl=debug"),
    ]))
    .unwrap();

    assert_eq!(
        config.database_url.expose_secret(),
        "sqlite:///var/lib/queuectl/jobs.db"
    );
    assert_eq!(config.otel_endpoint.as_deref(), Some("http://localhost:4317"));
    assert_eq!(config.log_level, "queuectl=debug");
}

#[test]
fn config_rejects_blank_variables() {
    let err = Config::from_lookup(lookup(&[("DATABASE_URL", "  ")])).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}

#[test]
fn config_debug_does_not_leak_database_url() {
    let config = Config::from_lookup(lookup(&[(
        "DATABASE_URL",
        "postgres://user:hunter2@db/queue",
    )]))
    .unwrap();
    assert!(!format!("{config:?}").contains("hunter2"));
}
