//! Typed process configuration from environment variables.
//!
//! Loaded once at startup. The retry policy is not here: it lives in the
//! queue database so that running workers pick up changes.

pub mod secrets;

use crate::error::{Error, Result};
use secrecy::SecretString;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://queuectl.db";

#[derive(Debug)]
pub struct Config {
    /// SQLite URL of the shared queue database. May embed credentials for
    /// other backends, so it never reaches the logs.
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = non_empty(&lookup, "DATABASE_URL")?
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let log_level = non_empty(&lookup, "LOG_LEVEL")?.unwrap_or_else(|| "info".to_string());

        Ok(Self {
            database_url: SecretString::from(database_url),
            otel_endpoint: non_empty(&lookup, "OTEL_ENDPOINT")?,
            log_level,
        })
    }
}

/// An unset variable is `None`; a set-but-blank one is a mistake.
fn non_empty<F>(lookup: &F, name: &str) -> Result<Option<String>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if value.trim().is_empty() => Err(Error::Config(format!(
            "environment variable {name} is set but empty"
        ))),
        other => Ok(other),
    }
}
