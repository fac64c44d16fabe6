//! # queuectl
//!
//! Persistent background job queue for shell commands.
//!
//! Jobs live in a SQLite database shared by any number of worker processes.
//! Workers claim jobs with a conditional update, run them through the
//! platform shell, and retry failures with exponential backoff until a job
//! completes or lands in the dead-letter state for manual requeue.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod queue;
pub mod store;
pub mod telemetry;
