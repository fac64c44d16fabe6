//! Worker engine: execute claimed jobs, decide retries, run worker pools.

pub mod backoff;
pub mod executor;
pub mod pool;
pub mod retry;
pub mod worker;

pub use executor::{ExecOutcome, Executor, ShellExecutor};
pub use pool::WorkerPool;
pub use retry::{Decision, decide};
pub use worker::{Step, Worker, WorkerConfig};
