//! queuectl CLI: operator interface to the job queue.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use queuectl::config::Config;
use queuectl::config::secrets::ExposeSecret;
use queuectl::db::Db;
use queuectl::engine::{WorkerConfig, WorkerPool};
use queuectl::model::{Job, JobId, NewJob, State};
use queuectl::queue;
use queuectl::store::{JobStore, PolicySource};
use queuectl::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "queuectl", about = "Persistent background job queue")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a job, e.g. '{"id":"job1","command":"sleep 2"}'
    Enqueue {
        /// Job JSON; read from stdin when omitted
        json: Option<String>,
    },
    /// List jobs
    List {
        /// Filter by state (pending, processing, completed, dead)
        #[arg(long)]
        state: Option<State>,
    },
    /// Show one job in full
    Show {
        /// Job ID
        id: String,
    },
    /// Worker operations
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },
    /// Dead-letter queue operations
    Dlq {
        #[command(subcommand)]
        action: DlqAction,
    },
    /// Retry policy
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Job counts per state
    Status,
}

#[derive(Subcommand)]
enum WorkerAction {
    /// Run workers in the foreground until Ctrl-C
    Start {
        /// Number of concurrent workers
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Poll interval when the queue is empty, in milliseconds
        #[arg(long, default_value_t = 1000)]
        idle_ms: u64,
        /// Exit once no pending job is left
        #[arg(long)]
        drain: bool,
    },
}

#[derive(Subcommand)]
enum DlqAction {
    /// List dead jobs
    List,
    /// Move a dead job back to pending with a fresh attempt budget
    Retry {
        /// Job ID
        id: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set max_retries or backoff_base
    Set { key: String, value: u32 },
    /// Print the current retry policy
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Only long-running workers log; one-shot commands print results.
    let _guard = if matches!(cli.command, Command::Worker { .. }) {
        Some(init_telemetry(TelemetryConfig {
            endpoint: config.otel_endpoint.clone(),
            service_name: "queuectl".to_string(),
            log_level: config.log_level.clone(),
        })?)
    } else {
        None
    };

    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;

    match cli.command {
        Command::Enqueue { json } => cmd_enqueue(&db, json).await,
        Command::List { state } => cmd_list(&db, state).await,
        Command::Show { id } => cmd_show(&db, id).await,
        Command::Worker {
            action:
                WorkerAction::Start {
                    count,
                    idle_ms,
                    drain,
                },
        } => cmd_worker_start(db, count, idle_ms, drain).await,
        Command::Dlq { action } => match action {
            DlqAction::List => cmd_list(&db, Some(State::Dead)).await,
            DlqAction::Retry { id } => cmd_dlq_retry(&db, id).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Set { key, value } => cmd_config_set(&db, &key, value).await,
            ConfigAction::Show => cmd_config_show(&db).await,
        },
        Command::Status => cmd_status(&db).await,
    }
}

async fn cmd_enqueue(db: &Db, json: Option<String>) -> anyhow::Result<()> {
    let json = match json {
        Some(json) => json,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let job = queue::enqueue(db, db, NewJob::from_json(&json)?).await?;
    println!(
        "Enqueued: {} (state: {}, max_retries: {})",
        job.id, job.state, job.max_retries
    );
    Ok(())
}

async fn cmd_list(db: &Db, state: Option<State>) -> anyhow::Result<()> {
    let jobs = db.list_by_state(state).await?;
    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }
    print_table(&jobs);
    Ok(())
}

fn print_table(jobs: &[Job]) {
    println!(
        "{:<36}  {:<10}  {:<8}  {:<16}  COMMAND",
        "ID", "STATE", "ATTEMPTS", "CREATED"
    );
    println!("{}", "-".repeat(100));

    for job in jobs {
        let command: String = job.command.chars().take(40).collect();
        println!(
            "{:<36}  {:<10}  {:<8}  {:<16}  {}",
            job.id.as_str(),
            job.state.as_str(),
            format!("{}/{}", job.attempts, job.max_retries),
            job.created_at.format("%Y-%m-%d %H:%M"),
            command
        );
    }

    println!("\n{} job(s)", jobs.len());
}

async fn cmd_show(db: &Db, id: String) -> anyhow::Result<()> {
    let job = db.get(&JobId::from(id)).await?;

    println!("ID:          {}", job.id);
    println!("Command:     {}", job.command);
    println!("State:       {}", job.state);
    println!("Attempts:    {}", job.attempts);
    println!("Max Retries: {}", job.max_retries);
    println!("Created:     {}", job.created_at);
    println!("Updated:     {}", job.updated_at);
    if let Some(ref err) = job.last_error {
        println!("---");
        println!("Last Error:  {err}");
    }
    Ok(())
}

async fn cmd_worker_start(db: Db, count: usize, idle_ms: u64, drain: bool) -> anyhow::Result<()> {
    let db = Arc::new(db);
    let pool = WorkerPool::new(
        db.clone(),
        db,
        WorkerConfig {
            idle_interval: Duration::from_millis(idle_ms),
            drain,
            ..WorkerConfig::default()
        },
    );

    let stop = pool.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("stop requested, finishing in-flight jobs");
        stop.shutdown();
    });

    pool.run(count).await?;
    Ok(())
}

async fn cmd_dlq_retry(db: &Db, id: String) -> anyhow::Result<()> {
    let job = queue::requeue_dead(db, &JobId::from(id)).await?;
    println!("Requeued: {} (state: {})", job.id, job.state);
    Ok(())
}

async fn cmd_config_set(db: &Db, key: &str, value: u32) -> anyhow::Result<()> {
    let policy = db.set_policy_value(key, value).await?;
    println!("{key} = {value}");
    println!(
        "policy: max_retries={}, backoff_base={}",
        policy.max_retries, policy.backoff_base
    );
    Ok(())
}

async fn cmd_config_show(db: &Db) -> anyhow::Result<()> {
    let policy = db.retry_policy().await?;
    println!("max_retries   {}", policy.max_retries);
    println!("backoff_base  {}", policy.backoff_base);
    Ok(())
}

async fn cmd_status(db: &Db) -> anyhow::Result<()> {
    println!("{}", queue::summary(db).await?);
    Ok(())
}
