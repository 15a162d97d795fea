//! CLI type definitions.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "scheduler")]
#[command(about = "A durable, recurring, prioritized task scheduler", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a new task
    Submit {
        /// Handler namespace, e.g. "demo"
        namespace: String,
        /// Handler entrypoint within the namespace, e.g. "echo"
        entrypoint: String,
        /// Optional JSON payload handed to the handler
        #[arg(short, long)]
        payload: Option<String>,
        /// Priority queue this task is submitted to (lower runs first by convention)
        #[arg(long, default_value_t = 0)]
        priority: i64,
        /// Delay, in seconds, before the task becomes due. Defaults to immediately due.
        #[arg(long, default_value_t = 0)]
        delay_secs: i64,
        /// Cron expression driving recurrence; omit for a one-shot task
        #[arg(long)]
        expression: Option<String>,
        /// Maximum attempts before a failure becomes terminal
        #[arg(long)]
        maximum_attempts: Option<u32>,
        /// Maximum runtime for a single attempt, in milliseconds
        #[arg(long)]
        maximum_runtime_ms: Option<u64>,
    },
    /// List recently submitted tasks
    List {
        /// Maximum number of results
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Show a single task's details
    Show {
        /// Task id
        id: String,
    },
    /// Start the poll loop and run until Ctrl-C
    Run,
}
