//! Scheduler CLI entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use scheduler::adapters::sqlite::{initialize_database, SqliteStore};
use scheduler::adapters::type_resolver::InProcessTypeResolver;
use scheduler::cli::commands;
use scheduler::cli::demo_handlers;
use scheduler::cli::{Cli, Commands};
use scheduler::domain::ports::{Store, TypeResolver};
use scheduler::infrastructure::config::ConfigLoader;
use scheduler::infrastructure::logging::LoggerImpl;
use scheduler::services::{
    exponential_backoff, Control, ControlSettings, CronOracle, Executor, HandlerRegistry, Submitter,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::load().context("failed to load configuration")?;
    let _logger = LoggerImpl::init(&config.logging).context("failed to initialize logger")?;

    let pool = initialize_database(&config.database_url)
        .await
        .context("failed to connect to database")?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
    let sqlite_store = SqliteStore::new(pool);

    let resolver = InProcessTypeResolver::new();
    demo_handlers::register(&resolver);
    let resolver: Arc<dyn TypeResolver> = Arc::new(resolver);

    let registry = Arc::new(HandlerRegistry::new(Arc::clone(&resolver)));
    let oracle: Arc<dyn scheduler::services::OccurrenceOracle> = Arc::new(CronOracle);
    let interval_fn = exponential_backoff(config.backoff_base(), config.backoff_cap());

    let executor = Arc::new(Executor::new(
        Arc::clone(&registry),
        Arc::clone(&store),
        Arc::clone(&oracle),
        Arc::clone(&interval_fn),
    ));

    let submitter = Submitter::new(
        config.delay_tasks,
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&oracle),
        Arc::clone(&interval_fn),
    );

    match cli.command {
        Commands::Submit {
            namespace,
            entrypoint,
            payload,
            priority,
            delay_secs,
            expression,
            maximum_attempts,
            maximum_runtime_ms,
        } => {
            commands::handle_submit(
                &submitter,
                namespace,
                entrypoint,
                payload,
                priority,
                delay_secs,
                expression,
                maximum_attempts,
                maximum_runtime_ms,
                cli.json,
            )
            .await?;
        }
        Commands::List { limit } => {
            commands::handle_list(&sqlite_store, limit, cli.json).await?;
        }
        Commands::Show { id } => {
            commands::handle_show(&sqlite_store, &id, cli.json).await?;
        }
        Commands::Run => {
            let control = Control::new(
                store,
                executor,
                ControlSettings {
                    concurrency: config.concurrency,
                    sleep_interval: config.sleep_interval(),
                    read_ahead: config.read_ahead,
                    worker_id: config.worker_id.clone(),
                },
            );
            commands::handle_run(&control).await?;
        }
    }

    Ok(())
}
