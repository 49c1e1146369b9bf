//! control-sync - framework ingestion service and operator CLI
//!
//! # Usage
//!
//! ```bash
//! # Run the scheduler and the REST API
//! DATABASE_URL=postgresql://localhost/controls control-sync serve
//!
//! # Ingest one framework now, ignoring its checkpoint
//! control-sync ingest fedramp-moderate --force
//!
//! # Show the effective source registry
//! CONTROL_SYNC_SOURCES=sources.yaml control-sync sources
//! ```
//!
//! Configuration is read from the environment (and `.env`), see
//! [`ServiceConfig::from_env`].

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use control_sync::api::{build_router, AppState};
use control_sync::{
    ControlStore, CycleMode, CycleOutcome, HttpSourceFetcher, IngestionPipeline,
    IngestionScheduler, MemoryControlStore, ServiceConfig,
};

#[derive(Parser)]
#[command(name = "control-sync")]
#[command(version)]
#[command(about = "Keeps compliance control frameworks in sync with their published sources")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the ingestion scheduler and the HTTP API
    Serve,

    /// Run one ingestion cycle for a single registered framework
    Ingest {
        /// Framework id from the source registry
        framework_id: String,

        /// Ignore the stored checkpoint and rewrite the control set
        #[arg(long)]
        force: bool,
    },

    /// Print the effective source registry
    Sources,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,control_sync=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ServiceConfig::from_env();

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Ingest {
            framework_id,
            force,
        } => ingest(config, &framework_id, force).await,
        Commands::Sources => print_sources(&config),
    }
}

async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    let registry = config
        .load_registry()
        .context("failed to load source registry")?;
    let store = open_store(&config).await?;
    let fetcher = Arc::new(HttpSourceFetcher::new(
        config.fetch_timeout,
        &config.user_agent,
    )?);

    let pipeline = Arc::new(IngestionPipeline::new(fetcher, Arc::clone(&store)));
    let scheduler = IngestionScheduler::new(pipeline, registry, config.cycle_timeout);
    let handle = scheduler.start();
    tracing::info!(frameworks = ?handle.framework_ids(), "Scheduler running");

    let app = build_router(AppState::new(store, config.max_upload_bytes));
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
    tracing::info!("control-sync listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Shutting down ingestion scheduler");
    handle.shutdown();
    handle.join().await;
    Ok(())
}

async fn ingest(config: ServiceConfig, framework_id: &str, force: bool) -> anyhow::Result<()> {
    let registry = config
        .load_registry()
        .context("failed to load source registry")?;
    let source = registry
        .get(framework_id)
        .with_context(|| format!("no registered source for framework '{framework_id}'"))?;

    let store = open_store(&config).await?;
    let fetcher = Arc::new(HttpSourceFetcher::new(
        config.fetch_timeout,
        &config.user_agent,
    )?);
    let pipeline = IngestionPipeline::new(fetcher, store);

    let mode = if force {
        CycleMode::Forced
    } else {
        CycleMode::Scheduled
    };
    let outcome = tokio::time::timeout(config.cycle_timeout, pipeline.run_cycle_with(source, mode))
        .await
        .context("ingestion cycle timed out")??;

    match outcome {
        CycleOutcome::Updated { control_count } => {
            println!("{framework_id}: stored {control_count} controls")
        }
        CycleOutcome::Unchanged => println!("{framework_id}: source unchanged"),
        CycleOutcome::ProbeFailed { reason } => {
            println!("{framework_id}: change probe failed ({reason}), nothing ingested")
        }
        CycleOutcome::ContentUnchanged => {
            println!("{framework_id}: payload identical to last ingestion")
        }
        CycleOutcome::EmptyParseSkipped { stored } => {
            println!("{framework_id}: parse found no controls, kept {stored} stored")
        }
    }
    Ok(())
}

fn print_sources(config: &ServiceConfig) -> anyhow::Result<()> {
    let registry = config
        .load_registry()
        .context("failed to load source registry")?;

    println!(
        "{:<24} {:<15} {:>10}  LOCATION",
        "FRAMEWORK", "FORMAT", "INTERVAL"
    );
    for source in registry.iter() {
        println!(
            "{:<24} {:<15} {:>9}s  {}",
            source.framework_id,
            source.format.to_string(),
            source.poll_interval.as_secs(),
            source.location
        );
    }
    Ok(())
}

#[cfg(feature = "database")]
async fn open_store(config: &ServiceConfig) -> anyhow::Result<Arc<dyn ControlStore>> {
    use control_sync::PgControlStore;
    use sqlx::postgres::PgPoolOptions;

    let Some(database_url) = &config.database_url else {
        tracing::info!("DATABASE_URL not set, using in-memory control store");
        return Ok(Arc::new(MemoryControlStore::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("failed to connect to database")?;
    tracing::info!("Connected to database");

    let store = PgControlStore::new(pool);
    store.ensure_schema().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "database"))]
async fn open_store(config: &ServiceConfig) -> anyhow::Result<Arc<dyn ControlStore>> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL is set but the 'database' feature is disabled, using in-memory control store");
    }
    Ok(Arc::new(MemoryControlStore::new()))
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("Shutdown signal received");
}
