use std::sync::Arc;

use anyhow::{Context, Result};
use citizenly_storage::PgRegistry;
use citizenly_sync::{EngineConfig, ReconciliationJob};
use citizenly_web::AppState;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "citizenly")]
#[command(about = "Citizenly barangay registry service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the registry API, plus the reconciliation schedule when enabled
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Run one full reconciliation pass and print the totals
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let config = EngineConfig::from_env();
            let engine = citizenly_sync::engine_from_env(&config).await?;
            let job = Arc::new(ReconciliationJob::new(
                engine.clone(),
                config.reports_dir.clone(),
            ));
            if let Some(scheduler) =
                citizenly_sync::maybe_build_scheduler(&config, job.clone()).await?
            {
                scheduler.start().await.context("starting scheduler")?;
                info!(cron = %config.reconcile_cron, "reconciliation schedule active");
            }
            let port: u16 = std::env::var("CITIZENLY_WEB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000);
            info!(port, "serving registry API");
            citizenly_web::serve(AppState::new(engine, job), port).await?;
        }
        Commands::Migrate => {
            let config = EngineConfig::from_env();
            let registry = PgRegistry::connect(&config.database_url)
                .await
                .context("connecting to the registry database")?;
            registry.run_migrations().await?;
            println!("migrations applied");
        }
        Commands::Reconcile => {
            let summary = citizenly_sync::run_reconciliation_from_env().await?;
            println!(
                "reconciliation complete: run_id={} scanned={} inserted={} updated={} failed={} reports={}",
                summary.run_id,
                summary.scanned,
                summary.inserted,
                summary.updated,
                summary.failures.len(),
                summary.reports_dir
            );
        }
    }

    Ok(())
}
