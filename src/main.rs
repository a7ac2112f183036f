use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use funding_collector::database::RateStore;
use funding_collector::models::Config;
use funding_collector::pipeline::{build_jobs, register_jobs};
use funding_collector::retention::{RetentionPolicy, SnapshotStore};
use funding_collector::scheduler::{Orchestrator, OrchestratorOptions};
use funding_collector::utils::{init_logging, spawn_shutdown_listener};

#[derive(Parser)]
#[command(
    name = "funding-collector",
    about = "🔄 Funding rate collector",
    long_about = "Polls every enabled exchange on its own schedule, stores normalized funding rates in SQLite and keeps a bounded history of analysis snapshots."
)]
struct Cli {
    /// Print the job status table every tick
    #[arg(long, short)]
    status: bool,

    /// Debug-level logging
    #[arg(long, short)]
    verbose: bool,

    /// Run a single tick, then exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("❌ Configuration Error: {}", e);
            eprintln!("Check your .env file; COINGLASS_API_KEY is required when coinglass is enabled.");
            std::process::exit(1);
        }
    };

    info!("🚀 Starting funding collector");
    info!(
        "📋 Sources: {}",
        config
            .enabled_sources
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let store = RateStore::new(&config.database_path).await?;
    info!("💾 Database initialized at: {}", config.database_path);

    let snapshots = Arc::new(SnapshotStore::new(
        config.snapshot_dir.clone(),
        RetentionPolicy {
            max_history_items: config.history_limit,
        },
    ));

    let mut orchestrator = Orchestrator::new(OrchestratorOptions {
        print_status: cli.status,
        ..OrchestratorOptions::default()
    });
    register_jobs(&mut orchestrator, build_jobs(&config, store, snapshots)?)?;

    if cli.once {
        let report = orchestrator.tick().await;
        println!("{}", orchestrator.render_status(orchestrator.now()));
        if !report.failed.is_empty() {
            eprintln!("❌ Failed jobs: {}", report.failed.join(", "));
            std::process::exit(1);
        }
        return Ok(());
    }

    let shutdown = spawn_shutdown_listener();
    orchestrator.run(shutdown).await;

    println!("Thanks for using the funding collector!");
    Ok(())
}
