//! Print the newest stored funding rates or the latest analysis snapshot
use anyhow::Result;
use clap::Parser;

use funding_collector::database::RateStore;
use funding_collector::models::{AnalysisSnapshot, Config, FundingRate};
use funding_collector::retention::{RetentionPolicy, SnapshotStore};

#[derive(Parser)]
#[command(name = "latest_rates", about = "📈 Show the latest funding rates")]
struct Cli {
    /// Number of rows to show
    #[arg(long, short, default_value_t = 20)]
    limit: i64,

    /// Show every stored row
    #[arg(long)]
    all: bool,

    /// Show the latest analysis snapshot instead of raw rows
    #[arg(long)]
    snapshot: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    if cli.snapshot {
        let store = SnapshotStore::new(
            config.snapshot_dir.clone(),
            RetentionPolicy {
                max_history_items: config.history_limit,
            },
        );
        match store.get_latest().await? {
            Some(snapshot) => print_snapshot(&snapshot),
            None => println!("📭 No snapshots in {}", config.snapshot_dir.display()),
        }
        return Ok(());
    }

    let store = RateStore::new(&config.database_path).await?;
    let limit = if cli.all { None } else { Some(cli.limit) };
    let rates = store.latest_rates(limit).await?;

    if rates.is_empty() {
        println!("📭 No funding rates stored in {}", config.database_path);
        return Ok(());
    }

    println!("📈 Latest funding rates ({} of {} rows)", rates.len(), store.count().await?);
    println!("══════════════════════════════════════════════════════════════");
    print_rates(&rates);
    Ok(())
}

fn print_rates(rates: &[FundingRate]) {
    println!("{:<10} {:<12} {:>12} {:<10} {}", "ASSET", "EXCHANGE", "RATE %", "DIRECTION", "TIMESTAMP");
    for rate in rates {
        println!(
            "{:<10} {:<12} {:>12.4} {:<10} {}",
            rate.asset,
            rate.exchange,
            rate.rate * 100.0,
            rate.direction.as_str(),
            rate.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

fn print_snapshot(snapshot: &AnalysisSnapshot) {
    let stats = &snapshot.statistics;
    println!("📸 Snapshot from {}", snapshot.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("══════════════════════════════════════════════════════════════");
    println!(
        "   {} rates ({} positive, {} negative) across {} assets on {} exchanges",
        stats.total_rates, stats.positive_rates, stats.negative_rates, stats.assets, stats.exchanges
    );
    println!("   Average rate: {:.4}%", stats.average_rate * 100.0);
    println!();
    println!("🏆 Top opportunities:");
    print_rates(&snapshot.top_opportunities);
}
