use std::{path::PathBuf, time::Duration};

use chrono::{DateTime, Utc};
use clap::Parser;
use gammasdk::{
    chain::{
        self, RpcChain,
        blocks::{BlockResolver, Resolution},
    },
    config::Settings,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Unix timestamp, in seconds.
    #[arg(short, long, conflicts_with = "date", required_unless_present = "date")]
    timestamp: Option<u64>,
    /// RFC 3339 date, e.g. 2023-01-01T00:00:00Z.
    #[arg(short, long)]
    date: Option<DateTime<Utc>>,
    /// JSON settings file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// RPC url, overrides the settings file and RPC_URL.
    #[arg(short, long)]
    rpc_url: Option<String>,
    /// Search budget in seconds, overrides the settings file.
    #[arg(short, long)]
    budget: Option<u64>,
    /// Also print the average block time over this many blocks.
    #[arg(long, default_value_t = 500)]
    blocks_away: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let _ = simple_logger::init_with_level(log::Level::Debug);
    let args = Cli::parse();

    let settings = match &args.config {
        Some(path) => Settings::from_path(path)?,
        None => Settings::default(),
    };
    let rpc_url = args
        .rpc_url
        .or_else(|| std::env::var("RPC_URL").ok())
        .unwrap_or_else(|| settings.rpc_url.to_string());
    let budget = args
        .budget
        .map(Duration::from_secs)
        .unwrap_or_else(|| settings.search_budget());

    let rpc = RpcChain::new(chain::mainnet_with_url(&rpc_url).await?);
    let resolver = BlockResolver::new(&rpc).with_budget(budget);

    let resolution = match (args.timestamp, args.date) {
        (Some(timestamp), _) => resolver.resolve(timestamp).await?,
        (None, Some(date)) => resolver.resolve_datetime(date).await?,
        (None, None) => anyhow::bail!("either --timestamp or --date is required"),
    };

    match resolution {
        Resolution::Exact(block) => {
            println!("Block: {}", block.number);
            println!("Timestamp: {}", block.timestamp);
        }
        Resolution::BestEffort { block, target, queries } => {
            println!("Block: {} (best effort after {queries} queries)", block.number);
            println!("Timestamp: {} (target {target})", block.timestamp);
            println!("Discrepancy: {}s", resolution.discrepancy());
        }
    }
    if let Some(datetime) = resolution.block().datetime() {
        println!("Date: {}", datetime.to_rfc3339());
    }

    let block_time = resolver.average_block_time(args.blocks_away).await?;
    println!("Average block time: {block_time:.2}s");

    Ok(())
}
