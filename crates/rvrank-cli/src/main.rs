mod collect;
mod engagement;
mod output;
mod signal;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rvrank_core::Condition;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "rvrank")]
#[command(about = "Ranked marketplace listings and engagement stats")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Collect globally ranked listings for each zip and category
    Collect {
        /// Zip code to search around (repeatable)
        #[arg(long = "zip", required = true)]
        zips: Vec<String>,
        /// Category name from the categories file (repeatable; default: all)
        #[arg(long = "category")]
        categories: Vec<String>,
        /// Listing condition: N (new) or U (used)
        #[arg(long, default_value = "N")]
        condition: Condition,
        /// Search radius in miles
        #[arg(long, default_value_t = 50)]
        radius: u32,
        /// Output JSON file (default: output/ranked_listings_<timestamp>.json)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Fetch views and saves for previously collected listings
    Engagement {
        /// Ranked listings JSON (default: newest output/ranked_listings_*.json)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Only process the first N listings
        #[arg(long)]
        limit: Option<usize>,
        /// Start an interactive cookie refresh before fetching
        #[arg(long)]
        refresh_cookies: bool,
        /// Output JSON file (default: output/engagement_stats_<timestamp>.json)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    let config = rvrank_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(token.clone()));

    match cli.command {
        Commands::Collect {
            zips,
            categories,
            condition,
            radius,
            output,
        } => {
            let request = collect::CollectRequest {
                zips,
                categories,
                condition,
                radius,
                output,
            };
            collect::run_collect(&config, request, &token).await
        }
        Commands::Engagement {
            input,
            limit,
            refresh_cookies,
            output,
        } => {
            let request = engagement::EngagementRequest {
                input,
                limit,
                refresh_cookies,
                output,
            };
            engagement::run_engagement(&config, request, &token).await
        }
    }
}

async fn cancel_on_ctrl_c(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        return;
    }
    tracing::info!("ctrl-c received; cancelling");
    token.cancel();
}

#[cfg(test)]
mod tests;
