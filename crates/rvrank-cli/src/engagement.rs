//! `rvrank engagement`: views and saves for a collected listings file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use rust_decimal::Decimal;
use rvrank_core::{AppConfig, ListingRecord};
use rvrank_engagement::{
    BatchConfig, CookieCache, CredentialStore, CredentialValidator, EngagementClient,
    RefreshConfig, RefreshCoordinator, StatResult,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::output;
use crate::signal::TerminalRefreshSignal;

pub(crate) struct EngagementRequest {
    pub input: Option<PathBuf>,
    pub limit: Option<usize>,
    pub refresh_cookies: bool,
    pub output: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ListingsFile {
    listings: Vec<ListingRecord>,
}

/// One output row: the listing's ranking signals next to its stats.
#[derive(Debug, Serialize)]
pub(crate) struct EngagementRow<'a> {
    pub id: &'a str,
    pub rank: u32,
    pub merch_score: Option<f64>,
    pub relevance_score: Option<f64>,
    pub is_premium: bool,
    pub is_top_premium: bool,
    pub photo_count: u32,
    pub has_floorplan: bool,
    pub price: Option<Decimal>,
    pub make: Option<&'a str>,
    pub model: Option<&'a str>,
    pub year: Option<i32>,
    pub listing_url: Option<&'a str>,
    pub views: Option<u64>,
    pub saves: Option<i64>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub fetch_success: bool,
    pub fetch_error: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct EngagementOutput<'a> {
    timestamp: DateTime<Local>,
    source_file: String,
    count: usize,
    success_count: usize,
    results: Vec<EngagementRow<'a>>,
}

pub(crate) fn build_rows<'a>(
    listings: &'a [ListingRecord],
    stats: &'a BTreeMap<String, StatResult>,
) -> Vec<EngagementRow<'a>> {
    listings
        .iter()
        .map(|listing| {
            let stat = stats.get(&listing.id);
            EngagementRow {
                id: &listing.id,
                rank: listing.rank,
                merch_score: listing.merch_score,
                relevance_score: listing.relevance_score,
                is_premium: listing.is_premium,
                is_top_premium: listing.is_top_premium,
                photo_count: listing.photo_count,
                has_floorplan: listing.has_floorplan(),
                price: listing.price,
                make: listing.make.as_deref(),
                model: listing.model.as_deref(),
                year: listing.year,
                listing_url: listing.listing_url.as_deref(),
                views: stat.and_then(|s| s.views),
                saves: stat.and_then(|s| s.saves),
                fetched_at: stat.map(|s| s.fetched_at),
                fetch_success: stat.is_some_and(StatResult::is_success),
                fetch_error: match stat {
                    Some(s) => s.error.as_deref(),
                    None => Some("not fetched"),
                },
            }
        })
        .collect()
}

/// `min=…, max=…, avg=…` over the present values, `None` if there are none.
pub(crate) fn summarize<I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = i64>,
{
    let values: Vec<i64> = values.into_iter().collect();
    let min = values.iter().min()?;
    let max = values.iter().max()?;
    #[allow(clippy::cast_precision_loss)]
    let avg = values.iter().sum::<i64>() as f64 / values.len() as f64;
    Some(format!("min={min}, max={max}, avg={avg:.1}"))
}

fn read_listings(path: &Path, limit: Option<usize>) -> anyhow::Result<Vec<ListingRecord>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut file: ListingsFile = serde_json::from_str(&content)
        .with_context(|| format!("parsing listings from {}", path.display()))?;
    if let Some(limit) = limit {
        file.listings.truncate(limit);
    }
    Ok(file.listings)
}

fn stats_client(config: &AppConfig) -> anyhow::Result<EngagementClient> {
    EngagementClient::from_app_config(config).context("failed to build stats client")
}

/// Fetches stats for every listing in the input file and writes the rows.
///
/// # Errors
///
/// Returns an error if the input cannot be found or read, no usable
/// credential can be obtained, the run is cancelled, or the output cannot be
/// written. Per-listing failures are recorded in the output instead.
pub(crate) async fn run_engagement(
    config: &AppConfig,
    request: EngagementRequest,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    let input = match request.input {
        Some(path) => path,
        None => output::latest_with_prefix(Path::new(output::OUTPUT_DIR), "ranked_listings")?
            .context("no output/ranked_listings_*.json found; run `rvrank collect` or pass --input")?,
    };
    let listings = read_listings(&input, request.limit)?;
    if listings.is_empty() {
        anyhow::bail!("{} contains no listings", input.display());
    }
    println!(
        "Fetching engagement data for {} listings from {}",
        listings.len(),
        input.display()
    );

    let ids: Vec<String> = listings.iter().map(|l| l.id.clone()).collect();
    let probe_id = config
        .probe_listing_id
        .clone()
        .unwrap_or_else(|| ids[0].clone());

    let client = stats_client(config)?;
    let cache = CookieCache::new(&config.cookie_cache_path);
    let store = match cache.load().await {
        Some(artifact) => {
            tracing::info!(acquired_at = %artifact.acquired_at(), "loaded cached cookie");
            CredentialStore::with_artifact(artifact)
        }
        None => CredentialStore::new(),
    };
    let coordinator = RefreshCoordinator::new(
        Arc::new(store),
        CredentialValidator::new(client.clone(), probe_id),
        TerminalRefreshSignal::new(&config.stats_base_url),
        RefreshConfig::from_app_config(config),
    )
    .with_cache(cache);
    let batch = BatchConfig::from_app_config(config);

    let work = async {
        if request.refresh_cookies {
            coordinator
                .force_refresh()
                .await
                .context("cookie refresh failed")?;
        }
        client
            .fetch_stats(&coordinator, &ids, &batch)
            .await
            .context("no usable stats credential")
    };
    let stats = tokio::select! {
        biased;
        () = token.cancelled() => anyhow::bail!("engagement fetch cancelled"),
        stats = work => stats?,
    };

    let rows = build_rows(&listings, &stats);
    let success_count = rows.iter().filter(|r| r.fetch_success).count();
    println!("Success: {success_count}/{}", rows.len());
    let views = rows.iter().filter_map(|r| r.views).map(|v| i64::try_from(v).unwrap_or(i64::MAX));
    if let Some(summary) = summarize(views) {
        println!("Views: {summary}");
    }
    if let Some(summary) = summarize(rows.iter().filter_map(|r| r.saves)) {
        println!("Saves: {summary}");
    }

    let now = Local::now();
    let out = EngagementOutput {
        timestamp: now,
        source_file: input.display().to_string(),
        count: rows.len(),
        success_count,
        results: rows,
    };
    let path = request
        .output
        .unwrap_or_else(|| output::timestamped_path("engagement_stats", now));
    output::write_json(&path, &out).await?;
    println!("Saved to {}", path.display());
    Ok(())
}
