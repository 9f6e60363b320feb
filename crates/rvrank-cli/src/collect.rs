//! `rvrank collect`: ranked listings for every zip × category search.
//!
//! A search that fails permanently is reported and skipped; the remaining
//! searches still run and are written out.

use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Local};
use futures::stream::{self, StreamExt};
use rvrank_core::{AppConfig, CategoriesFile, Category, Condition, ListingRecord, SearchContext};
use rvrank_scraper::{
    BoundedWindowCollector, Collection, CollectorConfig, ListingsClient, PartialCollectionWarning,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::output;

pub(crate) struct CollectRequest {
    pub zips: Vec<String>,
    pub categories: Vec<String>,
    pub condition: Condition,
    pub radius: u32,
    pub output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ContextWarning<'a> {
    context: String,
    #[serde(flatten)]
    warning: &'a PartialCollectionWarning,
}

#[derive(Debug, Serialize)]
struct CollectOutput<'a> {
    timestamp: DateTime<Local>,
    count: usize,
    listings: Vec<&'a ListingRecord>,
    warnings: Vec<ContextWarning<'a>>,
}

/// Resolves category names against the categories file; no names means all.
pub(crate) fn select_categories(
    file: &CategoriesFile,
    names: &[String],
) -> anyhow::Result<Vec<Category>> {
    if names.is_empty() {
        return Ok(file.categories.clone());
    }
    names
        .iter()
        .map(|name| {
            file.find(name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("category '{name}' not found in categories file"))
        })
        .collect()
}

pub(crate) fn build_contexts(
    zips: &[String],
    categories: &[Category],
    radius: u32,
    condition: Condition,
) -> Vec<SearchContext> {
    zips.iter()
        .flat_map(|zip| {
            categories
                .iter()
                .map(move |category| SearchContext::new(zip, radius, category.clone(), condition))
        })
        .collect()
}

fn listings_client(config: &AppConfig) -> anyhow::Result<ListingsClient> {
    ListingsClient::from_app_config(config).context("failed to build listings client")
}

/// Collects every requested search and writes the combined JSON file.
///
/// # Errors
///
/// Returns an error if the categories cannot be loaded, the client cannot be
/// built, every search failed, or the output cannot be written.
pub(crate) async fn run_collect(
    config: &AppConfig,
    request: CollectRequest,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    let categories_file = rvrank_core::load_categories(&config.categories_path)
        .context("loading categories")?;
    let categories = select_categories(&categories_file, &request.categories)?;
    let contexts = build_contexts(
        &request.zips,
        &categories,
        request.radius,
        request.condition,
    );

    let client = listings_client(config)?;
    tracing::info!(
        searches = contexts.len(),
        relay = client.uses_relay(),
        "starting collection"
    );
    let collector = BoundedWindowCollector::new(client, CollectorConfig::from_app_config(config));

    let max_contexts = collector.config().max_concurrent_contexts.max(1);
    let collector = &collector;
    let results: Vec<_> = stream::iter(&contexts)
        .map(|context| async move {
            (context, collector.collect_until_cancelled(context, token).await)
        })
        .buffered(max_contexts)
        .collect()
        .await;

    let mut collections: Vec<Collection> = Vec::with_capacity(results.len());
    let mut failed = 0usize;
    for (context, result) in results {
        match result {
            Ok(collection) => {
                println!(
                    "{context}: {} listings (reported {}, {} pages{})",
                    collection.records.len(),
                    collection.reported_total,
                    collection.pages_with_records,
                    if collection.is_complete() { "" } else { ", incomplete" }
                );
                for warning in &collection.warnings {
                    eprintln!("warning: {context}: {warning}");
                }
                collections.push(collection);
            }
            Err(e) => {
                failed += 1;
                eprintln!("error: {context}: {e}");
            }
        }
    }

    if token.is_cancelled() {
        anyhow::bail!("collection cancelled");
    }
    if !contexts.is_empty() && failed == contexts.len() {
        anyhow::bail!("all {failed} searches failed");
    }

    let now = Local::now();
    let listings: Vec<&ListingRecord> = collections.iter().flat_map(|c| &c.records).collect();
    let warnings = collections
        .iter()
        .flat_map(|c| {
            c.warnings.iter().map(|warning| ContextWarning {
                context: c.context.to_string(),
                warning,
            })
        })
        .collect();
    let out = CollectOutput {
        timestamp: now,
        count: listings.len(),
        listings,
        warnings,
    };

    let path = request
        .output
        .unwrap_or_else(|| output::timestamped_path("ranked_listings", now));
    output::write_json(&path, &out).await?;
    println!("{} listings saved to {}", out.count, path.display());
    Ok(())
}
