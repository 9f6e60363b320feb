//! Rank-preserving collection over a bounded result window.
//!
//! The listings endpoint returns at most `page_size * max_pages` results per
//! query. When a search reports more than that, the collector splits it into
//! ascending price bands small enough to fit, fetches every page of every
//! band under one shared concurrency pool, and merges the pages back into a
//! single positional ranking.
//!
//! Merge correctness depends on the endpoint ordering results by ascending
//! price: concatenating bands in ascending order then reproduces the order
//! an unbounded query would return.

mod merge;

pub use merge::{merge_ranked, Merged};

use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::{stream, FutureExt, StreamExt};
use rvrank_core::{AppConfig, ListingRecord, SearchContext};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::ScraperError;
use crate::range::{RangeSplitter, SubRange};
use crate::rate_limit::retry_with_backoff;
use crate::source::{Page, PageSource};

/// Window limits, concurrency and retry policy for a collector.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub page_size: u32,
    pub max_pages: u32,
    /// How many times an overflowing band may be split again.
    pub max_split_depth: u32,
    /// Simultaneous in-flight page requests across every band and context.
    pub max_concurrent_requests: usize,
    /// Contexts collected at once by [`BoundedWindowCollector::collect_all`].
    pub max_concurrent_contexts: usize,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            page_size: 36,
            max_pages: 10,
            max_split_depth: 3,
            max_concurrent_requests: 10,
            max_concurrent_contexts: 4,
            max_retries: 3,
            backoff_base_ms: 500,
        }
    }
}

impl CollectorConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            page_size: config.page_size,
            max_pages: config.max_pages,
            max_split_depth: config.max_split_depth,
            max_concurrent_requests: config.listings_max_concurrent,
            max_concurrent_contexts: config.max_concurrent_contexts,
            max_retries: config.max_retries,
            backoff_base_ms: config.retry_backoff_base_ms,
        }
    }

    #[must_use]
    pub fn max_window(&self) -> u64 {
        u64::from(self.page_size) * u64::from(self.max_pages)
    }

    /// Last page worth requesting for a query reporting `reported_total`
    /// results whose first page returned `first_page_returned` listings.
    fn last_page(&self, reported_total: u64, first_page_returned: usize) -> u32 {
        if first_page_returned < self.page_size as usize {
            return 1;
        }
        let pages = reported_total.div_ceil(u64::from(self.page_size.max(1)));
        u32::try_from(pages).map_or(self.max_pages, |p| p.min(self.max_pages)).max(1)
    }
}

/// Something that made a collection incomplete without failing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartialCollectionWarning {
    /// A band's first page could not be fetched after all retries, so none
    /// of the band was collected.
    SubRangeExhausted { range: SubRange, error: String },
    /// One page could not be fetched after all retries.
    PageExhausted {
        range: SubRange,
        page: u32,
        error: String,
    },
    /// A band still reported more results than the window after the split
    /// depth ran out or it could not be narrowed; only the first window of it
    /// was collected.
    WindowOverflow {
        range: SubRange,
        reported_total: u64,
        retrievable: u64,
    },
    /// Listings on a page that could not be normalized and were left out.
    ListingsSkipped {
        range: SubRange,
        page: u32,
        skipped: usize,
    },
}

impl std::fmt::Display for PartialCollectionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubRangeExhausted { range, error } => {
                write!(f, "price band {range} skipped after retries: {error}")
            }
            Self::PageExhausted { range, page, error } => {
                write!(f, "page {page} of price band {range} skipped after retries: {error}")
            }
            Self::WindowOverflow {
                range,
                reported_total,
                retrievable,
            } => write!(
                f,
                "price band {range} reports {reported_total} results but only {retrievable} are retrievable"
            ),
            Self::ListingsSkipped {
                range,
                page,
                skipped,
            } => write!(
                f,
                "{skipped} unreadable listings skipped on page {page} of price band {range}"
            ),
        }
    }
}

/// Rank-stamped results for one [`SearchContext`].
#[derive(Debug, Clone)]
pub struct Collection {
    pub context: SearchContext,
    /// Deduplicated records carrying ranks `1..=records.len()`.
    pub records: Vec<ListingRecord>,
    pub warnings: Vec<PartialCollectionWarning>,
    /// Total the unsplit query reported.
    pub reported_total: u64,
    /// Pages that contributed at least one record. Empty band probes and the
    /// probes of bands that were split again are not counted, so this is
    /// lower than the number of requests issued for a split search.
    pub pages_with_records: u32,
    pub duplicates_dropped: usize,
}

impl Collection {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[derive(Debug, Default)]
struct RangeOutcome {
    pages: Vec<Page>,
    warnings: Vec<PartialCollectionWarning>,
}

impl RangeOutcome {
    fn exhausted(range: SubRange, err: &ScraperError) -> Self {
        Self {
            pages: Vec::new(),
            warnings: vec![PartialCollectionWarning::SubRangeExhausted {
                range,
                error: err.to_string(),
            }],
        }
    }

    fn absorb(&mut self, other: RangeOutcome) {
        self.pages.extend(other.pages);
        self.warnings.extend(other.warnings);
    }
}

/// Collects complete, globally ranked result sets from a [`PageSource`]
/// whose queries are capped at a bounded window.
pub struct BoundedWindowCollector<S> {
    source: S,
    splitter: RangeSplitter,
    config: CollectorConfig,
    permits: Arc<Semaphore>,
}

impl<S: PageSource> BoundedWindowCollector<S> {
    #[must_use]
    pub fn new(source: S, config: CollectorConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_requests.max(1)));
        Self {
            source,
            splitter: RangeSplitter::default(),
            config,
            permits,
        }
    }

    #[must_use]
    pub fn with_splitter(mut self, splitter: RangeSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Request slots currently free in the shared pool.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Collects every result for `context`, splitting by price when the
    /// reported total exceeds the window.
    ///
    /// Transient failures that outlast their retries become
    /// [`PartialCollectionWarning`]s on the returned collection.
    ///
    /// # Errors
    ///
    /// Returns the first permanent [`ScraperError`] (e.g. a rejected query);
    /// every other in-flight request for the context is dropped.
    pub async fn collect(&self, context: &SearchContext) -> Result<Collection, ScraperError> {
        let full = SubRange::full();
        let probe = match self.fetch(context, full, 1).await {
            Ok(page) => page,
            Err(e) if e.is_transient() => {
                tracing::warn!(context = %context, error = %e, "probe failed after retries");
                return Ok(Collection {
                    context: context.clone(),
                    records: Vec::new(),
                    warnings: RangeOutcome::exhausted(full, &e).warnings,
                    reported_total: 0,
                    pages_with_records: 0,
                    duplicates_dropped: 0,
                });
            }
            Err(e) => return Err(e),
        };

        let reported_total = probe.reported_total;
        let mut outcome = self.expand_range(context, full, 0, probe).await?;

        for page in &outcome.pages {
            let skipped = page.skipped();
            if skipped > 0 {
                outcome
                    .warnings
                    .push(PartialCollectionWarning::ListingsSkipped {
                        range: page.sub_range,
                        page: page.page_number,
                        skipped,
                    });
            }
        }

        let pages_with_records = u32::try_from(
            outcome
                .pages
                .iter()
                .filter(|p| !p.records.is_empty())
                .count(),
        )
        .unwrap_or(u32::MAX);
        let merged = merge_ranked(outcome.pages.into_iter().flat_map(|p| p.records));

        tracing::info!(
            context = %context,
            reported_total,
            records = merged.records.len(),
            pages_with_records,
            duplicates_dropped = merged.duplicates_dropped,
            warnings = outcome.warnings.len(),
            "collection finished"
        );

        Ok(Collection {
            context: context.clone(),
            records: merged.records,
            warnings: outcome.warnings,
            reported_total,
            pages_with_records,
            duplicates_dropped: merged.duplicates_dropped,
        })
    }

    /// Like [`collect`](Self::collect), but abandons the collection as soon
    /// as `token` is cancelled. Every in-flight request is dropped and its
    /// pool slot released.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Cancelled`] on cancellation, otherwise as
    /// [`collect`](Self::collect).
    pub async fn collect_until_cancelled(
        &self,
        context: &SearchContext,
        token: &CancellationToken,
    ) -> Result<Collection, ScraperError> {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::info!(context = %context, "collection cancelled");
                Err(ScraperError::Cancelled)
            }
            result = self.collect(context) => result,
        }
    }

    /// Collects several contexts concurrently. Results are returned in input
    /// order; one context failing does not affect the others.
    pub async fn collect_all(
        &self,
        contexts: &[SearchContext],
    ) -> Vec<Result<Collection, ScraperError>> {
        stream::iter(contexts)
            .map(|context| self.collect(context))
            .buffered(self.config.max_concurrent_contexts.max(1))
            .collect()
            .await
    }

    /// Probes page 1 of `range`, then collects it like any other range.
    fn collect_range<'a>(
        &'a self,
        context: &'a SearchContext,
        range: SubRange,
        depth: u32,
    ) -> BoxFuture<'a, Result<RangeOutcome, ScraperError>> {
        async move {
            let probe = match self.fetch(context, range, 1).await {
                Ok(page) => page,
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        context = %context,
                        range = %range,
                        error = %e,
                        "price band probe failed after retries"
                    );
                    return Ok(RangeOutcome::exhausted(range, &e));
                }
                Err(e) => return Err(e),
            };
            self.expand_range(context, range, depth, probe).await
        }
        .boxed()
    }

    /// Given page 1 of `range`, either splits the range and recurses or
    /// fetches the remaining pages in page order.
    fn expand_range<'a>(
        &'a self,
        context: &'a SearchContext,
        range: SubRange,
        depth: u32,
        probe: Page,
    ) -> BoxFuture<'a, Result<RangeOutcome, ScraperError>> {
        async move {
            let window = self.config.max_window();
            let total = probe.reported_total;
            let mut outcome = RangeOutcome::default();

            if total > window {
                if depth < self.config.max_split_depth {
                    let bands = self.splitter.propose(&range, total, window);
                    if bands.len() > 1 || bands.first() != Some(&range) {
                        tracing::debug!(
                            context = %context,
                            range = %range,
                            reported_total = total,
                            bands = bands.len(),
                            depth,
                            "splitting price band"
                        );
                        let parts = future::try_join_all(
                            bands
                                .into_iter()
                                .map(|band| self.collect_range(context, band, depth + 1)),
                        )
                        .await?;
                        for part in parts {
                            outcome.absorb(part);
                        }
                        return Ok(outcome);
                    }
                }

                tracing::warn!(
                    context = %context,
                    range = %range,
                    reported_total = total,
                    retrievable = window,
                    depth,
                    "price band cannot be split further; collecting first window only"
                );
                outcome
                    .warnings
                    .push(PartialCollectionWarning::WindowOverflow {
                        range,
                        reported_total: total,
                        retrievable: window,
                    });
            }

            let last_page = self.config.last_page(total, probe.returned);
            outcome.pages.push(probe);

            let page_size = self.config.page_size as usize;
            let mut pages = stream::iter(2..=last_page)
                .map(|page_number| self.fetch(context, range, page_number))
                .buffered(self.config.max_concurrent_requests.max(1));

            let mut page_number = 1;
            while let Some(result) = pages.next().await {
                page_number += 1;
                match result {
                    Ok(page) => {
                        let short = page.returned < page_size;
                        outcome.pages.push(page);
                        if short {
                            break;
                        }
                    }
                    Err(e) if e.is_transient() => {
                        tracing::warn!(
                            context = %context,
                            range = %range,
                            page = page_number,
                            error = %e,
                            "page fetch failed after retries"
                        );
                        outcome
                            .warnings
                            .push(PartialCollectionWarning::PageExhausted {
                                range,
                                page: page_number,
                                error: e.to_string(),
                            });
                    }
                    Err(e) => return Err(e),
                }
            }

            Ok(outcome)
        }
        .boxed()
    }

    /// One page with retries. A pool slot is held only while a single
    /// attempt is in flight, never across a back-off sleep.
    async fn fetch(
        &self,
        context: &SearchContext,
        range: SubRange,
        page_number: u32,
    ) -> Result<Page, ScraperError> {
        retry_with_backoff(self.config.max_retries, self.config.backoff_base_ms, || async move {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| ScraperError::Cancelled)?;
            self.source.fetch_page(context, &range, page_number).await
        })
        .await
    }
}
