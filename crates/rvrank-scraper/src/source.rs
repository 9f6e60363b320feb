use std::future::Future;

use rvrank_core::{ListingRecord, SearchContext};

use crate::error::ScraperError;
use crate::range::SubRange;

/// One page of a windowed search query.
#[derive(Debug, Clone)]
pub struct Page {
    pub sub_range: SubRange,
    pub page_number: u32,
    /// Normalized, unranked records in the order the endpoint returned them.
    pub records: Vec<ListingRecord>,
    /// Listings the endpoint put on this page, including any that could not
    /// be normalized into `records`. Page fullness is judged on this count.
    pub returned: usize,
    /// Total result count the endpoint reports for the query, which may exceed
    /// what the page window can actually return.
    pub reported_total: u64,
}

impl Page {
    /// Listings on the page that did not make it into `records`.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.returned.saturating_sub(self.records.len())
    }
}

/// Something that can fetch one page of search results.
///
/// Implementations perform a single attempt: no retries, no concurrency
/// limits, and no interpretation of the page window. The collector owns
/// all three.
pub trait PageSource: Send + Sync {
    fn fetch_page(
        &self,
        context: &SearchContext,
        range: &SubRange,
        page_number: u32,
    ) -> impl Future<Output = Result<Page, ScraperError>> + Send;
}
