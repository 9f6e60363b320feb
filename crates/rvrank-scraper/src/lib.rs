pub mod client;
pub mod collector;
pub mod error;
pub mod normalize;
pub mod range;
mod rate_limit;
pub mod source;
pub mod types;

pub use client::{ListingsClient, RequestRelay};
pub use collector::{
    merge_ranked, BoundedWindowCollector, Collection, CollectorConfig, Merged,
    PartialCollectionWarning,
};
pub use error::{FetchErrorKind, ScraperError};
pub use normalize::normalize_listing;
pub use range::{RangeSplitter, SubRange, DEFAULT_PRICE_BREAKS, TARGET_FILL};
pub use source::{Page, PageSource};
pub use types::{SearchResultsData, SearchResultsResponse};
