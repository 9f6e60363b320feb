use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by listings endpoint{}", retry_after_suffix(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("server error HTTP {status} from {url}")]
    ServerError { status: u16, url: String },

    #[error("request rejected with HTTP {status} by {url}")]
    Rejected { status: u16, url: String },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("normalization error for listing {listing_id}: {reason}")]
    Normalization { listing_id: String, reason: String },

    #[error("collection cancelled")]
    Cancelled,
}

/// Whether a failed fetch may succeed if it is simply tried again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Network fault, timeout, 429 or 5xx. Retry with backoff.
    Transient,
    /// The request itself is wrong or the response is unusable. Do not retry.
    Permanent,
}

impl ScraperError {
    #[must_use]
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            ScraperError::Http(e) if e.is_builder() || e.is_redirect() => {
                FetchErrorKind::Permanent
            }
            ScraperError::Http(_)
            | ScraperError::RateLimited { .. }
            | ScraperError::ServerError { .. } => FetchErrorKind::Transient,
            ScraperError::Deserialize { .. }
            | ScraperError::Rejected { .. }
            | ScraperError::InvalidUrl { .. }
            | ScraperError::Normalization { .. }
            | ScraperError::Cancelled => FetchErrorKind::Permanent,
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind() == FetchErrorKind::Transient
    }
}

#[allow(clippy::ref_option)]
fn retry_after_suffix(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs.map_or_else(String::new, |secs| format!(" (retry after {secs}s)"))
}
