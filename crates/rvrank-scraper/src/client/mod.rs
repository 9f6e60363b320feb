//! HTTP client for the marketplace's `ssr-api/search-results` endpoint.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Url};
use rvrank_core::{AppConfig, SearchContext};

use crate::error::ScraperError;
use crate::normalize::normalize_listing;
use crate::range::SubRange;
use crate::source::{Page, PageSource};
use crate::types::SearchResultsResponse;

pub const DEFAULT_BASE_URL: &str = "https://www.rvtrader.com";

const SEARCH_PATH: &str = "/ssr-api/search-results";

/// Scraping relay that fetches the target URL on our behalf.
///
/// Requests are sent to `{base_url}?api_key=...&url={target}`.
#[derive(Clone)]
pub struct RequestRelay {
    pub base_url: String,
    pub api_key: String,
}

impl std::fmt::Debug for RequestRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRelay")
            .field("base_url", &self.base_url)
            .field("api_key", &"[redacted]")
            .finish()
    }
}

/// Single-attempt client for the windowed listings search.
///
/// Maps 429 to [`ScraperError::RateLimited`], 5xx to
/// [`ScraperError::ServerError`] and any other non-2xx status to
/// [`ScraperError::Rejected`]. Retrying is left to the caller.
#[derive(Debug)]
pub struct ListingsClient {
    client: Client,
    base_url: String,
    relay: Option<RequestRelay>,
}

impl ListingsClient {
    /// Creates a client against [`DEFAULT_BASE_URL`].
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, ScraperError> {
        Self::with_base_url(timeout_secs, user_agent, DEFAULT_BASE_URL)
    }

    /// Creates a client against an arbitrary base URL (used by tests).
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn with_base_url(
        timeout_secs: u64,
        user_agent: &str,
        base_url: &str,
    ) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            relay: None,
        })
    }

    /// Routes every request through `relay`.
    #[must_use]
    pub fn with_relay(mut self, relay: RequestRelay) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Builds a client from application config, enabling the relay when an
    /// API key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ScraperError> {
        let client = Self::with_base_url(
            config.request_timeout_secs,
            &config.user_agent,
            &config.listings_base_url,
        )?;
        Ok(match &config.relay_api_key {
            Some(api_key) => client.with_relay(RequestRelay {
                base_url: config.relay_base_url.clone(),
                api_key: api_key.clone(),
            }),
            None => client,
        })
    }

    #[must_use]
    pub fn uses_relay(&self) -> bool {
        self.relay.is_some()
    }

    /// Fetches and normalizes one page. Listings that cannot be normalized
    /// are skipped with a warning.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::RateLimited`]: HTTP 429.
    /// - [`ScraperError::ServerError`]: HTTP 5xx.
    /// - [`ScraperError::Rejected`]: any other non-2xx status.
    /// - [`ScraperError::Http`]: network failure or timeout.
    /// - [`ScraperError::Deserialize`]: response body is not the expected JSON.
    /// - [`ScraperError::InvalidUrl`]: base or relay URL cannot be parsed.
    pub async fn fetch_search_page(
        &self,
        context: &SearchContext,
        range: &SubRange,
        page_number: u32,
    ) -> Result<Page, ScraperError> {
        let target = self.search_url(context, range, page_number)?;
        let url = self.request_url(&target)?;

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(reqwest::header::REFERER, format!("{}/", self.base_url))
            .send()
            .await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());
            return Err(ScraperError::RateLimited { retry_after_secs });
        }

        if status.is_server_error() {
            return Err(ScraperError::ServerError {
                status: status.as_u16(),
                url: target,
            });
        }

        if !status.is_success() {
            return Err(ScraperError::Rejected {
                status: status.as_u16(),
                url: target,
            });
        }

        let body = response.text().await?;
        let data = serde_json::from_str::<SearchResultsResponse>(&body)
            .map_err(|e| ScraperError::Deserialize {
                context: format!("search page {page_number} of {context} in {range}"),
                source: e,
            })?
            .into_data();

        let mut records = Vec::with_capacity(data.results.len());
        for raw in &data.results {
            match normalize_listing(raw, context, range) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    context = %context,
                    range = %range,
                    page = page_number,
                    error = %e,
                    "skipping listing that could not be normalized"
                ),
            }
        }

        tracing::debug!(
            context = %context,
            range = %range,
            page = page_number,
            records = records.len(),
            returned = data.results.len(),
            reported_total = data.total_results,
            "fetched search page"
        );

        Ok(Page {
            sub_range: *range,
            page_number,
            returned: data.results.len(),
            records,
            reported_total: data.total_results,
        })
    }

    /// Builds the search URL for one page of `context` within `range`.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidUrl`] if the base URL cannot be parsed.
    pub fn search_url(
        &self,
        context: &SearchContext,
        range: &SubRange,
        page_number: u32,
    ) -> Result<String, ScraperError> {
        let base = format!("{}{SEARCH_PATH}", self.base_url);
        let mut url = Url::parse(&base).map_err(|e| ScraperError::InvalidUrl {
            url: base.clone(),
            reason: e.to_string(),
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("type", &context.category.query_value())
                .append_pair("page", &page_number.to_string())
                .append_pair("zip", &context.zip)
                .append_pair("radius", &context.radius_miles.to_string())
                .append_pair("condition", context.condition.code());
            if let Some(price) = range.price_param() {
                query.append_pair("price", &price);
            }
        }

        Ok(url.to_string())
    }

    fn request_url(&self, target: &str) -> Result<String, ScraperError> {
        let Some(relay) = &self.relay else {
            return Ok(target.to_owned());
        };
        let mut url = Url::parse(&relay.base_url).map_err(|e| ScraperError::InvalidUrl {
            url: relay.base_url.clone(),
            reason: e.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("api_key", &relay.api_key)
            .append_pair("url", target);
        Ok(url.to_string())
    }
}

impl PageSource for ListingsClient {
    fn fetch_page(
        &self,
        context: &SearchContext,
        range: &SubRange,
        page_number: u32,
    ) -> impl Future<Output = Result<Page, ScraperError>> + Send {
        self.fetch_search_page(context, range, page_number)
    }
}

#[cfg(test)]
#[path = "../client_test.rs"]
mod tests;
