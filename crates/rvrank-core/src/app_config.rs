use std::path::PathBuf;

#[derive(Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub categories_path: PathBuf,
    pub listings_base_url: String,
    pub stats_base_url: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub listings_max_concurrent: usize,
    pub stats_max_concurrent: usize,
    pub max_concurrent_contexts: usize,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub page_size: u32,
    pub max_pages: u32,
    pub max_split_depth: u32,
    pub relay_base_url: String,
    pub relay_api_key: Option<String>,
    pub cookie_cache_path: PathBuf,
    pub cookie_max_age_hours: u64,
    pub refresh_timeout_secs: u64,
    pub probe_listing_id: Option<String>,
    pub auth_failure_threshold: u32,
}

impl AppConfig {
    /// Largest number of results one query can return: `page_size * max_pages`.
    #[must_use]
    pub fn max_window(&self) -> u64 {
        u64::from(self.page_size) * u64::from(self.max_pages)
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("log_level", &self.log_level)
            .field("categories_path", &self.categories_path)
            .field("listings_base_url", &self.listings_base_url)
            .field("stats_base_url", &self.stats_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("listings_max_concurrent", &self.listings_max_concurrent)
            .field("stats_max_concurrent", &self.stats_max_concurrent)
            .field("max_concurrent_contexts", &self.max_concurrent_contexts)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_base_ms", &self.retry_backoff_base_ms)
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .field("max_split_depth", &self.max_split_depth)
            .field("relay_base_url", &self.relay_base_url)
            .field(
                "relay_api_key",
                &self.relay_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("cookie_cache_path", &self.cookie_cache_path)
            .field("cookie_max_age_hours", &self.cookie_max_age_hours)
            .field("refresh_timeout_secs", &self.refresh_timeout_secs)
            .field("probe_listing_id", &self.probe_listing_id)
            .field("auth_failure_threshold", &self.auth_failure_threshold)
            .finish()
    }
}
