use crate::app_config::AppConfig;
use crate::ConfigError;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a variable is present but its value is invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a variable is present but its value is invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so tests can feed a `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_positive_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let value = or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if value == 0 {
            return Err(invalid(var, "must be at least 1".to_string()));
        }
        Ok(value)
    };

    let parse_positive_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let value = parse_u32(var, default)?;
        if value == 0 {
            return Err(invalid(var, "must be at least 1".to_string()));
        }
        Ok(value)
    };

    let log_level = or_default("RVRANK_LOG_LEVEL", "info");
    let categories_path = PathBuf::from(or_default(
        "RVRANK_CATEGORIES_PATH",
        "./config/categories.yaml",
    ));
    let listings_base_url = or_default("RVRANK_LISTINGS_BASE_URL", "https://www.rvtrader.com");
    let stats_base_url = or_default("RVRANK_STATS_BASE_URL", "https://www.rvtrader.com");
    let request_timeout_secs = parse_u64("RVRANK_REQUEST_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("RVRANK_USER_AGENT", DEFAULT_USER_AGENT);

    let listings_max_concurrent = parse_positive_usize("RVRANK_LISTINGS_MAX_CONCURRENT", "10")?;
    let stats_max_concurrent = parse_positive_usize("RVRANK_STATS_MAX_CONCURRENT", "5")?;
    let max_concurrent_contexts = parse_positive_usize("RVRANK_MAX_CONCURRENT_CONTEXTS", "4")?;
    let max_retries = parse_u32("RVRANK_MAX_RETRIES", "3")?;
    let retry_backoff_base_ms = parse_u64("RVRANK_RETRY_BACKOFF_BASE_MS", "500")?;

    let page_size = parse_positive_u32("RVRANK_PAGE_SIZE", "36")?;
    let max_pages = parse_positive_u32("RVRANK_MAX_PAGES", "10")?;
    let max_split_depth = parse_u32("RVRANK_MAX_SPLIT_DEPTH", "3")?;

    let relay_base_url = or_default("RVRANK_RELAY_BASE_URL", "http://api.scraperapi.com");
    let relay_api_key = optional("RVRANK_RELAY_API_KEY");

    let cookie_cache_path = PathBuf::from(or_default(
        "RVRANK_COOKIE_CACHE_PATH",
        "./.cookie_cache.json",
    ));
    let cookie_max_age_hours = parse_u64("RVRANK_COOKIE_MAX_AGE_HOURS", "48")?;
    let refresh_timeout_secs = parse_u64("RVRANK_REFRESH_TIMEOUT_SECS", "600")?;
    let probe_listing_id = optional("RVRANK_PROBE_LISTING_ID");
    let auth_failure_threshold = parse_positive_u32("RVRANK_AUTH_FAILURE_THRESHOLD", "3")?;

    Ok(AppConfig {
        log_level,
        categories_path,
        listings_base_url,
        stats_base_url,
        request_timeout_secs,
        user_agent,
        listings_max_concurrent,
        stats_max_concurrent,
        max_concurrent_contexts,
        max_retries,
        retry_backoff_base_ms,
        page_size,
        max_pages,
        max_split_depth,
        relay_base_url,
        relay_api_key,
        cookie_cache_path,
        cookie_max_age_hours,
        refresh_timeout_secs,
        probe_listing_id,
        auth_failure_threshold,
    })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
