//! Retry with exponential back-off and jitter for listings requests.
//!
//! Only [`FetchErrorKind::Transient`] failures are retried. Permanent errors
//! (rejected queries, unparseable bodies) are returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use crate::error::{FetchErrorKind, ScraperError};

const MAX_DELAY_MS: u64 = 60_000;

fn is_retriable(err: &ScraperError) -> bool {
    err.kind() == FetchErrorKind::Transient
}

/// Runs `operation` with up to `max_retries` additional attempts on transient errors.
///
/// Back-off schedule with `backoff_base_ms = 500`:
///
/// | Attempt | Sleep before next attempt |
/// |---------|---------------------------|
/// | 1       | 500 ms × 2⁰ ± 25 % jitter |
/// | 2       | 500 ms × 2¹ ± 25 % jitter |
/// | 3       | 500 ms × 2² ± 25 % jitter |
///
/// A `Retry-After` hint on a 429 raises the delay to at least that long.
/// Delay is capped at 60 s.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, ScraperError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScraperError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let delay_ms = backoff_delay_ms(backoff_base_ms, attempt, &err);
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient listings error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

fn backoff_delay_ms(backoff_base_ms: u64, attempt: u32, err: &ScraperError) -> u64 {
    let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
    let capped = computed.min(MAX_DELAY_MS);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let jittered = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;

    match err {
        ScraperError::RateLimited {
            retry_after_secs: Some(secs),
        } => jittered.max(secs.saturating_mul(1000).min(MAX_DELAY_MS)),
        _ => jittered,
    }
}
