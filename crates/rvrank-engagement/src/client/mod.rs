//! HTTP client for the per-listing views and saves endpoints.

mod batch;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use rvrank_core::AppConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::credential::CredentialArtifact;
use crate::endpoints::{StatEndpoint, DEFAULT_BASE_URL};
use crate::error::{CredentialError, EngagementError};
use crate::types::StatPayload;

pub use batch::BatchConfig;

/// Views and saves for one listing.
///
/// `error` is set when either call failed for a reason other than the
/// credential being refused; the counts that did arrive are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatResult {
    pub id: String,
    pub views: Option<u64>,
    pub saves: Option<i64>,
    pub error: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl StatResult {
    #[must_use]
    pub fn failed(id: &str, error: impl Into<String>) -> Self {
        Self {
            id: id.to_owned(),
            views: None,
            saves: None,
            error: Some(error.into()),
            fetched_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Client for the authenticated stats endpoints.
///
/// Every call carries the cookie of the [`CredentialArtifact`] it is given.
/// 401 and 403 surface as [`CredentialError::Invalid`] so callers can tell a
/// refused credential apart from any other failure.
#[derive(Debug, Clone)]
pub struct EngagementClient {
    client: Client,
    base_url: String,
}

impl EngagementClient {
    /// Creates a client against [`DEFAULT_BASE_URL`].
    ///
    /// # Errors
    ///
    /// Returns [`EngagementError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, EngagementError> {
        Self::with_base_url(timeout_secs, user_agent, DEFAULT_BASE_URL)
    }

    /// Creates a client against an arbitrary base URL (used by tests).
    ///
    /// # Errors
    ///
    /// Returns [`EngagementError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn with_base_url(
        timeout_secs: u64,
        user_agent: &str,
        base_url: &str,
    ) -> Result<Self, EngagementError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// # Errors
    ///
    /// Returns [`EngagementError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, EngagementError> {
        Self::with_base_url(
            config.request_timeout_secs,
            &config.user_agent,
            &config.stats_base_url,
        )
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// View count for `listing_id`, `None` when the endpoint reports none.
    ///
    /// # Errors
    ///
    /// See [`EngagementClient::fetch_payload`].
    pub async fn fetch_views(
        &self,
        listing_id: &str,
        artifact: &CredentialArtifact,
    ) -> Result<Option<u64>, EngagementError> {
        let payload = self
            .fetch_payload(StatEndpoint::Views, listing_id, artifact)
            .await?;
        Ok(payload.view_count())
    }

    /// Save count for `listing_id`, `None` when the endpoint reports none.
    ///
    /// # Errors
    ///
    /// See [`EngagementClient::fetch_payload`].
    pub async fn fetch_saves(
        &self,
        listing_id: &str,
        artifact: &CredentialArtifact,
    ) -> Result<Option<i64>, EngagementError> {
        let payload = self
            .fetch_payload(StatEndpoint::Saves, listing_id, artifact)
            .await?;
        Ok(payload.save_count())
    }

    /// Fetches views and saves concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Invalid`] (wrapped) if either call was
    /// refused. Every other failure is recorded in [`StatResult::error`].
    pub async fn fetch_stat(
        &self,
        listing_id: &str,
        artifact: &CredentialArtifact,
    ) -> Result<StatResult, EngagementError> {
        self.fetch_stat_within(listing_id, artifact, None).await
    }

    /// [`fetch_stat`](Self::fetch_stat) where each of the two requests holds
    /// a slot of `permits` while it is in flight.
    pub(crate) async fn fetch_stat_within(
        &self,
        listing_id: &str,
        artifact: &CredentialArtifact,
        permits: Option<&Semaphore>,
    ) -> Result<StatResult, EngagementError> {
        let (views, saves) = tokio::join!(
            with_permit(permits, self.fetch_views(listing_id, artifact)),
            with_permit(permits, self.fetch_saves(listing_id, artifact))
        );

        for result in [views.as_ref().err(), saves.as_ref().err()] {
            if let Some(EngagementError::Credential(CredentialError::Invalid { status })) = result {
                return Err(CredentialError::Invalid { status: *status }.into());
            }
        }

        let mut errors = Vec::new();
        let views = views.unwrap_or_else(|e| {
            errors.push(format!("views: {e}"));
            None
        });
        let saves = saves.unwrap_or_else(|e| {
            errors.push(format!("saves: {e}"));
            None
        });

        if !errors.is_empty() {
            tracing::warn!(listing_id, errors = ?errors, "stats fetch failed");
        }

        Ok(StatResult {
            id: listing_id.to_owned(),
            views,
            saves,
            error: (!errors.is_empty()).then(|| errors.join("; ")),
            fetched_at: Utc::now(),
        })
    }

    /// One GET of a stats endpoint with the artifact's cookie header.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::Invalid`] (wrapped): HTTP 401 or 403.
    /// - [`EngagementError::UnexpectedStatus`]: any other non-2xx status.
    /// - [`EngagementError::Api`]: the body carried a non-null `error`.
    /// - [`EngagementError::Http`]: network failure or timeout.
    /// - [`EngagementError::Deserialize`]: body is not the expected JSON.
    /// - [`EngagementError::InvalidUrl`]: `listing_id` is not a valid id.
    pub async fn fetch_payload(
        &self,
        endpoint: StatEndpoint,
        listing_id: &str,
        artifact: &CredentialArtifact,
    ) -> Result<StatPayload, EngagementError> {
        let url = endpoint.url(&self.base_url, listing_id)?;

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json, text/plain, */*")
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(reqwest::header::COOKIE, artifact.cookie())
            .send()
            .await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            tracing::debug!(endpoint = %endpoint, listing_id, status = status.as_u16(), "credential refused");
            return Err(CredentialError::Invalid {
                status: status.as_u16(),
            }
            .into());
        }

        if !status.is_success() {
            return Err(EngagementError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        let payload = serde_json::from_str::<StatPayload>(&body).map_err(|e| {
            EngagementError::Deserialize {
                context: format!("{endpoint} stats for listing {listing_id}"),
                source: e,
            }
        })?;

        if let Some(message) = payload.error_message() {
            return Err(EngagementError::Api {
                endpoint: endpoint.name().to_owned(),
                message,
            });
        }

        Ok(payload)
    }
}

async fn with_permit<F: Future>(permits: Option<&Semaphore>, request: F) -> F::Output {
    // The batch never closes its semaphore.
    let _permit = match permits {
        Some(permits) => permits.acquire().await.ok(),
        None => None,
    };
    request.await
}

#[cfg(test)]
#[path = "../client_test.rs"]
mod tests;
