use chrono::{DateTime, Utc};

use crate::client::EngagementClient;
use crate::credential::CredentialArtifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub checked_at: DateTime<Utc>,
}

/// Checks a credential with one cheap authenticated call.
#[derive(Debug, Clone)]
pub struct CredentialValidator {
    client: EngagementClient,
    probe_id: String,
}

impl CredentialValidator {
    #[must_use]
    pub fn new(client: EngagementClient, probe_id: impl Into<String>) -> Self {
        Self {
            client,
            probe_id: probe_id.into(),
        }
    }

    #[must_use]
    pub fn probe_id(&self) -> &str {
        &self.probe_id
    }

    /// Fetches the view count of the probe listing with `artifact`.
    ///
    /// Only an explicit refusal (401/403) marks the credential invalid. A
    /// network error or unexpected response says nothing about the cookie,
    /// so it counts as valid and is logged.
    pub async fn probe(&self, artifact: &CredentialArtifact) -> ValidationOutcome {
        let valid = match self.client.fetch_views(&self.probe_id, artifact).await {
            Ok(_) => true,
            Err(e) if e.is_auth_rejection() => {
                tracing::info!(probe_id = %self.probe_id, error = %e, "credential failed validation");
                false
            }
            Err(e) => {
                tracing::warn!(
                    probe_id = %self.probe_id,
                    error = %e,
                    "credential probe inconclusive; assuming valid"
                );
                true
            }
        };
        ValidationOutcome {
            valid,
            checked_at: Utc::now(),
        }
    }
}
