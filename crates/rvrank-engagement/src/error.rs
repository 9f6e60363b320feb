use thiserror::Error;

/// Credential lifecycle failures. `Clone` so a single refresh outcome can be
/// handed to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("credential rejected by stats endpoint (HTTP {status})")]
    Invalid { status: u16 },

    #[error("credential refresh failed: {reason}")]
    RefreshFailed { reason: String },

    #[error("credential refresh cancelled")]
    RefreshCancelled,
}

#[derive(Debug, Error)]
pub enum EngagementError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{endpoint} endpoint returned an error: {message}")]
    Api { endpoint: String, message: String },

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("cookie cache I/O error for {path}: {source}")]
    CacheIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cookie cache encode error: {0}")]
    CacheEncode(#[source] serde_json::Error),
}

impl EngagementError {
    /// True when the stats endpoint refused the credential (401/403).
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, EngagementError::Credential(CredentialError::Invalid { .. }))
    }
}
