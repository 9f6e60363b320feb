//! The session credential and the process-wide store that owns it.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, TimeDelta, Utc};

/// A session cookie header and the moment it was captured.
///
/// Immutable once built: a refresh produces a new artifact and swaps it into
/// the [`CredentialStore`] whole.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialArtifact {
    cookie: String,
    acquired_at: DateTime<Utc>,
}

impl CredentialArtifact {
    #[must_use]
    pub fn new(cookie: &str, acquired_at: DateTime<Utc>) -> Self {
        Self {
            cookie: cookie.trim().to_owned(),
            acquired_at,
        }
    }

    /// Value for the `Cookie` request header.
    #[must_use]
    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    #[must_use]
    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    #[must_use]
    pub fn is_stale_at(&self, max_age: TimeDelta, now: DateTime<Utc>) -> bool {
        now - self.acquired_at > max_age
    }

    /// Whether the cookie header carries a cookie called `name`.
    #[must_use]
    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookie_names().any(|n| n == name)
    }

    fn cookie_names(&self) -> impl Iterator<Item = &str> {
        self.cookie
            .split(';')
            .filter_map(|pair| pair.split_once('=').map(|(name, _)| name.trim()))
    }
}

impl std::fmt::Debug for CredentialArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialArtifact")
            .field("cookies", &self.cookie_names().collect::<Vec<_>>())
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

/// Holds the current [`CredentialArtifact`], if any.
///
/// Readers get an `Arc` to the artifact that was current when they asked.
/// [`replace`](Self::replace) swaps the whole `Arc`, so a reader sees either
/// the old artifact or the new one, never a mix.
#[derive(Debug, Default)]
pub struct CredentialStore {
    current: RwLock<Option<Arc<CredentialArtifact>>>,
}

impl CredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_artifact(artifact: CredentialArtifact) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(artifact))),
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<Arc<CredentialArtifact>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Installs `artifact` as current and returns the shared handle to it.
    pub fn replace(&self, artifact: CredentialArtifact) -> Arc<CredentialArtifact> {
        let artifact = Arc::new(artifact);
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&artifact));
        tracing::debug!(acquired_at = %artifact.acquired_at(), "credential replaced");
        artifact
    }

    /// True when there is no artifact or it is older than `max_age`.
    #[must_use]
    pub fn is_stale(&self, max_age: TimeDelta) -> bool {
        self.is_stale_at(max_age, Utc::now())
    }

    #[must_use]
    pub fn is_stale_at(&self, max_age: TimeDelta, now: DateTime<Utc>) -> bool {
        self.current()
            .is_none_or(|artifact| artifact.is_stale_at(max_age, now))
    }
}
