//! Single-flight coordination of interactive credential refreshes.
//!
//! A refresh needs a human to complete a browser session, so at most one may
//! be in flight. Every caller that finds the credential unusable while one is
//! running waits on that refresh and receives its outcome.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use rvrank_core::AppConfig;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::cache::CookieCache;
use crate::credential::{CredentialArtifact, CredentialStore};
use crate::error::CredentialError;
use crate::validator::CredentialValidator;

/// Why an interactive session ended without a credential.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("timed out waiting for the refreshed credential")]
    TimedOut,

    #[error("refresh aborted by operator")]
    Aborted,

    #[error("could not capture credential: {0}")]
    Capture(String),
}

/// The interactive session that produces fresh credential material.
///
/// Implementations resolve with the raw cookie header once the operator has
/// completed the session.
pub trait RefreshSignal: Send + Sync {
    fn wait_for_signal(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<String, SignalError>> + Send;
}

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub max_age: TimeDelta,
    pub timeout: Duration,
    /// Cookie name whose absence after a refresh is worth a warning.
    pub required_cookie: Option<String>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_age: TimeDelta::hours(48),
            timeout: Duration::from_secs(600),
            required_cookie: Some("datadome".to_owned()),
        }
    }
}

impl RefreshConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        let max_age = i64::try_from(config.cookie_max_age_hours)
            .ok()
            .and_then(TimeDelta::try_hours)
            .unwrap_or(TimeDelta::MAX);
        Self {
            max_age,
            timeout: Duration::from_secs(config.refresh_timeout_secs),
            ..Self::default()
        }
    }
}

pub type RefreshOutcome = Result<Arc<CredentialArtifact>, CredentialError>;

type OutcomeReceiver = watch::Receiver<Option<RefreshOutcome>>;

enum Phase {
    Idle { last: Option<RefreshOutcome> },
    Refreshing {
        done: OutcomeReceiver,
        cancel: CancellationToken,
    },
}

enum Begin<'a> {
    Join(OutcomeReceiver),
    Fresh(Arc<CredentialArtifact>),
    /// A refresh started and finished after the caller first looked.
    Settled(RefreshOutcome),
    Drive(RefreshGuard<'a>),
}

/// What a caller saw before probing: a refresh to join, or the refresh
/// generation it should compare against later.
enum Observed {
    InFlight(OutcomeReceiver),
    Idle { generation: u64 },
}

/// Publishes the outcome of the refresh it was created for.
///
/// Dropping it before [`finish`](Self::finish) publishes
/// [`CredentialError::RefreshCancelled`], so waiters never hang on a driver
/// that went away.
struct RefreshGuard<'a> {
    phase: &'a Mutex<Phase>,
    done: watch::Sender<Option<RefreshOutcome>>,
    cancel: CancellationToken,
    finished: bool,
}

impl RefreshGuard<'_> {
    fn finish(mut self, outcome: RefreshOutcome) -> RefreshOutcome {
        self.finished = true;
        self.publish(outcome.clone());
        outcome
    }

    fn publish(&self, outcome: RefreshOutcome) {
        *lock(self.phase) = Phase::Idle {
            last: Some(outcome.clone()),
        };
        self.done.send_replace(Some(outcome));
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("credential refresh abandoned before completion");
            self.publish(Err(CredentialError::RefreshCancelled));
        }
    }
}

fn lock(phase: &Mutex<Phase>) -> MutexGuard<'_, Phase> {
    phase.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Gatekeeper for the shared [`CredentialStore`].
///
/// [`ensure_valid`](Self::ensure_valid) hands out a credential that is fresh
/// and passed a probe, starting an interactive refresh through `S` when it is
/// not. Concurrent callers share one refresh.
pub struct RefreshCoordinator<S> {
    store: Arc<CredentialStore>,
    validator: CredentialValidator,
    signal: S,
    cache: Option<CookieCache>,
    config: RefreshConfig,
    phase: Mutex<Phase>,
    refreshes_started: AtomicU64,
}

impl<S: RefreshSignal> RefreshCoordinator<S> {
    #[must_use]
    pub fn new(
        store: Arc<CredentialStore>,
        validator: CredentialValidator,
        signal: S,
        config: RefreshConfig,
    ) -> Self {
        Self {
            store,
            validator,
            signal,
            cache: None,
            config,
            phase: Mutex::new(Phase::Idle { last: None }),
            refreshes_started: AtomicU64::new(0),
        }
    }

    /// Persists every refreshed credential to `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: CookieCache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    #[must_use]
    pub fn signal(&self) -> &S {
        &self.signal
    }

    #[must_use]
    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        matches!(*lock(&self.phase), Phase::Refreshing { .. })
    }

    /// Number of interactive refreshes started so far.
    #[must_use]
    pub fn refreshes_started(&self) -> u64 {
        self.refreshes_started.load(Ordering::Relaxed)
    }

    /// Outcome of the most recent completed refresh, if any.
    #[must_use]
    pub fn last_refresh(&self) -> Option<RefreshOutcome> {
        match &*lock(&self.phase) {
            Phase::Idle { last } => last.clone(),
            Phase::Refreshing { .. } => None,
        }
    }

    /// Returns a usable credential, refreshing it first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::RefreshFailed`] if the interactive session
    /// timed out or failed, and [`CredentialError::RefreshCancelled`] if it
    /// was cancelled. The store is unchanged in both cases.
    pub async fn ensure_valid(&self) -> RefreshOutcome {
        let generation = match self.observe() {
            Observed::InFlight(done) => return join(done).await,
            Observed::Idle { generation } => generation,
        };

        let observed = self.store.current();
        match &observed {
            Some(artifact) if !artifact.is_stale_at(self.config.max_age, Utc::now()) => {
                if self.validator.probe(artifact).await.valid {
                    return Ok(Arc::clone(artifact));
                }
            }
            Some(artifact) => tracing::info!(
                acquired_at = %artifact.acquired_at(),
                max_age_hours = self.config.max_age.num_hours(),
                "credential is stale"
            ),
            None => tracing::info!("no credential available"),
        }

        match self.begin(observed.as_ref(), Some(generation)) {
            Begin::Join(done) => join(done).await,
            Begin::Fresh(artifact) => Ok(artifact),
            Begin::Settled(outcome) => outcome,
            Begin::Drive(guard) => self.drive(guard).await,
        }
    }

    /// Starts an interactive refresh regardless of the current credential,
    /// or joins the one already running.
    ///
    /// # Errors
    ///
    /// Same as [`ensure_valid`](Self::ensure_valid).
    pub async fn force_refresh(&self) -> RefreshOutcome {
        match self.begin(None, None) {
            Begin::Join(done) => join(done).await,
            Begin::Fresh(artifact) => Ok(artifact),
            Begin::Settled(outcome) => outcome,
            Begin::Drive(guard) => self.drive(guard).await,
        }
    }

    /// Cancels the in-flight refresh. Returns `false` if none was running.
    pub fn cancel_refresh(&self) -> bool {
        match &*lock(&self.phase) {
            Phase::Refreshing { cancel, .. } => {
                cancel.cancel();
                true
            }
            Phase::Idle { .. } => false,
        }
    }

    fn observe(&self) -> Observed {
        match &*lock(&self.phase) {
            Phase::Refreshing { done, .. } => Observed::InFlight(done.clone()),
            Phase::Idle { .. } => Observed::Idle {
                generation: self.refreshes_started.load(Ordering::Relaxed),
            },
        }
    }

    /// Decides, under the phase lock, whether this caller joins a running
    /// refresh, takes the outcome of one that ran since it last looked, picks
    /// up a credential installed meanwhile, or drives a new refresh.
    ///
    /// `generation` is `None` for a forced refresh.
    fn begin(
        &self,
        observed: Option<&Arc<CredentialArtifact>>,
        generation: Option<u64>,
    ) -> Begin<'_> {
        let mut phase = lock(&self.phase);
        match &*phase {
            Phase::Refreshing { done, .. } => return Begin::Join(done.clone()),
            Phase::Idle { last: Some(outcome) }
                if generation
                    .is_some_and(|seen| seen != self.refreshes_started.load(Ordering::Relaxed)) =>
            {
                tracing::debug!("a refresh completed while probing; sharing its outcome");
                return Begin::Settled(outcome.clone());
            }
            Phase::Idle { .. } => {}
        }

        if generation.is_some() {
            if let Some(current) = self.store.current() {
                if observed.is_none_or(|seen| !Arc::ptr_eq(seen, &current)) {
                    tracing::debug!("credential replaced while probing; using the new one");
                    return Begin::Fresh(current);
                }
            }
        }

        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        *phase = Phase::Refreshing {
            done: rx,
            cancel: cancel.clone(),
        };
        self.refreshes_started.fetch_add(1, Ordering::Relaxed);

        Begin::Drive(RefreshGuard {
            phase: &self.phase,
            done: tx,
            cancel,
            finished: false,
        })
    }

    async fn drive(&self, guard: RefreshGuard<'_>) -> RefreshOutcome {
        tracing::info!(
            timeout_secs = self.config.timeout.as_secs(),
            "waiting for interactive credential refresh"
        );

        let cancel = guard.cancel.clone();
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(CredentialError::RefreshCancelled),
            material = self.await_material() => material.map(|cookie| self.install(&cookie)),
        };

        let outcome = guard.finish(outcome);
        match &outcome {
            Ok(artifact) => {
                if let Some(cache) = &self.cache {
                    if let Err(e) = cache.save(artifact).await {
                        tracing::warn!(error = %e, "failed to persist refreshed credential");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "credential refresh failed"),
        }
        outcome
    }

    async fn await_material(&self) -> Result<String, CredentialError> {
        let timeout = self.config.timeout;
        match tokio::time::timeout(timeout, self.signal.wait_for_signal(timeout)).await {
            Err(_) => Err(CredentialError::RefreshFailed {
                reason: SignalError::TimedOut.to_string(),
            }),
            Ok(Err(e)) => Err(CredentialError::RefreshFailed {
                reason: e.to_string(),
            }),
            Ok(Ok(material)) if material.trim().is_empty() => Err(CredentialError::RefreshFailed {
                reason: "captured credential is empty".to_owned(),
            }),
            Ok(Ok(material)) => Ok(material),
        }
    }

    fn install(&self, material: &str) -> Arc<CredentialArtifact> {
        let artifact = CredentialArtifact::new(material, Utc::now());
        if let Some(name) = &self.config.required_cookie {
            if !artifact.has_cookie(name) {
                tracing::warn!(cookie = %name, "refreshed credential lacks expected cookie");
            }
        }
        let artifact = self.store.replace(artifact);
        tracing::info!(acquired_at = %artifact.acquired_at(), "credential refreshed");
        artifact
    }
}

async fn join(mut done: OutcomeReceiver) -> RefreshOutcome {
    let outcome = match done.wait_for(Option::is_some).await {
        Ok(value) => (*value).clone(),
        Err(_) => None,
    };
    outcome.unwrap_or(Err(CredentialError::RefreshCancelled))
}
