//! Batch stats fetching with mid-batch re-authentication.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use rvrank_core::AppConfig;
use tokio::sync::Semaphore;

use super::{EngagementClient, StatResult};
use crate::credential::CredentialArtifact;
use crate::error::CredentialError;
use crate::refresh::{RefreshCoordinator, RefreshSignal};

const AUTH_REJECTED: &str = "auth rejected";

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Stats requests in flight at once. Each listing issues two, so at most
    /// this many listings are in progress and usually half as many.
    pub max_concurrent: usize,
    /// Consecutive refusals that pause the round and trigger re-validation.
    pub auth_failure_threshold: u32,
    /// How many times one batch may re-validate after pausing.
    pub max_reauth_rounds: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            auth_failure_threshold: 3,
            max_reauth_rounds: 1,
        }
    }
}

impl BatchConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_concurrent: config.stats_max_concurrent,
            auth_failure_threshold: config.auth_failure_threshold,
            ..Self::default()
        }
    }
}

enum Attempt {
    Done(StatResult),
    Rejected(String),
    Deferred(String),
}

struct Round {
    done: Vec<StatResult>,
    retry: HashSet<String>,
    paused: bool,
}

impl EngagementClient {
    /// Fetches stats for every id, validating the credential first.
    ///
    /// Duplicate ids are fetched once. When `auth_failure_threshold`
    /// consecutive listings are refused, the rest of the round is deferred,
    /// the credential is re-validated through `coordinator` (which may start
    /// an interactive refresh) and the deferred and refused ids are retried.
    /// Ids still refused after `max_reauth_rounds` end with an
    /// `auth rejected` error in their result.
    ///
    /// # Errors
    ///
    /// Returns the coordinator's [`CredentialError`] if no usable credential
    /// could be obtained before the batch started. A failed re-validation
    /// mid-batch is recorded in the affected results instead.
    pub async fn fetch_stats<S: RefreshSignal>(
        &self,
        coordinator: &RefreshCoordinator<S>,
        ids: &[String],
        config: &BatchConfig,
    ) -> Result<BTreeMap<String, StatResult>, CredentialError> {
        let mut seen = HashSet::new();
        let mut pending: Vec<&str> = ids
            .iter()
            .map(String::as_str)
            .filter(|id| seen.insert(*id))
            .collect();

        let mut results = BTreeMap::new();
        if pending.is_empty() {
            return Ok(results);
        }

        let mut artifact = coordinator.ensure_valid().await?;
        let mut reauth_rounds = 0;

        loop {
            let round = self.run_round(&pending, &artifact, config).await;
            for result in round.done {
                results.insert(result.id.clone(), result);
            }
            if round.retry.is_empty() {
                break;
            }

            pending.retain(|id| round.retry.contains(*id));

            if !round.paused || reauth_rounds >= config.max_reauth_rounds {
                tracing::warn!(
                    rejected = pending.len(),
                    reauth_rounds,
                    "listings still refused by stats endpoint"
                );
                fail_all(&mut results, &pending, AUTH_REJECTED);
                break;
            }

            reauth_rounds += 1;
            tracing::info!(
                pending = pending.len(),
                round = reauth_rounds,
                "repeated auth rejections; re-validating credential"
            );
            match coordinator.ensure_valid().await {
                Ok(next) => artifact = next,
                Err(e) => {
                    fail_all(&mut results, &pending, &e.to_string());
                    break;
                }
            }
        }

        let succeeded = results.values().filter(|r| r.is_success()).count();
        tracing::info!(
            requested = ids.len(),
            fetched = results.len(),
            succeeded,
            "stats batch complete"
        );
        Ok(results)
    }

    async fn run_round(
        &self,
        ids: &[&str],
        artifact: &Arc<CredentialArtifact>,
        config: &BatchConfig,
    ) -> Round {
        let threshold = config.auth_failure_threshold.max(1);
        let limit = config.max_concurrent.max(1);
        let permits = Semaphore::new(limit);
        let consecutive = AtomicU32::new(0);
        let paused = AtomicBool::new(false);
        let (permits, consecutive, paused_ref) = (&permits, &consecutive, &paused);

        let attempts: Vec<Attempt> = stream::iter(ids.iter().copied())
            .map(|id| async move {
                if paused_ref.load(Ordering::SeqCst) {
                    return Attempt::Deferred(id.to_owned());
                }
                match self.fetch_stat_within(id, artifact, Some(permits)).await {
                    Ok(result) => {
                        consecutive.store(0, Ordering::SeqCst);
                        Attempt::Done(result)
                    }
                    Err(e) if e.is_auth_rejection() => {
                        let streak = consecutive.fetch_add(1, Ordering::SeqCst) + 1;
                        if streak >= threshold && !paused_ref.swap(true, Ordering::SeqCst) {
                            tracing::warn!(streak, "pausing stats batch after auth rejections");
                        }
                        Attempt::Rejected(id.to_owned())
                    }
                    Err(e) => Attempt::Done(StatResult::failed(id, e.to_string())),
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut round = Round {
            done: Vec::new(),
            retry: HashSet::new(),
            paused: paused.load(Ordering::SeqCst),
        };
        for attempt in attempts {
            match attempt {
                Attempt::Done(result) => round.done.push(result),
                Attempt::Rejected(id) | Attempt::Deferred(id) => {
                    round.retry.insert(id);
                }
            }
        }
        round
    }
}

fn fail_all(results: &mut BTreeMap<String, StatResult>, ids: &[&str], error: &str) {
    for id in ids {
        results.insert((*id).to_owned(), StatResult::failed(id, error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_batch_config() {
        let config = BatchConfig::default();
        assert_eq!(config.max_concurrent, 5);
        assert_eq!(config.auth_failure_threshold, 3);
        assert_eq!(config.max_reauth_rounds, 1);
    }

    #[test]
    fn fail_all_marks_every_id() {
        let mut results = BTreeMap::new();
        fail_all(&mut results, &["1", "2"], AUTH_REJECTED);
        assert_eq!(results.len(), 2);
        assert!(results
            .values()
            .all(|r| r.error.as_deref() == Some(AUTH_REJECTED)));
    }
}
