//! `EngagementClient::fetch_stats` against a local `wiremock` server: credential
//! gating before the batch and re-authentication in the middle of it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rvrank_engagement::{
    BatchConfig, CredentialArtifact, CredentialError, CredentialStore, CredentialValidator,
    EngagementClient, RefreshConfig, RefreshCoordinator, RefreshSignal, SignalError,
};

const VIEWS_PATH: &str = "/gettiledata/addetail_listingstats/showadviewsstats";
const SAVES_PATH: &str = "/gettiledata/addetail_listingstats/showsavedadsstats";
const PROBE_ID: &str = "999";

struct QueuedSignal {
    calls: AtomicUsize,
    answers: Mutex<VecDeque<Result<String, SignalError>>>,
}

impl QueuedSignal {
    fn new(answers: Vec<Result<String, SignalError>>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            answers: Mutex::new(answers.into()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RefreshSignal for QueuedSignal {
    async fn wait_for_signal(&self, _timeout: Duration) -> Result<String, SignalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.answers.lock().unwrap().pop_front();
        next.unwrap_or(Err(SignalError::Aborted))
    }
}

fn test_client(server: &MockServer) -> EngagementClient {
    EngagementClient::with_base_url(5, "rvrank-test/0.1", &server.uri()).unwrap()
}

fn coordinator(
    server: &MockServer,
    store: CredentialStore,
    signal: QueuedSignal,
) -> RefreshCoordinator<QueuedSignal> {
    RefreshCoordinator::new(
        Arc::new(store),
        CredentialValidator::new(test_client(server), PROBE_ID),
        signal,
        RefreshConfig::default(),
    )
}

fn ids(range: std::ops::RangeInclusive<u32>) -> Vec<String> {
    range.map(|i| i.to_string()).collect()
}

/// Both stats endpoints answer 200 for `cookie`.
async fn mount_accepting(server: &MockServer, cookie: &str) {
    Mock::given(method("GET"))
        .and(path(VIEWS_PATH))
        .and(header("cookie", cookie))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": null, "listingViewsData": "12"})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(SAVES_PATH))
        .and(header("cookie", cookie))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": null, "listingSavesData": 2})),
        )
        .mount(server)
        .await;
}

/// Both stats endpoints answer 403 for `cookie`.
async fn mount_refusing(server: &MockServer, cookie: &str) {
    for stats_path in [VIEWS_PATH, SAVES_PATH] {
        Mock::given(method("GET"))
            .and(path(stats_path))
            .and(header("cookie", cookie))
            .respond_with(ResponseTemplate::new(403))
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn stale_cookie_is_refreshed_before_the_first_stats_call() {
    let server = MockServer::start().await;

    // The 50h-old cookie must never reach the server, not even as a probe.
    for stats_path in [VIEWS_PATH, SAVES_PATH] {
        Mock::given(method("GET"))
            .and(path(stats_path))
            .and(header("cookie", "datadome=old"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
    }
    mount_accepting(&server, "datadome=fresh").await;

    let old = CredentialArtifact::new("datadome=old", Utc::now() - TimeDelta::hours(50));
    let coordinator = coordinator(
        &server,
        CredentialStore::with_artifact(old),
        QueuedSignal::new(vec![Ok("datadome=fresh".to_owned())]),
    );

    let results = test_client(&server)
        .fetch_stats(&coordinator, &ids(1..=4), &BatchConfig::default())
        .await
        .expect("batch should run");

    assert_eq!(coordinator.signal().calls(), 1);
    assert_eq!(results.len(), 4);
    for result in results.values() {
        assert!(result.is_success(), "{result:?}");
        assert_eq!(result.views, Some(12));
        assert_eq!(result.saves, Some(2));
    }
}

#[tokio::test]
async fn max_concurrent_bounds_requests_not_listings() {
    let server = MockServer::start().await;
    let delay = Duration::from_millis(60);
    for (stats_path, body) in [
        (VIEWS_PATH, json!({"error": null, "listingViewsData": "12"})),
        (SAVES_PATH, json!({"error": null, "listingSavesData": 2})),
    ] {
        Mock::given(method("GET"))
            .and(path(stats_path))
            .and(header("cookie", "datadome=ok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body).set_delay(delay))
            .mount(&server)
            .await;
    }

    let coordinator = coordinator(
        &server,
        CredentialStore::with_artifact(CredentialArtifact::new("datadome=ok", Utc::now())),
        QueuedSignal::new(vec![]),
    );
    let config = BatchConfig {
        max_concurrent: 2,
        ..BatchConfig::default()
    };

    let started = std::time::Instant::now();
    let results = test_client(&server)
        .fetch_stats(&coordinator, &ids(1..=4), &config)
        .await
        .expect("batch should run");
    let elapsed = started.elapsed();

    assert!(results.values().all(|r| r.is_success()));
    // One probe, then 8 stats requests two at a time: at least 1 + 4 delays.
    // Two listings at once with both requests in flight would take 1 + 2.
    assert!(elapsed >= delay * 5, "finished in {elapsed:?}");
    assert_eq!(coordinator.signal().calls(), 0);
}

#[tokio::test]
async fn batch_fails_fast_when_no_credential_can_be_obtained() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = coordinator(
        &server,
        CredentialStore::new(),
        QueuedSignal::new(vec![Err(SignalError::Aborted)]),
    );

    let err = test_client(&server)
        .fetch_stats(&coordinator, &ids(1..=3), &BatchConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::RefreshFailed { .. }), "{err:?}");
}

#[tokio::test]
async fn mid_batch_rejections_trigger_one_refresh_and_retry() {
    let server = MockServer::start().await;

    // Cookie A passes the first probe, then expires.
    Mock::given(method("GET"))
        .and(path(VIEWS_PATH))
        .and(query_param("adId", PROBE_ID))
        .and(header("cookie", "datadome=a"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": null, "listingViewsData": "1"})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_refusing(&server, "datadome=a").await;
    mount_accepting(&server, "datadome=b").await;

    let coordinator = coordinator(
        &server,
        CredentialStore::with_artifact(CredentialArtifact::new("datadome=a", Utc::now())),
        QueuedSignal::new(vec![Ok("datadome=b".to_owned())]),
    );
    let config = BatchConfig {
        max_concurrent: 1,
        auth_failure_threshold: 3,
        max_reauth_rounds: 1,
    };

    let results = test_client(&server)
        .fetch_stats(&coordinator, &ids(1..=6), &config)
        .await
        .expect("batch should run");

    assert_eq!(coordinator.signal().calls(), 1);
    assert_eq!(results.len(), 6);
    assert!(results.values().all(|r| r.is_success()), "{results:?}");
    assert_eq!(
        coordinator.store().current().unwrap().cookie(),
        "datadome=b"
    );
}

#[tokio::test]
async fn ids_still_refused_after_reauth_are_marked_rejected() {
    let server = MockServer::start().await;

    // The probe keeps passing, so re-validation does not refresh; listing 2
    // is refused regardless of the cookie.
    Mock::given(method("GET"))
        .and(path(VIEWS_PATH))
        .and(query_param("adId", "2"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    mount_accepting(&server, "datadome=a").await;

    let coordinator = coordinator(
        &server,
        CredentialStore::with_artifact(CredentialArtifact::new("datadome=a", Utc::now())),
        QueuedSignal::new(vec![]),
    );
    let config = BatchConfig {
        max_concurrent: 1,
        auth_failure_threshold: 3,
        max_reauth_rounds: 1,
    };

    let batch = vec!["1".to_owned(), "2".to_owned(), "3".to_owned(), "1".to_owned()];
    let results = test_client(&server)
        .fetch_stats(&coordinator, &batch, &config)
        .await
        .expect("batch should run");

    assert_eq!(coordinator.signal().calls(), 0);
    assert_eq!(results.len(), 3);
    assert!(results["1"].is_success());
    assert!(results["3"].is_success());
    assert_eq!(results["2"].error.as_deref(), Some("auth rejected"));
}

#[tokio::test]
async fn failed_reauth_mid_batch_is_recorded_per_listing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(VIEWS_PATH))
        .and(query_param("adId", PROBE_ID))
        .and(header("cookie", "datadome=a"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": null, "listingViewsData": "1"})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_refusing(&server, "datadome=a").await;

    let coordinator = coordinator(
        &server,
        CredentialStore::with_artifact(CredentialArtifact::new("datadome=a", Utc::now())),
        QueuedSignal::new(vec![Err(SignalError::Aborted)]),
    );
    let config = BatchConfig {
        max_concurrent: 1,
        auth_failure_threshold: 2,
        max_reauth_rounds: 1,
    };

    let results = test_client(&server)
        .fetch_stats(&coordinator, &ids(1..=4), &config)
        .await
        .expect("initial credential was valid");

    assert_eq!(coordinator.signal().calls(), 1);
    assert_eq!(results.len(), 4);
    for result in results.values() {
        let error = result.error.as_deref().unwrap();
        assert!(error.contains("refresh failed"), "{error}");
    }
    assert_eq!(
        coordinator.store().current().unwrap().cookie(),
        "datadome=a"
    );
}
