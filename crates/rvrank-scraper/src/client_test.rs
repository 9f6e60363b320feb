use rvrank_core::{Category, Condition};

use super::*;

fn context() -> SearchContext {
    SearchContext::new(
        "60616",
        50,
        Category::new("Class B", "198068"),
        Condition::New,
    )
}

fn client() -> ListingsClient {
    ListingsClient::with_base_url(5, "rvrank-test/0.1", "https://www.rvtrader.com/").unwrap()
}

#[test]
fn search_url_without_price_filter_for_full_range() {
    let url = client().search_url(&context(), &SubRange::full(), 1).unwrap();
    assert_eq!(
        url,
        "https://www.rvtrader.com/ssr-api/search-results?type=Class+B%7C198068&page=1&zip=60616&radius=50&condition=N"
    );
}

#[test]
fn search_url_with_bounded_price_filter() {
    let url = client()
        .search_url(&context(), &SubRange::bounded(5_000, 10_000), 3)
        .unwrap();
    assert!(url.contains("page=3"), "{url}");
    assert!(url.ends_with("&price=5000%3A10000"), "{url}");
}

#[test]
fn search_url_renders_open_bounds_as_star() {
    let url = client()
        .search_url(&context(), &SubRange::bounded(0, 5_000), 1)
        .unwrap();
    assert!(url.ends_with("&price=*%3A5000"), "{url}");

    let url = client()
        .search_url(&context(), &SubRange::new(1_000_000, None), 1)
        .unwrap();
    assert!(url.ends_with("&price=1000000%3A*"), "{url}");
}

#[test]
fn search_url_rejects_invalid_base() {
    let client = ListingsClient::with_base_url(5, "rvrank-test/0.1", "not a url").unwrap();
    let err = client
        .search_url(&context(), &SubRange::full(), 1)
        .unwrap_err();
    assert!(
        matches!(err, ScraperError::InvalidUrl { .. }),
        "expected InvalidUrl, got: {err:?}"
    );
}

#[test]
fn request_url_passes_through_without_relay() {
    let client = client();
    assert!(!client.uses_relay());
    assert_eq!(
        client.request_url("https://www.rvtrader.com/x?a=1").unwrap(),
        "https://www.rvtrader.com/x?a=1"
    );
}

#[test]
fn request_url_wraps_target_for_relay() {
    let client = client().with_relay(RequestRelay {
        base_url: "http://api.scraperapi.com".to_owned(),
        api_key: "k123".to_owned(),
    });
    assert!(client.uses_relay());
    let url = client
        .request_url("https://www.rvtrader.com/x?a=1&b=2")
        .unwrap();
    assert_eq!(
        url,
        "http://api.scraperapi.com/?api_key=k123&url=https%3A%2F%2Fwww.rvtrader.com%2Fx%3Fa%3D1%26b%3D2"
    );
}

#[test]
fn relay_debug_redacts_api_key() {
    let relay = RequestRelay {
        base_url: "http://api.scraperapi.com".to_owned(),
        api_key: "k123".to_owned(),
    };
    let debug = format!("{relay:?}");
    assert!(!debug.contains("k123"));
}
