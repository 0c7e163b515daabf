use std::sync::Arc;

use biffcross_lib::error::AppError;
use biffcross_lib::loader::{ConfigLoader, ConfigSource, FetchResponse};
use biffcross_lib::validate::validate_config;

mod util;
use util::{settings, FakeFetcher};

fn loader(fetcher: FakeFetcher) -> (ConfigLoader, Arc<FakeFetcher>) {
    let fetcher = Arc::new(fetcher);
    (ConfigLoader::new(settings(), fetcher.clone()), fetcher)
}

#[tokio::test]
async fn missing_document_yields_a_valid_default() {
    let (loader, _) = loader(FakeFetcher::always_status(404));
    let outcome = loader.load().await.expect("404 is not an error");
    assert_eq!(outcome.source, ConfigSource::DefaultMissing);

    let report = validate_config(&outcome.config);
    assert!(report.is_valid, "default must validate: {:?}", report.errors);
    assert_eq!(outcome.config.site.title, "Biff Cross Photography");
    assert_eq!(outcome.config.categories.len(), 5);
}

#[tokio::test]
async fn transient_failures_are_retried_then_defaulted() {
    let (loader, fetcher) = loader(FakeFetcher::always_status(503));
    let outcome = loader.load().await.expect("unreachable falls back");
    assert_eq!(outcome.source, ConfigSource::DefaultUnreachable);
    assert_eq!(fetcher.requests().len(), 3, "default retry budget is 3");
}

#[tokio::test]
async fn network_error_then_success_uses_the_remote_document() {
    let body = serde_json::to_string(&biffcross_lib::default_config()).unwrap();
    let (loader, fetcher) = loader(FakeFetcher::new(vec![
        Err(AppError::new("HTTP/CONNECT", "connection refused")),
        Ok(FetchResponse { status: 200, body }),
    ]));
    let outcome = loader.load().await.expect("second attempt succeeds");
    assert_eq!(outcome.source, ConfigSource::Remote);
    assert_eq!(fetcher.requests().len(), 2);
}

#[tokio::test]
async fn every_request_is_cache_busted() {
    let (loader, fetcher) = loader(FakeFetcher::always_status(404));
    loader.load().await.expect("load");
    for url in fetcher.requests() {
        assert!(
            url.contains("portfolio-config.json?cb="),
            "expected cache-busting query parameter in {url}"
        );
    }
}

#[tokio::test]
async fn malformed_json_is_a_parse_error_not_a_retry() {
    let (loader, fetcher) = loader(FakeFetcher::always_body("{\"site\": "));
    let err = loader.load().await.expect_err("broken bytes must surface");
    assert!(err.code().starts_with("JSON/"), "got {}", err.code());
    assert_eq!(
        fetcher.requests().len(),
        1,
        "parse failures must not burn the retry budget"
    );
}

#[tokio::test]
async fn schema_invalid_document_is_a_validation_error() {
    let body = r#"{
        "site": { "title": "", "description": "d", "instagram": "i" },
        "categories": [],
        "images": {}
    }"#;
    let (loader, _) = loader(FakeFetcher::always_body(body));
    let err = loader.load().await.expect_err("invalid doc must surface");
    assert_eq!(err.code(), "CONFIG/VALIDATION");
    assert!(err.context().contains_key("errors"));
}

#[tokio::test]
async fn older_documents_inherit_missing_sections_from_defaults() {
    // No easterEggs section and a site with only a title: field-by-field
    // merge keeps the title and fills the rest.
    let body = r#"{
        "site": { "title": "Old Portfolio" },
        "categories": [],
        "images": {}
    }"#;
    let (loader, _) = loader(FakeFetcher::always_body(body));
    let outcome = loader.load().await.expect("merged document loads");
    assert_eq!(outcome.config.site.title, "Old Portfolio");
    assert_eq!(
        outcome.config.site.description,
        "Professional photography portfolio"
    );
    assert!(!outcome.config.easter_eggs.fireworks_enabled);
    assert!(outcome.config.categories.is_empty(), "categories are wholesale");
}

#[tokio::test]
async fn public_site_entry_point_never_fails() {
    let (loader, _) = loader(FakeFetcher::always_body("not json at all"));
    let config = loader.load_or_default().await;
    assert_eq!(config.site.title, "Biff Cross Photography");
}
