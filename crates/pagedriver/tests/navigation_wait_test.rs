//! Navigation and polling-wait semantics against the mock endpoint.

use std::time::{Duration, Instant};

use pagedriver::{Browser, ConnectOptions, Error, WaitCondition};
use serde_json::json;

mod common;
use common::{MockCdp, eval_value, install_page};

fn fast_poll_options() -> ConnectOptions {
    ConnectOptions::new()
        .load_poll_initial_delay(Duration::from_millis(10))
        .load_poll_interval(Duration::from_millis(25))
        .load_timeout(Duration::from_millis(400))
        .wait_for_poll_interval(Duration::from_millis(25))
}

#[tokio::test]
async fn test_goto_returns_silently_after_load_timeout() {
    common::init_tracing();
    let mock = MockCdp::start().await;
    install_page(&mock, "T1", "S1", "https://example.com");
    mock.on("Page.navigate", json!({"frameId": "F1"}));
    // Document never reports complete.
    mock.on("Runtime.evaluate", eval_value(json!("loading")));

    let browser = Browser::connect_url_with(&mock.ws_url(), fast_poll_options())
        .await
        .unwrap();
    let page = browser.list_pages().await.unwrap()[0].id;

    let started = Instant::now();
    browser.goto(page, "https://slow.example").await.unwrap();
    let elapsed = started.elapsed();

    // Approximately the configured deadline, and no error raised.
    assert!(elapsed >= Duration::from_millis(350), "returned too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "returned too late: {elapsed:?}");

    browser.disconnect().await;
}

#[tokio::test]
async fn test_goto_returns_once_document_completes() {
    common::init_tracing();
    let mock = MockCdp::start().await;
    install_page(&mock, "T1", "S1", "https://example.com");
    mock.on("Page.navigate", json!({"frameId": "F1"}));
    mock.on_seq(
        "Runtime.evaluate",
        vec![
            eval_value(json!("loading")),
            eval_value(json!("interactive")),
            eval_value(json!("complete")),
        ],
    );

    let options = fast_poll_options().load_timeout(Duration::from_secs(10));
    let browser = Browser::connect_url_with(&mock.ws_url(), options).await.unwrap();
    let page = browser.list_pages().await.unwrap()[0].id;

    let started = Instant::now();
    browser.goto(page, "https://quick.example").await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    // Readiness was polled, not assumed.
    let evaluates = mock.calls_of("Runtime.evaluate");
    assert_eq!(evaluates.len(), 3);
    assert_eq!(evaluates[0].params["expression"], "document.readyState");
    assert_eq!(evaluates[0].session_id.as_deref(), Some("S1"));

    browser.disconnect().await;
}

#[tokio::test]
async fn test_goto_surfaces_navigation_error_text() {
    common::init_tracing();
    let mock = MockCdp::start().await;
    install_page(&mock, "T1", "S1", "https://example.com");
    mock.on(
        "Page.navigate",
        json!({"frameId": "F1", "errorText": "net::ERR_NAME_NOT_RESOLVED"}),
    );

    let browser = Browser::connect_url_with(&mock.ws_url(), fast_poll_options())
        .await
        .unwrap();
    let page = browser.list_pages().await.unwrap()[0].id;

    let err = browser.goto(page, "https://bad.invalid").await.unwrap_err();
    match err {
        Error::Navigation(text) => assert!(text.contains("ERR_NAME_NOT_RESOLVED")),
        other => panic!("expected Navigation error, got {other:?}"),
    }

    browser.disconnect().await;
}

#[tokio::test]
async fn test_readiness_polling_swallows_transient_cdp_errors() {
    common::init_tracing();
    let mock = MockCdp::start().await;
    install_page(&mock, "T1", "S1", "https://example.com");
    mock.on("Page.navigate", json!({"frameId": "F1"}));
    // The evaluation context is gone for the whole window; goto must still
    // return normally at the deadline instead of surfacing the error.
    mock.on_error("Runtime.evaluate", -32000, "Cannot find context with specified id");

    let browser = Browser::connect_url_with(&mock.ws_url(), fast_poll_options())
        .await
        .unwrap();
    let page = browser.list_pages().await.unwrap()[0].id;

    browser.goto(page, "https://example.com").await.unwrap();

    browser.disconnect().await;
}

#[tokio::test]
async fn test_wait_for_text_match() {
    common::init_tracing();
    let mock = MockCdp::start().await;
    install_page(&mock, "T1", "S1", "https://example.com");
    mock.on("Runtime.evaluate", eval_value(json!(true)));

    let browser = Browser::connect_url_with(&mock.ws_url(), fast_poll_options())
        .await
        .unwrap();
    let page = browser.list_pages().await.unwrap()[0].id;

    let found = browser
        .wait_for(page, WaitCondition::text("Welcome"), Duration::from_secs(2))
        .await
        .unwrap();
    assert!(found);

    // The probe embedded the text as a JSON string literal.
    let probe = mock.wait_for_call("Runtime.evaluate").await;
    let expression = probe.params["expression"].as_str().unwrap();
    assert!(expression.contains("includes(\"Welcome\")"));

    browser.disconnect().await;
}

#[tokio::test]
async fn test_wait_for_timeout_returns_false() {
    common::init_tracing();
    let mock = MockCdp::start().await;
    install_page(&mock, "T1", "S1", "https://example.com");
    mock.on("Runtime.evaluate", eval_value(json!(false)));

    let browser = Browser::connect_url_with(&mock.ws_url(), fast_poll_options())
        .await
        .unwrap();
    let page = browser.list_pages().await.unwrap()[0].id;

    let started = Instant::now();
    let found = browser
        .wait_for(
            page,
            WaitCondition::selector("#never"),
            Duration::from_millis(300),
        )
        .await
        .unwrap();
    assert!(!found);
    assert!(started.elapsed() >= Duration::from_millis(250));

    browser.disconnect().await;
}

#[tokio::test]
async fn test_wait_for_empty_condition_is_false_not_an_error() {
    common::init_tracing();
    let mock = MockCdp::start().await;
    install_page(&mock, "T1", "S1", "https://example.com");

    let browser = Browser::connect_url_with(&mock.ws_url(), fast_poll_options())
        .await
        .unwrap();
    let page = browser.list_pages().await.unwrap()[0].id;

    let found = browser
        .wait_for(page, WaitCondition::default(), Duration::from_secs(1))
        .await
        .unwrap();
    assert!(!found);
    // No probe was ever issued.
    assert!(mock.calls_of("Runtime.evaluate").is_empty());

    browser.disconnect().await;
}

#[tokio::test]
async fn test_go_back_at_history_edge_is_a_no_op() {
    common::init_tracing();
    let mock = MockCdp::start().await;
    install_page(&mock, "T1", "S1", "https://example.com");
    mock.on(
        "Page.getNavigationHistory",
        json!({
            "currentIndex": 0,
            "entries": [{"id": 11, "url": "https://example.com"}],
        }),
    );

    let browser = Browser::connect_url_with(&mock.ws_url(), fast_poll_options())
        .await
        .unwrap();
    let page = browser.list_pages().await.unwrap()[0].id;

    let moved = browser.go_back(page).await.unwrap();
    assert!(!moved);
    assert!(mock.calls_of("Page.navigateToHistoryEntry").is_empty());

    browser.disconnect().await;
}

#[tokio::test]
async fn test_go_back_navigates_to_previous_entry() {
    common::init_tracing();
    let mock = MockCdp::start().await;
    install_page(&mock, "T1", "S1", "https://example.com/two");
    mock.on(
        "Page.getNavigationHistory",
        json!({
            "currentIndex": 1,
            "entries": [
                {"id": 11, "url": "https://example.com/one"},
                {"id": 12, "url": "https://example.com/two"},
            ],
        }),
    );
    mock.on("Runtime.evaluate", eval_value(json!("complete")));

    let browser = Browser::connect_url_with(&mock.ws_url(), fast_poll_options())
        .await
        .unwrap();
    let page = browser.list_pages().await.unwrap()[0].id;

    let moved = browser.go_back(page).await.unwrap();
    assert!(moved);

    let nav = mock.wait_for_call("Page.navigateToHistoryEntry").await;
    assert_eq!(nav.params["entryId"], 11);

    browser.disconnect().await;
}
