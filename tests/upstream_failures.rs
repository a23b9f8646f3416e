//! Retry and error-mapping behavior for failing upstream services
//!
//! Every scenario runs through the HTTP router so the final status code, the typed
//! error body, and the number of upstream attempts are all checked together.

mod common;

use common::*;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_search_call(classifier: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({ "tool_choice": "auto" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_completion(
            "analyze_business_query",
            &json!({ "business_name": "Joe's Pizza" }),
        )))
        .mount(classifier)
        .await;
}

async fn mount_one_result(scraper: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_results(1)))
        .mount(scraper)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .respond_with(ResponseTemplate::new(200).set_body_json(images()))
        .mount(scraper)
        .await;
}

#[tokio::test]
async fn test_extract_timeout_is_retried_then_bad_gateway() {
    let classifier = MockServer::start().await;
    let scraper = MockServer::start().await;
    mount_search_call(&classifier).await;
    mount_one_result(&scraper).await;
    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(extraction())
                .set_delay(Duration::from_secs(3)),
        )
        .expect(3)
        .mount(&scraper)
        .await;

    let app = app(&classifier, &scraper).await;
    let response = send(&app, post("/chat", &json!({ "message": "Research Joe's Pizza" }))).await;

    assert_eq!(response.status, 502);
    assert_eq!(response.json["error"]["type"], "ExternalAPIError");
    let message = response.json["error"]["message"].as_str().unwrap();
    assert!(message.contains("ETIMEDOUT"), "message: {message}");
}

#[tokio::test]
async fn test_scraper_server_error_recovers_on_retry() {
    let classifier = MockServer::start().await;
    let scraper = MockServer::start().await;
    mount_search_call(&classifier).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({ "max_tokens": 2000 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_completion(SUMMARY)))
        .mount(&classifier)
        .await;

    // First search attempt fails with 503, the retry succeeds
    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&scraper)
        .await;
    mount_one_result(&scraper).await;
    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(extraction()))
        .mount(&scraper)
        .await;

    let app = app(&classifier, &scraper).await;
    let response = send(&app, post("/chat", &json!({ "message": "Research Joe's Pizza" }))).await;

    assert_eq!(response.status, 200, "body: {}", response.json);
    assert_eq!(response.json["type"], "business_info");
}

#[tokio::test]
async fn test_classifier_server_errors_exhaust_retries() {
    let classifier = MockServer::start().await;
    let scraper = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&classifier)
        .await;

    let app = app(&classifier, &scraper).await;
    let response = send(&app, post("/chat", &json!({ "message": "hello" }))).await;

    assert_eq!(response.status, 502);
    assert_eq!(response.json["error"]["type"], "ClassifierError");
    assert!(response.json["error"]["message"].as_str().unwrap().contains("HTTP 500"));
    assert_eq!(response.json["error"]["details"]["status"], 500);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let classifier = MockServer::start().await;
    let scraper = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "bad model" }
        })))
        .expect(1)
        .mount(&classifier)
        .await;

    let app = app(&classifier, &scraper).await;
    let response = send(&app, post("/chat", &json!({ "message": "hello" }))).await;

    assert_eq!(response.status, 502);
    assert_eq!(response.json["error"]["type"], "ClassifierError");
}

#[tokio::test]
async fn test_upstream_rate_limit_surfaces_retry_after() {
    let classifier = MockServer::start().await;
    let scraper = MockServer::start().await;
    mount_search_call(&classifier).await;
    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .expect(3)
        .mount(&scraper)
        .await;

    let app = app(&classifier, &scraper).await;
    let response = send(&app, post("/chat", &json!({ "message": "Research Joe's Pizza" }))).await;

    assert_eq!(response.status, 429);
    assert_eq!(response.json["error"]["type"], "RateLimitError");
    assert_eq!(response.json["error"]["details"]["retryAfter"], 7);
    assert_eq!(response.headers["retry-after"], "7");
}

#[tokio::test]
async fn test_empty_extraction_is_terminal_validation_error() {
    let classifier = MockServer::start().await;
    let scraper = MockServer::start().await;
    mount_search_call(&classifier).await;
    mount_one_result(&scraper).await;
    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": {} })))
        .expect(1)
        .mount(&scraper)
        .await;

    let app = app(&classifier, &scraper).await;
    let response = send(&app, post("/chat", &json!({ "message": "Research Joe's Pizza" }))).await;

    assert_eq!(response.status, 400);
    assert_eq!(response.json["error"]["type"], "ValidationError");
    assert_eq!(response.json["error"]["message"], "No data returned from extraction");
}

#[tokio::test]
async fn test_connection_refused_is_external_api_error() {
    let classifier = MockServer::start().await;
    let scraper = MockServer::start().await;
    mount_search_call(&classifier).await;

    // Reserve a free port, then release it so nothing listens there
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let mut config = config_for(&classifier, &scraper, "");
    config.scraper.base_url = format!("http://127.0.0.1:{port}/v1");

    let app = app_with(config).await;
    let response = send(&app, post("/chat", &json!({ "message": "Research Joe's Pizza" }))).await;

    assert_eq!(response.status, 502);
    assert_eq!(response.json["error"]["type"], "ExternalAPIError");
    assert!(
        response.json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("ECONNREFUSED")
    );
}

#[tokio::test]
async fn test_api_keys_never_appear_in_error_bodies() {
    let classifier = MockServer::start().await;
    let scraper = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Incorrect API key provided" },
            "api_key": "sk-test-key"
        })))
        .mount(&classifier)
        .await;

    let app = app(&classifier, &scraper).await;
    let response = send(&app, post("/chat", &json!({ "message": "hello" }))).await;

    assert_eq!(response.status, 502);
    assert_eq!(
        response.json["error"]["details"]["body"]["error"]["message"],
        "Incorrect API key provided"
    );
    let body = String::from_utf8(response.raw).unwrap();
    assert!(!body.contains("sk-test-key"));
}
