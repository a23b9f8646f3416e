//! Shared helpers for integration tests
//!
//! The scraper and classifier APIs are stood in for by wiremock servers; the app is
//! built through the same `AppState::from_config` path the binary uses.

#![allow(dead_code)]

use adscout::config::{Config, Secrets};
use adscout::handlers::AppState;
use adscout::server;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use serde_json::{Value, json};
use std::str::FromStr;
use tower::ServiceExt;
use wiremock::{MockServer, ResponseTemplate};

/// Config pointing both clients at mock servers with millisecond backoff
pub fn config_for(classifier: &MockServer, scraper: &MockServer, extra: &str) -> Config {
    let toml = format!(
        r#"
[classifier]
base_url = "{classifier}/v1"
timeout_seconds = 1

[classifier.retry]
initial_delay_ms = 10
max_delay_ms = 50

[scraper]
base_url = "{scraper}/v1"
timeout_seconds = 1

[scraper.retry]
initial_delay_ms = 10
max_delay_ms = 50

{extra}
"#,
        classifier = classifier.uri(),
        scraper = scraper.uri(),
    );
    Config::from_str(&toml).expect("test config should be valid")
}

pub async fn app_with(config: Config) -> Router {
    let secrets = Secrets::new("sk-test-key", "fc-test-key");
    let state = AppState::from_config(config, &secrets)
        .await
        .expect("state should build");
    server::router(state)
}

pub async fn app(classifier: &MockServer, scraper: &MockServer) -> Router {
    app_with(config_for(classifier, scraper, "")).await
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub raw: Vec<u8>,
    pub json: Value,
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.expect("request should complete");
    let status = response.status();
    let headers = response.headers().clone();
    let raw = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable")
        .to_vec();
    let json = serde_json::from_slice(&raw).unwrap_or(Value::Null);
    TestResponse {
        status,
        headers,
        raw,
        json,
    }
}

pub fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post_from(uri: &str, body: &Value, client: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Chat completion whose reply is plain text
pub fn text_completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

/// Chat completion whose reply is a single tool call
pub fn tool_completion(name: &str, arguments: &Value) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": name, "arguments": arguments.to_string() }
                }]
            },
            "finish_reason": "tool_calls"
        }]
    })
}

/// Search envelope with `count` results, `https://shop{i}.example`
pub fn search_results(count: usize) -> Value {
    let data: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "url": format!("https://shop{i}.example"),
                "title": format!("Shop {i}"),
                "description": format!("Result {i}"),
                "markdown": format!("# Shop {i}")
            })
        })
        .collect();
    json!({ "success": true, "data": data })
}

/// Search responder that honours the `limit` in the request body
pub struct LimitedSearch {
    pub available: usize,
}

impl wiremock::Respond for LimitedSearch {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        let requested = request
            .body_json::<Value>()
            .ok()
            .and_then(|body| body["limit"].as_u64())
            .unwrap_or(0) as usize;
        ResponseTemplate::new(200).set_body_json(search_results(requested.min(self.available)))
    }
}

pub fn extraction() -> Value {
    json!({
        "success": true,
        "data": {
            "business_info": {
                "name": "Joe's Pizza",
                "address": "1 Main St, Austin, TX",
                "phone": "555-0100",
                "website": "https://shop0.example",
                "business_type": "restaurant"
            },
            "branding": { "colors": ["red", "white"], "logo_url": "https://shop0.example/logo.png" },
            "marketing": {
                "target_audience": "Families and students",
                "promotions": [{ "type": "discount", "description": "Two for one", "value": "50%" }],
                "key_messages": ["Fresh dough daily"]
            }
        }
    })
}

pub fn images() -> Value {
    json!({
        "success": true,
        "data": {
            "actions": {
                "javascriptReturns": [{
                    "type": "object",
                    "value": [{ "src": "https://shop0.example/hero.jpg", "alt": "Storefront", "width": 800, "height": 600 }]
                }]
            }
        }
    })
}

pub const SUMMARY: &str = "Target Audience: Families and students nearby.\n\
Competitive Advantage: Fresh dough daily.\n\
Offer Development: Two for one on Tuesdays.\n\
Design Recommendations: Red and white palette.\n\
Campaign Timing: Back-to-school season.";
