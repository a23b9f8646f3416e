//! Shared HTTP failure classification for the outbound clients
//!
//! Transport failures are rendered into messages containing stable tokens
//! (`ECONNREFUSED`, `ECONNRESET`, `ETIMEDOUT`, `HTTP <status>`) so that retry
//! patterns can classify them by plain string or regex matching.

use crate::error::AppError;
use crate::metrics::Operation;
use reqwest::header::RETRY_AFTER;
use serde_json::{Value, json};

/// Longest provider body excerpt kept in error details
const MAX_BODY_EXCERPT: usize = 512;

/// Which remote service a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Scraper,
    Classifier,
}

impl Upstream {
    /// Build the kind matching this upstream (`ExternalAPIError` or `ClassifierError`)
    pub fn error(self, message: impl Into<String>, details: Option<Value>) -> AppError {
        match (self, details) {
            (Upstream::Scraper, Some(details)) => AppError::external_api_with(message, details),
            (Upstream::Scraper, None) => AppError::external_api(message),
            (Upstream::Classifier, Some(details)) => AppError::classifier_with(message, details),
            (Upstream::Classifier, None) => AppError::classifier(message),
        }
    }
}

/// Token naming a failed send, if it was a transport failure
///
/// Builder, redirect and decode failures get no token so the default retry
/// patterns leave them alone.
fn transport_token(err: &reqwest::Error) -> Option<&'static str> {
    if err.is_timeout() {
        Some("ETIMEDOUT")
    } else if err.is_connect() {
        Some("ECONNREFUSED")
    } else if err.is_request() || err.is_body() {
        Some("ECONNRESET")
    } else {
        None
    }
}

/// Short description of a failure that is not a transport failure
fn failure_class(err: &reqwest::Error) -> &'static str {
    if err.is_builder() {
        "invalid request"
    } else if err.is_redirect() {
        "redirect policy violated"
    } else if err.is_decode() {
        "undecodable response"
    } else {
        "unexpected client error"
    }
}

/// Map a failure to send the request (or to read its body) into a typed error
pub fn send_error(upstream: Upstream, operation: Operation, err: &reqwest::Error) -> AppError {
    let reason = transport_token(err).unwrap_or_else(|| failure_class(err));
    tracing::debug!(
        operation = %operation,
        reason = reason,
        error = %err,
        "Upstream transport failure"
    );
    upstream.error(format!("{operation} request failed: {reason}"), None)
}

/// Map a non-success HTTP response into a typed error
///
/// A 429 becomes a rate-limit error carrying the provider's `Retry-After` (in
/// seconds) when it sent one. Everything else is the upstream's own kind with an
/// `HTTP <status>` token in the message.
pub async fn status_error(
    upstream: Upstream,
    operation: Operation,
    response: reqwest::Response,
) -> AppError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    let message = format!("{operation} request failed: HTTP {}", status.as_u16());

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return AppError::rate_limit(message, retry_after);
    }

    upstream.error(
        message,
        Some(json!({
            "status": status.as_u16(),
            "body": body_excerpt(&body),
        })),
    )
}

/// Provider body as JSON when it parses, otherwise a truncated string
fn body_excerpt(body: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return value;
    }
    let mut end = body.len().min(MAX_BODY_EXCERPT);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    Value::String(body[..end].to_string())
}

/// Remove `null` members so serde defaults apply to every absent or null field
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(strip_nulls)
                .collect(),
        ),
        other => other,
    }
}
