//! Error types for adscout
//!
//! Every failure that crosses a component boundary is an [`AppError`]. Each variant
//! carries a stable machine-readable [`ErrorKind`] and an HTTP status, and all errors
//! implement `IntoResponse` for Axum handlers.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Keys removed from error details before they are rendered to a client
const SECRET_KEYS: &[&str] = &[
    "apikey",
    "api_key",
    "password",
    "token",
    "secret",
    "authorization",
];

/// Machine-readable error classification
///
/// The string form is part of the public JSON contract (`error.type`), so the
/// names must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Client-correctable request problem (400)
    Validation,
    /// Nothing matched the request (404)
    NotFound,
    /// Upstream scraper failure (502)
    ExternalApi,
    /// Upstream language model failure (502)
    Classifier,
    /// Too many requests, inbound or upstream (429)
    RateLimit,
    /// Anything unrecognized (500)
    Internal,
}

impl ErrorKind {
    /// Stable string used in JSON bodies and retry pattern matching
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::ExternalApi => "ExternalAPIError",
            ErrorKind::Classifier => "ClassifierError",
            ErrorKind::RateLimit => "RateLimitError",
            ErrorKind::Internal => "InternalError",
        }
    }

    /// HTTP status this kind maps to
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::ExternalApi | ErrorKind::Classifier => StatusCode::BAD_GATEWAY,
            ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid request: {message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Scraper API error: {message}")]
    ExternalApi {
        message: String,
        details: Option<Value>,
    },

    #[error("Classifier error: {message}")]
    Classifier {
        message: String,
        details: Option<Value>,
    },

    #[error("Rate limited: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<u64>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file '{path}': {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn external_api(message: impl Into<String>) -> Self {
        Self::ExternalApi {
            message: message.into(),
            details: None,
        }
    }

    pub fn external_api_with(message: impl Into<String>, details: Value) -> Self {
        Self::ExternalApi {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn classifier(message: impl Into<String>) -> Self {
        Self::Classifier {
            message: message.into(),
            details: None,
        }
    }

    pub fn classifier_with(message: impl Into<String>, details: Value) -> Self {
        Self::Classifier {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn rate_limit(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    /// Machine-readable kind of this error
    ///
    /// Configuration failures only happen at startup; if one ever reaches a
    /// handler it is reported as an internal error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ExternalApi { .. } => ErrorKind::ExternalApi,
            Self::Classifier { .. } => ErrorKind::Classifier,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        self.kind().status()
    }

    /// Human-readable message without the kind prefix used by `Display`
    pub fn message(&self) -> String {
        match self {
            Self::Validation { message, .. }
            | Self::ExternalApi { message, .. }
            | Self::Classifier { message, .. }
            | Self::RateLimit { message, .. } => message.clone(),
            Self::NotFound(message) | Self::Internal(message) => message.clone(),
            _ => self.to_string(),
        }
    }

    /// Structured details, if any
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::Validation { details, .. }
            | Self::ExternalApi { details, .. }
            | Self::Classifier { details, .. } => details.clone(),
            Self::RateLimit {
                retry_after: Some(seconds),
                ..
            } => Some(serde_json::json!({ "retryAfter": seconds })),
            _ => None,
        }
    }

    /// Seconds the caller should wait before retrying, when known
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Terminal errors are never worth retrying, whatever a pattern says
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::NotFound)
    }
}

/// JSON error body: `{"error": {"type", "message", "details", "status"}}`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorPayload,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub status: u16,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        Self {
            error: ErrorPayload {
                kind: err.kind().as_str(),
                message: err.message(),
                details: err.details().map(sanitize_details),
                status: err.status().as_u16(),
            },
        }
    }
}

/// Strip secret-looking keys from a details payload, recursively
pub fn sanitize_details(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !SECRET_KEYS.contains(&key.to_ascii_lowercase().as_str()))
                .map(|(key, value)| (key, sanitize_details(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_details).collect()),
        other => other,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = ?self, kind = %self.kind(), "Request failed");
        } else {
            tracing::debug!(error = %self, kind = %self.kind(), "Request rejected");
        }

        let mut response = (status, Json(ErrorBody::from(&self))).into_response();

        if let Some(seconds) = self.retry_after() {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
