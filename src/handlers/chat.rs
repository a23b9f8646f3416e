//! Chat endpoint handler
//!
//! Handles `POST /chat?page=&limit=` by validating the request and handing it to the
//! orchestrator. The body returned is the serialized response envelope, byte for
//! byte what the cache stores.

use crate::business::ChatMessage;
use crate::config::PaginationConfig;
use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::handlers::extractor::{ApiJson, ApiQuery, INVALID_REQUEST};
use crate::orchestrator::{ChatQuery, DEFAULT_PAGE, Pagination};
use axum::{
    extract::State,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Maximum allowed message length in characters
pub const MAX_MESSAGE_LENGTH: usize = 1000;

/// Response header telling whether the envelope came from the cache
pub const CACHE_HEADER: &str = "x-cache";

/// Chat request from client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// `?page=&limit=` query parameters; an empty value counts as absent
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub page: Option<u32>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub limit: Option<u32>,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid number '{value}': {e}"))),
    }
}

/// One failed field check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl ChatRequest {
    /// Check the body and query, returning every problem found
    pub fn field_errors(&self, params: &PageParams, limits: &PaginationConfig) -> Vec<FieldError> {
        let mut errors = Vec::new();

        // Count Unicode characters, not bytes
        let char_count = self.message.chars().count();
        if self.message.trim().is_empty() {
            errors.push(FieldError::new(
                "message",
                "message cannot be empty or contain only whitespace",
            ));
        } else if char_count > MAX_MESSAGE_LENGTH {
            errors.push(FieldError::new(
                "message",
                format!(
                    "message exceeds maximum length of {MAX_MESSAGE_LENGTH} characters (got {char_count})"
                ),
            ));
        }

        for (index, turn) in self.history.iter().enumerate() {
            if turn.content.is_empty() {
                errors.push(FieldError::new(
                    format!("history[{index}].content"),
                    "content cannot be empty",
                ));
            }
        }

        if params.page == Some(0) {
            errors.push(FieldError::new("page", "page must be at least 1"));
        }
        if params
            .limit
            .is_some_and(|limit| limit == 0 || limit > limits.max_limit)
        {
            errors.push(FieldError::new(
                "limit",
                format!("limit must be between 1 and {}", limits.max_limit),
            ));
        }

        errors
    }

    /// Validate and convert into an orchestrator query
    ///
    /// # Errors
    /// Returns `ValidationError("Invalid request data")` listing every failed field.
    pub fn into_query(self, params: PageParams, limits: &PaginationConfig) -> AppResult<ChatQuery> {
        let errors = self.field_errors(&params, limits);
        if !errors.is_empty() {
            return Err(AppError::validation_with(
                INVALID_REQUEST,
                json!({ "fields": errors }),
            ));
        }

        let pagination = Pagination::new(
            params.page.unwrap_or(DEFAULT_PAGE),
            params.limit.unwrap_or(limits.default_limit),
        )?;

        Ok(ChatQuery {
            message: self.message,
            history: self.history,
            pagination,
        })
    }
}

/// POST /chat handler
pub async fn handler(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<PageParams>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> AppResult<Response> {
    let query = request.into_query(params, &state.config().pagination)?;

    tracing::debug!(
        message_length = query.message.len(),
        history_length = query.history.len(),
        page = query.pagination.page(),
        limit = query.pagination.limit(),
        "Received chat request"
    );

    let reply = state.orchestrator().handle(&query).await?;
    let cache_status = if reply.cached { "hit" } else { "miss" };

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            ),
            (
                header::HeaderName::from_static(CACHE_HEADER),
                HeaderValue::from_static(cache_status),
            ),
        ],
        reply.body,
    )
        .into_response())
}
