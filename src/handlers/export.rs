//! Conversation export endpoint
//!
//! `POST /export {history, format}` renders a conversation as JSON, Markdown, or
//! plain text and returns it as `{ "data": "..." }`. Nothing here touches the
//! cache or the upstream services.

use crate::business::{ChatMessage, Role};
use crate::error::{AppError, AppResult};
use crate::handlers::extractor::ApiJson;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Markdown,
    Text,
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "markdown" => Ok(Self::Markdown),
            "text" => Ok(Self::Text),
            other => Err(AppError::validation(format!(
                "Unsupported export format: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub data: String,
}

fn heading(role: Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
    }
}

/// Render `history` in `format`
///
/// # Errors
/// Returns an internal error if JSON encoding fails.
pub fn render(history: &[ChatMessage], format: ExportFormat) -> AppResult<String> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(history)
            .map_err(|e| AppError::Internal(format!("failed to encode history: {e}"))),
        ExportFormat::Markdown => Ok(history
            .iter()
            .map(|turn| format!("### {}\n{}\n", heading(turn.role), turn.content))
            .collect::<Vec<_>>()
            .join("\n")),
        ExportFormat::Text => Ok(history
            .iter()
            .map(|turn| {
                format!(
                    "{}: {}",
                    turn.role.as_str().to_ascii_uppercase(),
                    turn.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")),
    }
}

/// POST /export handler
pub async fn handler(ApiJson(request): ApiJson<ExportRequest>) -> AppResult<Json<ExportResponse>> {
    let format: ExportFormat = request.format.parse()?;
    let data = render(&request.history, format)?;

    tracing::debug!(
        format = ?format,
        turns = request.history.len(),
        "Exported conversation"
    );

    Ok(Json(ExportResponse { data }))
}
