//! OpenAI chat-completions implementation of [`Classifier`]

use super::{AnalysisResult, Classifier, Summary, function_signatures};
use crate::business::ChatMessage;
use crate::error::{AppError, AppResult};
use crate::metrics::Operation;
use crate::retry::Retrier;
use crate::upstream::{self, Upstream};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

const ANALYZE_SYSTEM_PROMPT: &str = "You are a direct mail advertising assistant for local \
businesses. Decide whether the user is asking about a specific business. If so, call a function: \
analyze_business_query to look the business up, or extract_business_info when the conversation \
already contains its details. Otherwise answer conversationally. Campaigns target Valpak and \
Clipper Magazine formats.";

const SUMMARIZE_SYSTEM_PROMPT: &str = "You are a direct mail advertising specialist. Analyze the \
business information you are given and write campaign recommendations under these headings, each \
followed by a colon: Target Audience, Competitive Advantage, Offer Development, Design \
Recommendations, Campaign Timing.";

/// Classifier backed by an OpenAI-compatible `/chat/completions` endpoint
#[derive(Clone)]
pub struct OpenAiClassifier {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    summary_temperature: f32,
    summary_max_tokens: u32,
    retrier: Retrier,
}

impl std::fmt::Debug for OpenAiClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClassifier")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
    /// Legacy single-function form, still emitted by some compatible servers
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl OpenAiClassifier {
    /// Create a classifier client
    ///
    /// # Errors
    /// Returns an internal error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        summary_temperature: f32,
        summary_max_tokens: u32,
        retrier: Retrier,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::Internal(format!("failed to build classifier HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            summary_temperature,
            summary_max_tokens,
            retrier,
        })
    }

    async fn complete(&self, operation: Operation, body: &Value) -> AppResult<AssistantMessage> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| upstream::send_error(Upstream::Classifier, operation, &e))?;

        if !response.status().is_success() {
            return Err(upstream::status_error(Upstream::Classifier, operation, response).await);
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                AppError::classifier(format!("{operation} returned a malformed response"))
            } else {
                upstream::send_error(Upstream::Classifier, operation, &e)
            }
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| AppError::classifier(format!("{operation} returned no choices")))
    }

    async fn analyze_once(&self, message: &str, history: &[ChatMessage]) -> AppResult<AnalysisResult> {
        let tools: Vec<Value> = function_signatures()
            .as_array()
            .into_iter()
            .flatten()
            .map(|function| json!({ "type": "function", "function": function }))
            .collect();

        let body = json!({
            "model": self.model,
            "messages": build_messages(ANALYZE_SYSTEM_PROMPT, history, message),
            "tools": tools,
            "tool_choice": "auto",
        });

        let reply = self.complete(Operation::Analyze, &body).await?;
        interpret_reply(reply)
    }

    async fn summarize_once(
        &self,
        business_data: &Value,
        history: &[ChatMessage],
    ) -> AppResult<Summary> {
        let data = serde_json::to_string_pretty(business_data)
            .map_err(|e| AppError::Internal(format!("failed to encode business data: {e}")))?;
        let prompt = format!(
            "Analyze this business information and provide detailed recommendations for a \
             direct mail campaign. Consider the target audience, competitive landscape, and \
             local market conditions.\n\nBusiness Data:\n{data}"
        );

        let body = json!({
            "model": self.model,
            "messages": build_messages(SUMMARIZE_SYSTEM_PROMPT, history, &prompt),
            "temperature": self.summary_temperature,
            "max_tokens": self.summary_max_tokens,
        });

        let reply = self.complete(Operation::Summarize, &body).await?;
        Ok(Summary::from_content(reply.content.unwrap_or_default()))
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn analyze(&self, message: &str, history: &[ChatMessage]) -> AppResult<AnalysisResult> {
        self.retrier
            .run(Operation::Analyze, move || self.analyze_once(message, history))
            .await
    }

    async fn summarize(&self, business_data: &Value, history: &[ChatMessage]) -> AppResult<Summary> {
        self.retrier
            .run(Operation::Summarize, move || {
                self.summarize_once(business_data, history)
            })
            .await
    }
}

/// System prompt, then the ordered history, then the new user turn
fn build_messages(system: &str, history: &[ChatMessage], user: &str) -> Vec<Value> {
    std::iter::once(json!({ "role": "system", "content": system }))
        .chain(
            history
                .iter()
                .map(|m| json!({ "role": m.role.as_str(), "content": m.content })),
        )
        .chain(std::iter::once(json!({ "role": "user", "content": user })))
        .collect()
}

/// Turn the assistant's reply into an [`AnalysisResult`]
///
/// Tool calls take precedence over the legacy `function_call` field. Arguments that
/// are not valid JSON are a classifier failure, never a plain message.
fn interpret_reply(reply: AssistantMessage) -> AppResult<AnalysisResult> {
    let call = reply
        .tool_calls
        .into_iter()
        .flatten()
        .next()
        .map(|tool| tool.function)
        .or(reply.function_call);

    let preceding_text = reply.content.filter(|text| !text.trim().is_empty());

    match call {
        Some(call) => {
            let raw = if call.arguments.trim().is_empty() {
                "{}"
            } else {
                call.arguments.as_str()
            };
            let arguments: Value = serde_json::from_str(raw).map_err(|e| {
                AppError::classifier_with(
                    format!("invalid arguments for function {}", call.name),
                    json!({ "function": call.name, "reason": e.to_string() }),
                )
            })?;
            Ok(AnalysisResult::FunctionCall {
                name: call.name,
                arguments,
                preceding_text,
            })
        }
        None => preceding_text
            .map(|content| AnalysisResult::Message { content })
            .ok_or_else(|| AppError::classifier("analyze returned an empty message")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn reply(value: Value) -> AssistantMessage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_plain_reply_is_message() {
        let result = interpret_reply(reply(json!({ "content": "Hello! How can I help?" })));
        assert_eq!(
            result.unwrap(),
            AnalysisResult::Message {
                content: "Hello! How can I help?".to_string()
            }
        );
    }

    #[test]
    fn test_tool_call_is_function_call() {
        let result = interpret_reply(reply(json!({
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {
                    "name": "analyze_business_query",
                    "arguments": "{\"business_name\":\"pizza shop\",\"location\":\"Austin\"}"
                }
            }]
        })))
        .unwrap();

        match result {
            AnalysisResult::FunctionCall {
                name,
                arguments,
                preceding_text,
            } => {
                assert_eq!(name, "analyze_business_query");
                assert_eq!(arguments["location"], "Austin");
                assert_eq!(preceding_text, None);
            }
            other => panic!("expected function call, got {other:?}"),
        }
    }

    #[test]
    fn test_legacy_function_call_with_preceding_text() {
        let result = interpret_reply(reply(json!({
            "content": "Let me look that up.",
            "function_call": { "name": "analyze_business_query", "arguments": "{\"business_name\":\"x\"}" }
        })))
        .unwrap();

        assert!(matches!(
            result,
            AnalysisResult::FunctionCall { preceding_text: Some(ref text), .. } if text == "Let me look that up."
        ));
    }

    #[test]
    fn test_invalid_arguments_are_classifier_error() {
        let err = interpret_reply(reply(json!({
            "tool_calls": [{ "function": { "name": "analyze_business_query", "arguments": "{not json" } }]
        })))
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Classifier);
        assert_eq!(err.details().unwrap()["function"], "analyze_business_query");
    }

    #[test]
    fn test_empty_reply_is_classifier_error() {
        let err = interpret_reply(reply(json!({ "content": "  " }))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Classifier);
    }

    #[test]
    fn test_messages_keep_history_order() {
        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        let messages = build_messages("sys", &history, "find pizza");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "hi");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["content"], "find pizza");
    }
}
