//! Classifier client
//!
//! The language model is used twice per business query: once to decide what the user
//! wants ([`Classifier::analyze`]) and once to turn extracted business data into a
//! campaign report ([`Classifier::summarize`]).

pub mod openai;
pub mod sections;

pub use openai::OpenAiClassifier;
pub use sections::{Sections, split_sections};

use crate::business::ChatMessage;
use crate::error::AppResult;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

/// Function the model calls to look a business up on the web
pub const ANALYZE_BUSINESS_QUERY: &str = "analyze_business_query";
/// Function the model calls when it already holds structured business details
pub const EXTRACT_BUSINESS_INFO: &str = "extract_business_info";

/// What the model decided to do with a user message
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    /// Conversational reply, returned as-is
    Message { content: String },
    /// Structured directive; `arguments` is the raw JSON the model produced
    FunctionCall {
        name: String,
        arguments: Value,
        preceding_text: Option<String>,
    },
}

/// Campaign report and its parsed sections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub content: String,
    pub sections: Sections,
}

impl Summary {
    pub fn from_content(content: impl Into<String>) -> Self {
        let content = content.into();
        let sections = split_sections(&content);
        Self { content, sections }
    }
}

/// Language-model operations used by the pipeline
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify `message` in the context of `history`
    async fn analyze(&self, message: &str, history: &[ChatMessage]) -> AppResult<AnalysisResult>;

    /// Produce a campaign report for `business_data`
    async fn summarize(&self, business_data: &Value, history: &[ChatMessage]) -> AppResult<Summary>;
}

/// Callable function signatures offered to the model on every `analyze` call
pub fn function_signatures() -> Value {
    let strings = json!({ "type": "array", "items": { "type": "string" } });
    json!([
        {
            "name": ANALYZE_BUSINESS_QUERY,
            "description": "Look up a local business on the web to plan a direct mail campaign",
            "parameters": {
                "type": "object",
                "properties": {
                    "business_name": { "type": "string" },
                    "location": { "type": "string" },
                    "ad_type": { "type": "string", "enum": ["valpak", "clipper"] },
                    "specific_requirements": { "type": "string" },
                    "competitor_analysis": { "type": "boolean" },
                    "market_research": { "type": "boolean" }
                },
                "required": ["business_name"]
            }
        },
        {
            "name": EXTRACT_BUSINESS_INFO,
            "description": "Record structured business information, with market analysis when known",
            "parameters": {
                "type": "object",
                "properties": {
                    "url": { "type": "string" },
                    "business_details": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "address": { "type": "string" },
                            "phone": { "type": "string" },
                            "hours": { "type": "string" },
                            "business_type": { "type": "string" },
                            "service_area": strings
                        },
                        "required": ["name", "business_type"]
                    },
                    "branding": {
                        "type": "object",
                        "properties": {
                            "colors": strings,
                            "visual_style": { "type": "string" },
                            "brand_voice": { "type": "string" }
                        }
                    },
                    "target_audience": {
                        "type": "object",
                        "properties": {
                            "demographics": strings,
                            "interests": strings,
                            "income": { "type": "string" },
                            "location": { "type": "string" }
                        }
                    },
                    "market_analysis": {
                        "type": "object",
                        "properties": {
                            "competitors": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "name": { "type": "string" },
                                        "strengths": strings,
                                        "weaknesses": strings
                                    }
                                }
                            },
                            "local_market": {
                                "type": "object",
                                "properties": {
                                    "demographics": { "type": "string" },
                                    "competition_level": { "type": "string" },
                                    "trends": strings
                                }
                            }
                        }
                    },
                    "promotions": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "type": { "type": "string" },
                                "description": { "type": "string" },
                                "value": { "type": "string" },
                                "expiration": { "type": "string" },
                                "conditions": { "type": "string" }
                            },
                            "required": ["type", "description"]
                        }
                    }
                },
                "required": ["business_details", "target_audience"]
            }
        }
    ])
}
