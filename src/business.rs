//! Conversation and business data model
//!
//! All business records serialize with camelCase keys. Every field has a default so a
//! partially populated provider payload still produces the full shape: the required
//! sub-objects (`details`, `branding`, `marketing`) are always present, possibly
//! with empty strings and arrays, never `null`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Speaker of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of conversation history
///
/// History order is significant: it is replayed to the classifier verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One search hit, ordered by provider relevance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Image found on a business page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedImage {
    pub src: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// Normalized business record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusinessInfo {
    pub details: BusinessDetails,
    pub branding: Branding,
    pub marketing: Marketing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_analysis: Option<MarketAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_preferences: Option<AdPreferences>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusinessDetails {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub hours: String,
    pub website: String,
    pub social_media: Vec<String>,
    pub business_type: String,
    pub service_area: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_established: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Branding {
    pub colors: Vec<String>,
    pub logo: String,
    pub images: Vec<String>,
    pub brand_voice: String,
    pub visual_style: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Marketing {
    pub target_audience: TargetAudience,
    pub promotions: Vec<Promotion>,
    pub key_messages: Vec<String>,
    pub unique_selling_points: Vec<String>,
}

/// Who the business sells to
///
/// `summary` holds free-text audience descriptions, as returned by page extraction;
/// the structured fields come from model-extracted data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetAudience {
    pub summary: String,
    pub demographics: Vec<String>,
    pub interests: Vec<String>,
    pub income: String,
    pub location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Promotion {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarketAnalysis {
    pub competitors: Vec<Competitor>,
    pub local_market_data: LocalMarketData,
    pub customer_sentiment: CustomerSentiment,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Competitor {
    pub name: String,
    pub website: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub marketing_tactics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalMarketData {
    pub demographics: String,
    pub household_income: String,
    pub competition_level: String,
    pub market_trends: Vec<String>,
    pub seasonal_factors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomerSentiment {
    pub rating: f64,
    pub review_count: u32,
    pub common_praise: Vec<String>,
    pub common_complaints: Vec<String>,
}

/// Direct-mail product the campaign targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdType {
    #[default]
    Valpak,
    Clipper,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdPreferences {
    #[serde(rename = "type")]
    pub ad_type: AdType,
    pub size: String,
    pub specifications: Map<String, Value>,
    pub recommended_elements: RecommendedElements,
}

impl AdPreferences {
    pub fn for_ad_type(ad_type: AdType) -> Self {
        Self {
            ad_type,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommendedElements {
    pub headlines: Vec<String>,
    pub call_to_action: Vec<String>,
    pub offers: Vec<String>,
    pub visual_elements: Vec<String>,
}

/// Business record merged with the images scraped from the same page
///
/// This is the payload handed to the summarizer.
#[derive(Debug, Serialize)]
pub struct EnrichedBusiness<'a> {
    #[serde(flatten)]
    pub info: &'a BusinessInfo,
    pub images: &'a [ScrapedImage],
}
