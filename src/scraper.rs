//! Scraper client
//!
//! [`Scraper`] is the seam the orchestrator talks to; [`FirecrawlClient`] is the
//! production implementation over the Firecrawl HTTP API. Every call runs under the
//! client's [`Retrier`], so transient transport failures are retried with backoff and
//! everything else surfaces as a typed error on the first attempt.

use crate::business::{
    BusinessDetails, BusinessInfo, Branding, Marketing, Promotion, ScrapedImage, SearchResult,
    TargetAudience,
};
use crate::error::{AppError, AppResult};
use crate::metrics::Operation;
use crate::retry::Retrier;
use crate::upstream::{self, Upstream, strip_nulls};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

const EXTRACT_SYSTEM_PROMPT: &str = "You are a business information extractor. Extract key business \
details, branding elements, and promotional content.";

const EXTRACT_PROMPT: &str = "Extract all available business information, focusing on contact \
details, branding, and current promotions or deals.";

/// Runs in the page; keeps images larger than 100x100
const IMAGE_SCRIPT: &str = r#"
const images = Array.from(document.images)
  .map(img => ({ src: img.src, alt: img.alt, width: img.width, height: img.height }))
  .filter(img => img.width > 100 && img.height > 100);
return images;
"#;

/// Web scraping operations used by the pipeline
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Search the web, results ordered by provider relevance
    async fn search(&self, query: &str) -> AppResult<Vec<SearchResult>>;

    /// Extract a normalized business record from a page
    ///
    /// Fails with a validation error if the provider returns no data.
    async fn extract(&self, url: &str) -> AppResult<BusinessInfo>;

    /// List the images on a page
    async fn scrape_images(&self, url: &str) -> AppResult<Vec<ScrapedImage>>;
}

/// Firecrawl API client
#[derive(Clone)]
pub struct FirecrawlClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    search_limit: u32,
    retrier: Retrier,
}

impl std::fmt::Debug for FirecrawlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirecrawlClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("search_limit", &self.search_limit)
            .finish()
    }
}

impl FirecrawlClient {
    /// Create a client
    ///
    /// `timeout` bounds each individual HTTP call, not the whole retry sequence.
    ///
    /// # Errors
    /// Returns an internal error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        search_limit: u32,
        retrier: Retrier,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build scraper HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            search_limit,
            retrier,
        })
    }

    /// POST a JSON body and return the provider's success envelope
    async fn post(&self, operation: Operation, path: &str, body: &Value) -> AppResult<Value> {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| upstream::send_error(Upstream::Scraper, operation, &e))?;

        if !response.status().is_success() {
            return Err(upstream::status_error(Upstream::Scraper, operation, response).await);
        }

        let payload: Value = response.json().await.map_err(|e| {
            if e.is_decode() {
                AppError::external_api(format!("{operation} returned a malformed response"))
            } else {
                upstream::send_error(Upstream::Scraper, operation, &e)
            }
        })?;

        if payload.get("success").and_then(Value::as_bool) == Some(false) {
            let reason = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("provider reported failure");
            return Err(AppError::external_api_with(
                format!("{operation} failed: {reason}"),
                payload,
            ));
        }

        Ok(payload)
    }

    async fn search_once(&self, query: &str) -> AppResult<Vec<SearchResult>> {
        let body = json!({
            "query": query,
            "limit": self.search_limit,
            "scrapeOptions": {
                "formats": ["markdown"],
                "onlyMainContent": true,
            },
        });
        let payload = self.post(Operation::Search, "search", &body).await?;
        parse_search_results(payload)
    }

    async fn extract_once(&self, url: &str) -> AppResult<BusinessInfo> {
        let body = json!({
            "urls": [url],
            "schema": extraction_schema(),
            "systemPrompt": EXTRACT_SYSTEM_PROMPT,
            "prompt": EXTRACT_PROMPT,
        });
        let payload = self.post(Operation::Extract, "extract", &body).await?;
        parse_extraction(payload)
    }

    async fn scrape_images_once(&self, url: &str) -> AppResult<Vec<ScrapedImage>> {
        let body = json!({
            "url": url,
            "formats": ["html"],
            "onlyMainContent": true,
            "includeTags": ["img"],
            "actions": [{ "type": "executeJavascript", "script": IMAGE_SCRIPT }],
        });
        let payload = self.post(Operation::ScrapeImages, "scrape", &body).await?;
        Ok(parse_images(&payload))
    }
}

#[async_trait]
impl Scraper for FirecrawlClient {
    async fn search(&self, query: &str) -> AppResult<Vec<SearchResult>> {
        tracing::debug!(query = %query, "Searching for business");
        self.retrier
            .run(Operation::Search, move || self.search_once(query))
            .await
    }

    async fn extract(&self, url: &str) -> AppResult<BusinessInfo> {
        tracing::debug!(url = %url, "Extracting business information");
        self.retrier
            .run(Operation::Extract, move || self.extract_once(url))
            .await
    }

    async fn scrape_images(&self, url: &str) -> AppResult<Vec<ScrapedImage>> {
        tracing::debug!(url = %url, "Scraping images");
        self.retrier
            .run(Operation::ScrapeImages, move || self.scrape_images_once(url))
            .await
    }
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    markdown: Option<String>,
    content: Option<String>,
}

/// Parse a search envelope `{success, data: [...]}` preserving provider order
///
/// Hits without a URL cannot be extracted later and are dropped.
fn parse_search_results(payload: Value) -> AppResult<Vec<SearchResult>> {
    let data = match strip_nulls(payload).get_mut("data").map(Value::take) {
        Some(data) => data,
        None => return Ok(Vec::new()),
    };

    let hits: Vec<SearchHit> = serde_json::from_value(data)
        .map_err(|e| AppError::external_api(format!("search returned malformed results: {e}")))?;

    Ok(hits
        .into_iter()
        .filter(|hit| !hit.url.is_empty())
        .map(|hit| SearchResult {
            url: hit.url,
            title: hit.title,
            description: hit.description,
            content: hit.markdown.or(hit.content),
        })
        .collect())
}

/// Provider extraction payload, snake_case as requested in [`extraction_schema`]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtractedBusiness {
    business_info: ExtractedDetails,
    branding: ExtractedBranding,
    marketing: ExtractedMarketing,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtractedDetails {
    name: String,
    address: String,
    phone: String,
    hours: String,
    website: String,
    social_media: Vec<String>,
    business_type: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtractedBranding {
    colors: Vec<String>,
    logo_url: String,
    images: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtractedMarketing {
    target_audience: String,
    promotions: Vec<Promotion>,
    key_messages: Vec<String>,
}

impl From<ExtractedBusiness> for BusinessInfo {
    fn from(raw: ExtractedBusiness) -> Self {
        BusinessInfo {
            details: BusinessDetails {
                name: raw.business_info.name,
                address: raw.business_info.address,
                phone: raw.business_info.phone,
                hours: raw.business_info.hours,
                website: raw.business_info.website,
                social_media: raw.business_info.social_media,
                business_type: raw.business_info.business_type,
                ..BusinessDetails::default()
            },
            branding: Branding {
                colors: raw.branding.colors,
                logo: raw.branding.logo_url,
                images: raw.branding.images,
                ..Branding::default()
            },
            marketing: Marketing {
                target_audience: TargetAudience {
                    summary: raw.marketing.target_audience,
                    ..TargetAudience::default()
                },
                promotions: raw.marketing.promotions,
                key_messages: raw.marketing.key_messages,
                ..Marketing::default()
            },
            market_analysis: None,
            ad_preferences: None,
        }
    }
}

fn is_empty_data(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Normalize an extraction envelope into a [`BusinessInfo`]
///
/// `data` may be an object or an array of per-URL objects (the first one wins).
fn parse_extraction(payload: Value) -> AppResult<BusinessInfo> {
    let mut payload = strip_nulls(payload);
    let mut data = payload
        .get_mut("data")
        .map(Value::take)
        .unwrap_or(Value::Null);

    if let Value::Array(items) = &mut data {
        data = if items.is_empty() {
            Value::Null
        } else {
            items.swap_remove(0)
        };
    }

    if is_empty_data(&data) {
        return Err(AppError::validation("No data returned from extraction"));
    }

    let raw: ExtractedBusiness = serde_json::from_value(data).map_err(|e| {
        AppError::external_api(format!("extract returned malformed business data: {e}"))
    })?;

    Ok(raw.into())
}

/// Collect images from the page script's return values, or `data.images`
///
/// Entries that are plain strings are treated as bare URLs; malformed entries are
/// skipped rather than failing the whole scrape.
fn parse_images(payload: &Value) -> Vec<ScrapedImage> {
    let data = payload.get("data");

    let script_returns = data
        .and_then(|d| d.pointer("/actions/javascriptReturns"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|ret| ret.get("value").and_then(Value::as_array))
        .flatten();

    let mut images: Vec<ScrapedImage> = script_returns.filter_map(to_image).collect();

    if images.is_empty() {
        images = data
            .and_then(|d| d.get("images"))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(to_image)
            .collect();
    }

    images
}

fn to_image(value: &Value) -> Option<ScrapedImage> {
    match value {
        Value::String(src) if !src.is_empty() => Some(ScrapedImage {
            src: src.clone(),
            alt: String::new(),
            width: 0,
            height: 0,
        }),
        Value::Object(_) => serde_json::from_value::<ScrapedImage>(strip_nulls(value.clone()))
            .ok()
            .filter(|image| !image.src.is_empty()),
        _ => None,
    }
}

/// JSON schema sent with every extraction request
fn extraction_schema() -> Value {
    let strings = json!({ "type": "array", "items": { "type": "string" } });
    json!({
        "type": "object",
        "properties": {
            "business_info": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "address": { "type": "string" },
                    "phone": { "type": "string" },
                    "hours": { "type": "string" },
                    "website": { "type": "string" },
                    "social_media": strings,
                    "business_type": { "type": "string" }
                }
            },
            "branding": {
                "type": "object",
                "properties": {
                    "colors": strings,
                    "logo_url": { "type": "string" },
                    "images": strings
                }
            },
            "marketing": {
                "type": "object",
                "properties": {
                    "target_audience": { "type": "string" },
                    "promotions": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "type": { "type": "string" },
                                "description": { "type": "string" },
                                "value": { "type": "string" },
                                "expiration": { "type": "string" }
                            }
                        }
                    },
                    "key_messages": strings
                }
            }
        }
    })
}
