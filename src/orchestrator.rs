//! Request orchestration
//!
//! One chat message moves through a fixed sequence of stages:
//!
//! ```text
//! Classifying ─┬─> Direct ───────────────────────────────────┬─> Assembling ─> Done
//!              └─> Dispatching ─> Extracting ─> Summarizing ─┘
//! ```
//!
//! Any stage may fail; the typed error from the failing stage is returned unchanged.
//! Individual upstream calls retry internally, the pipeline itself never re-runs a
//! stage. Only finished envelopes are cached, so a failure leaves no cache entry.

use crate::business::{
    AdPreferences, AdType, Branding, BusinessDetails, BusinessInfo, ChatMessage, Competitor,
    EnrichedBusiness, LocalMarketData, MarketAnalysis, Marketing, Promotion, ScrapedImage,
    SearchResult, TargetAudience,
};
use crate::cache::{ResponseCache, fingerprint};
use crate::classifier::{
    ANALYZE_BUSINESS_QUERY, AnalysisResult, Classifier, EXTRACT_BUSINESS_INFO, Sections,
};
use crate::error::{AppError, AppResult};
use crate::metrics::{Metrics, Outcome};
use crate::scraper::Scraper;
use crate::upstream::strip_nulls;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;

/// Default page number
pub const DEFAULT_PAGE: u32 = 1;
/// Default number of search results per page
pub const DEFAULT_LIMIT: u32 = 5;

/// Pipeline stage, used as the `stage` field in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Classifying,
    Direct,
    Dispatching,
    Extracting,
    Summarizing,
    Assembling,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Classifying => "classifying",
            PipelineStage::Direct => "direct",
            PipelineStage::Dispatching => "dispatching",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Summarizing => "summarizing",
            PipelineStage::Assembling => "assembling",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page selection over an ordered search result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: u32,
    limit: u32,
}

impl Pagination {
    /// # Errors
    /// Returns a validation error if `page` or `limit` is 0.
    pub fn new(page: u32, limit: u32) -> AppResult<Self> {
        if page == 0 {
            return Err(AppError::validation("page must be at least 1"));
        }
        if limit == 0 {
            return Err(AppError::validation("limit must be at least 1"));
        }
        Ok(Self { page, limit })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// `(page - 1) * limit`
    pub fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.limit as usize)
    }

    /// The `[offset, offset + limit)` window of `items`, empty past the end
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = self.offset().min(items.len());
        let end = self.offset().saturating_add(self.limit as usize).min(items.len());
        &items[start..end]
    }

    pub fn info(&self, total: usize) -> PageInfo {
        PageInfo {
            total,
            page: self.page,
            limit: self.limit,
            has_more: self.offset().saturating_add(self.limit as usize) < total,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Pagination metadata returned with search-backed responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

/// Search hit with its content stripped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub url: String,
    pub title: String,
    pub description: String,
}

impl From<&SearchResult> for ResultSummary {
    fn from(result: &SearchResult) -> Self {
        Self {
            url: result.url.clone(),
            title: result.title.clone(),
            description: result.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Message,
    BusinessInfo,
}

/// Response returned to the caller and stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<BusinessInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ScrapedImage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sections: Option<Sections>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PageInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative_results: Option<Vec<ResultSummary>>,
}

impl ResponseEnvelope {
    pub fn message(content: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::Message,
            response: content.into(),
            data: None,
            images: None,
            sections: None,
            pagination: None,
            alternative_results: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BusinessQueryArgs {
    business_name: Option<String>,
    location: Option<String>,
    ad_type: Option<AdType>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtractArgs {
    url: Option<String>,
    business_details: DetailsArgs,
    branding: BrandingArgs,
    target_audience: TargetAudience,
    market_analysis: Option<MarketAnalysisArgs>,
    promotions: Vec<Promotion>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DetailsArgs {
    name: String,
    address: String,
    phone: String,
    hours: String,
    business_type: String,
    service_area: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BrandingArgs {
    colors: Vec<String>,
    visual_style: String,
    brand_voice: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MarketAnalysisArgs {
    competitors: Vec<CompetitorArgs>,
    local_market: LocalMarketArgs,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CompetitorArgs {
    name: String,
    strengths: Vec<String>,
    weaknesses: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LocalMarketArgs {
    demographics: String,
    competition_level: String,
    trends: Vec<String>,
}

impl ExtractArgs {
    fn into_business_info(self) -> BusinessInfo {
        BusinessInfo {
            details: BusinessDetails {
                name: self.business_details.name,
                address: self.business_details.address,
                phone: self.business_details.phone,
                hours: self.business_details.hours,
                business_type: self.business_details.business_type,
                service_area: self.business_details.service_area,
                ..BusinessDetails::default()
            },
            branding: Branding {
                colors: self.branding.colors,
                brand_voice: self.branding.brand_voice,
                visual_style: self.branding.visual_style,
                ..Branding::default()
            },
            marketing: Marketing {
                target_audience: self.target_audience,
                promotions: self.promotions,
                ..Marketing::default()
            },
            market_analysis: self.market_analysis.map(|analysis| MarketAnalysis {
                competitors: analysis
                    .competitors
                    .into_iter()
                    .map(|c| Competitor {
                        name: c.name,
                        strengths: c.strengths,
                        weaknesses: c.weaknesses,
                        ..Competitor::default()
                    })
                    .collect(),
                local_market_data: LocalMarketData {
                    demographics: analysis.local_market.demographics,
                    competition_level: analysis.local_market.competition_level,
                    market_trends: analysis.local_market.trends,
                    ..LocalMarketData::default()
                },
                ..MarketAnalysis::default()
            }),
            ad_preferences: None,
        }
    }
}

/// What an `extract_business_info` call points at
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractTarget {
    /// Page to extract from
    Url(String),
    /// The model already supplied the details
    Provided(Box<BusinessInfo>),
}

/// Schema-checked function call
#[derive(Debug, Clone, PartialEq)]
pub enum BusinessFunction {
    Search {
        query: String,
        ad_type: Option<AdType>,
    },
    Extract(ExtractTarget),
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn invalid_arguments(function: &str, e: serde_json::Error) -> AppError {
    AppError::validation_with(
        format!("Invalid arguments for {function}"),
        json!({ "function": function, "reason": e.to_string() }),
    )
}

impl BusinessFunction {
    /// Validate the raw arguments the model produced for `name`
    ///
    /// # Errors
    /// Returns a validation error for unknown functions, arguments of the wrong
    /// shape, or a missing target (`business_name`; `url` or `business_details.name`).
    pub fn parse(name: &str, arguments: Value) -> AppResult<Self> {
        let arguments = strip_nulls(arguments);
        match name {
            ANALYZE_BUSINESS_QUERY => {
                let args: BusinessQueryArgs = serde_json::from_value(arguments)
                    .map_err(|e| invalid_arguments(name, e))?;
                let business_name = non_blank(args.business_name).ok_or_else(|| {
                    AppError::validation_with(
                        "Business name is required for a business search",
                        json!({ "function": name, "field": "business_name" }),
                    )
                })?;
                let query = match non_blank(args.location) {
                    Some(location) => format!("{business_name} {location}"),
                    None => business_name,
                };
                Ok(Self::Search {
                    query,
                    ad_type: args.ad_type,
                })
            }
            EXTRACT_BUSINESS_INFO => {
                let mut args: ExtractArgs = serde_json::from_value(arguments)
                    .map_err(|e| invalid_arguments(name, e))?;
                if let Some(url) = non_blank(args.url.take()) {
                    return Ok(Self::Extract(ExtractTarget::Url(url)));
                }
                if args.business_details.name.trim().is_empty() {
                    return Err(AppError::validation_with(
                        "URL or business name is required for business info extraction",
                        json!({ "function": name, "field": "url" }),
                    ));
                }
                Ok(Self::Extract(ExtractTarget::Provided(Box::new(
                    args.into_business_info(),
                ))))
            }
            other => Err(AppError::validation(format!("Unsupported function: {other}"))),
        }
    }
}

/// One validated chat request
#[derive(Debug, Clone)]
pub struct ChatQuery {
    pub message: String,
    pub history: Vec<ChatMessage>,
    pub pagination: Pagination,
}

impl ChatQuery {
    pub fn fingerprint(&self) -> String {
        fingerprint(
            &self.message,
            &self.history,
            self.pagination.page(),
            self.pagination.limit(),
        )
    }
}

/// Serialized envelope ready to send
#[derive(Debug, Clone)]
pub struct Reply {
    pub body: String,
    pub cached: bool,
}

/// Sequences classifier and scraper calls for one chat request
#[derive(Clone)]
pub struct Orchestrator {
    classifier: Arc<dyn Classifier>,
    scraper: Arc<dyn Scraper>,
    cache: ResponseCache,
    metrics: Arc<Metrics>,
}

impl Orchestrator {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        scraper: Arc<dyn Scraper>,
        cache: ResponseCache,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            classifier,
            scraper,
            cache,
            metrics,
        }
    }

    /// Answer a chat request, consulting the cache first
    ///
    /// Records the request outcome and pipeline latency.
    pub async fn handle(&self, query: &ChatQuery) -> AppResult<Reply> {
        let start = Instant::now();
        let key = query.fingerprint();

        if let Some(body) = self.cache.lookup(&key).await {
            tracing::debug!("Serving chat response from cache");
            self.record(Outcome::Cached, start);
            return Ok(Reply { body, cached: true });
        }

        let result = self.run(query).await.and_then(|envelope| {
            serde_json::to_string(&envelope)
                .map_err(|e| AppError::Internal(format!("failed to encode response: {e}")))
        });

        match result {
            Ok(body) => {
                self.cache.insert(&key, body.clone()).await;
                self.record(Outcome::Success, start);
                Ok(Reply {
                    body,
                    cached: false,
                })
            }
            Err(error) => {
                tracing::warn!(
                    stage = %PipelineStage::Failed,
                    error_kind = %error.kind(),
                    error = %error,
                    "Chat pipeline failed"
                );
                self.record(Outcome::Failed(error.kind()), start);
                Err(error)
            }
        }
    }

    /// Run the pipeline without touching the cache
    pub async fn run(&self, query: &ChatQuery) -> AppResult<ResponseEnvelope> {
        enter(PipelineStage::Classifying);
        let analysis = self
            .classifier
            .analyze(&query.message, &query.history)
            .await?;

        let (name, arguments, preceding_text) = match analysis {
            AnalysisResult::Message { content } => {
                enter(PipelineStage::Direct);
                enter(PipelineStage::Assembling);
                return Ok(ResponseEnvelope::message(content));
            }
            AnalysisResult::FunctionCall {
                name,
                arguments,
                preceding_text,
            } => (name, arguments, preceding_text),
        };

        enter(PipelineStage::Dispatching);
        tracing::debug!(function = %name, "Dispatching classifier function call");
        let function = BusinessFunction::parse(&name, arguments)?;

        let summary_history = summary_history(query, preceding_text.as_deref());

        let envelope = match function {
            BusinessFunction::Search { query: search, ad_type } => {
                self.search_and_extract(&search, ad_type, query.pagination, &summary_history)
                    .await?
            }
            BusinessFunction::Extract(ExtractTarget::Url(url)) => {
                let (info, images) = self.extract(&url).await?;
                self.summarize(info, images, &summary_history).await?
            }
            BusinessFunction::Extract(ExtractTarget::Provided(info)) => {
                self.summarize(*info, Vec::new(), &summary_history).await?
            }
        };

        enter(PipelineStage::Done);
        Ok(envelope)
    }

    async fn search_and_extract(
        &self,
        search: &str,
        ad_type: Option<AdType>,
        pagination: Pagination,
        history: &[ChatMessage],
    ) -> AppResult<ResponseEnvelope> {
        let results = self.scraper.search(search).await?;
        if results.is_empty() {
            return Err(AppError::not_found("No business information found"));
        }

        let page = pagination.slice(&results);
        let Some(selected) = page.first() else {
            return Err(AppError::not_found(format!(
                "No business information found on page {}",
                pagination.page()
            )));
        };
        tracing::debug!(
            total = results.len(),
            page = pagination.page(),
            url = %selected.url,
            "Selected search result"
        );

        let (mut info, images) = self.extract(&selected.url).await?;
        if let Some(ad_type) = ad_type {
            match info.ad_preferences.as_mut() {
                Some(preferences) => preferences.ad_type = ad_type,
                None => info.ad_preferences = Some(AdPreferences::for_ad_type(ad_type)),
            }
        }

        let mut envelope = self.summarize(info, images, history).await?;
        envelope.pagination = Some(pagination.info(results.len()));
        envelope.alternative_results = Some(page[1..].iter().map(ResultSummary::from).collect());
        Ok(envelope)
    }

    /// Extraction and image scraping of one page, concurrently; first failure wins
    async fn extract(&self, url: &str) -> AppResult<(BusinessInfo, Vec<ScrapedImage>)> {
        enter(PipelineStage::Extracting);
        futures::future::try_join(self.scraper.extract(url), self.scraper.scrape_images(url)).await
    }

    async fn summarize(
        &self,
        info: BusinessInfo,
        images: Vec<ScrapedImage>,
        history: &[ChatMessage],
    ) -> AppResult<ResponseEnvelope> {
        enter(PipelineStage::Summarizing);
        let merged = serde_json::to_value(EnrichedBusiness {
            info: &info,
            images: &images,
        })
        .map_err(|e| AppError::Internal(format!("failed to encode business data: {e}")))?;
        let summary = self.classifier.summarize(&merged, history).await?;

        enter(PipelineStage::Assembling);
        Ok(ResponseEnvelope {
            kind: EnvelopeKind::BusinessInfo,
            response: summary.content,
            data: Some(info),
            images: Some(images),
            sections: Some(summary.sections),
            pagination: None,
            alternative_results: None,
        })
    }

    fn record(&self, outcome: Outcome, start: Instant) {
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        if let Err(e) = self.metrics.record_request(outcome) {
            tracing::error!(error = %e, outcome = outcome.as_str(), "Metrics recording failed (non-fatal)");
        }
        if let Err(e) = self.metrics.record_pipeline_duration(outcome, duration_ms) {
            tracing::error!(error = %e, outcome = outcome.as_str(), "Metrics recording failed (non-fatal)");
        }
    }
}

fn enter(stage: PipelineStage) {
    tracing::debug!(stage = %stage, "Entering pipeline stage");
}

/// Request history, the new user turn, then the classifier's preceding text if any
fn summary_history(query: &ChatQuery, preceding_text: Option<&str>) -> Vec<ChatMessage> {
    let mut history = query.history.clone();
    history.push(ChatMessage::user(query.message.clone()));
    if let Some(text) = preceding_text.filter(|t| !t.trim().is_empty()) {
        history.push(ChatMessage::assistant(text));
    }
    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::classifier::Summary;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FakeClassifier {
        analysis: AnalysisResult,
        analyze_calls: AtomicU32,
        summarize_calls: AtomicU32,
        summarize_history: Mutex<Vec<ChatMessage>>,
    }

    impl FakeClassifier {
        fn new(analysis: AnalysisResult) -> Self {
            Self {
                analysis,
                analyze_calls: AtomicU32::new(0),
                summarize_calls: AtomicU32::new(0),
                summarize_history: Mutex::new(Vec::new()),
            }
        }

        fn calling(name: &str, arguments: Value) -> Self {
            Self::new(AnalysisResult::FunctionCall {
                name: name.to_string(),
                arguments,
                preceding_text: Some("Let me look that up.".to_string()),
            })
        }
    }

    #[async_trait]
    impl Classifier for FakeClassifier {
        async fn analyze(&self, _message: &str, _history: &[ChatMessage]) -> AppResult<AnalysisResult> {
            self.analyze_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.analysis.clone())
        }

        async fn summarize(&self, _data: &Value, history: &[ChatMessage]) -> AppResult<Summary> {
            self.summarize_calls.fetch_add(1, Ordering::SeqCst);
            *self.summarize_history.lock().unwrap() = history.to_vec();
            Ok(Summary::from_content(
                "Target Audience: Families.\nOffer Development: Free garlic knots.",
            ))
        }
    }

    #[derive(Default)]
    struct FakeScraper {
        results: Vec<SearchResult>,
        fail_extract: bool,
        fail_images: bool,
        search_queries: Mutex<Vec<String>>,
        extracted: Mutex<Vec<String>>,
    }

    impl FakeScraper {
        fn with_results(count: usize) -> Self {
            Self {
                results: (1..=count)
                    .map(|i| SearchResult {
                        url: format!("https://example.com/{i}"),
                        title: format!("Pizza {i}"),
                        description: format!("Result {i}"),
                        content: Some("# page".to_string()),
                    })
                    .collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Scraper for FakeScraper {
        async fn search(&self, query: &str) -> AppResult<Vec<SearchResult>> {
            self.search_queries.lock().unwrap().push(query.to_string());
            Ok(self.results.clone())
        }

        async fn extract(&self, url: &str) -> AppResult<BusinessInfo> {
            self.extracted.lock().unwrap().push(url.to_string());
            if self.fail_extract {
                return Err(AppError::external_api("extract request failed: ETIMEDOUT"));
            }
            let mut info = BusinessInfo::default();
            info.details.name = "Tony's".to_string();
            info.details.website = url.to_string();
            Ok(info)
        }

        async fn scrape_images(&self, url: &str) -> AppResult<Vec<ScrapedImage>> {
            if self.fail_images {
                return Err(AppError::external_api(
                    "scrape_images request failed: HTTP 502",
                ));
            }
            Ok(vec![ScrapedImage {
                src: format!("{url}/logo.png"),
                alt: "logo".to_string(),
                width: 300,
                height: 200,
            }])
        }
    }

    fn orchestrator(classifier: Arc<FakeClassifier>, scraper: Arc<FakeScraper>) -> Orchestrator {
        let metrics = Arc::new(Metrics::new().unwrap());
        let cache = ResponseCache::new(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(60),
            metrics.clone(),
        );
        Orchestrator::new(classifier, scraper, cache, metrics)
    }

    fn query(message: &str, page: u32, limit: u32) -> ChatQuery {
        ChatQuery {
            message: message.to_string(),
            history: vec![],
            pagination: Pagination::new(page, limit).unwrap(),
        }
    }

    #[test]
    fn test_pagination_slices_and_reports_has_more() {
        let items: Vec<u32> = (0..7).collect();
        let first = Pagination::new(1, 5).unwrap();
        assert_eq!(first.slice(&items), &[0, 1, 2, 3, 4]);
        assert!(first.info(7).has_more);

        let second = Pagination::new(2, 5).unwrap();
        assert_eq!(second.slice(&items), &[5, 6]);
        assert!(!second.info(7).has_more);

        let beyond = Pagination::new(3, 5).unwrap();
        assert!(beyond.slice(&items).is_empty());
    }

    #[test]
    fn test_pagination_rejects_zero() {
        assert!(Pagination::new(0, 5).is_err());
        assert!(Pagination::new(1, 0).is_err());
    }

    #[test]
    fn test_parse_search_appends_location() {
        let function = BusinessFunction::parse(
            ANALYZE_BUSINESS_QUERY,
            json!({ "business_name": "pizza shop", "location": "Austin", "ad_type": "clipper" }),
        )
        .unwrap();
        assert_eq!(
            function,
            BusinessFunction::Search {
                query: "pizza shop Austin".to_string(),
                ad_type: Some(AdType::Clipper)
            }
        );
    }

    #[test]
    fn test_parse_search_requires_business_name() {
        for args in [json!({ "location": "Austin" }), json!({ "business_name": "  " })] {
            let err = BusinessFunction::parse(ANALYZE_BUSINESS_QUERY, args).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn test_parse_rejects_wrongly_typed_arguments() {
        let err = BusinessFunction::parse(ANALYZE_BUSINESS_QUERY, json!({ "business_name": 42 }))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.message(), "Invalid arguments for analyze_business_query");
    }

    #[test]
    fn test_parse_extract_requires_target() {
        let err = BusinessFunction::parse(EXTRACT_BUSINESS_INFO, json!({ "target_audience": {} }))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_parse_extract_without_url_normalizes_arguments() {
        let function = BusinessFunction::parse(
            EXTRACT_BUSINESS_INFO,
            json!({
                "business_details": { "name": "Tony's", "business_type": "restaurant" },
                "target_audience": { "demographics": ["families"], "income": null },
                "market_analysis": { "local_market": { "trends": ["delivery"] } }
            }),
        )
        .unwrap();

        let BusinessFunction::Extract(ExtractTarget::Provided(info)) = function else {
            panic!("expected provided business info");
        };
        assert_eq!(info.details.name, "Tony's");
        assert_eq!(info.marketing.target_audience.demographics, vec!["families"]);
        assert_eq!(
            info.market_analysis.unwrap().local_market_data.market_trends,
            vec!["delivery"]
        );
    }

    #[test]
    fn test_parse_unsupported_function() {
        let err = BusinessFunction::parse("order_pizza", json!({})).unwrap_err();
        assert_eq!(err.message(), "Unsupported function: order_pizza");
    }

    #[tokio::test]
    async fn test_message_reply_skips_scraper() {
        let classifier = Arc::new(FakeClassifier::new(AnalysisResult::Message {
            content: "Hi there!".to_string(),
        }));
        let scraper = Arc::new(FakeScraper::default());
        let envelope = orchestrator(classifier, scraper.clone())
            .run(&query("hello", 1, 5))
            .await
            .unwrap();

        assert_eq!(envelope, ResponseEnvelope::message("Hi there!"));
        assert!(scraper.search_queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_scenario_paginates_results() {
        let classifier = Arc::new(FakeClassifier::calling(
            ANALYZE_BUSINESS_QUERY,
            json!({ "business_name": "pizza shop", "location": "Austin" }),
        ));
        let scraper = Arc::new(FakeScraper::with_results(7));
        let envelope = orchestrator(classifier.clone(), scraper.clone())
            .run(&query("find me a pizza shop in Austin", 1, 5))
            .await
            .unwrap();

        assert_eq!(
            *scraper.search_queries.lock().unwrap(),
            vec!["pizza shop Austin".to_string()]
        );
        assert_eq!(
            envelope.pagination,
            Some(PageInfo {
                total: 7,
                page: 1,
                limit: 5,
                has_more: true
            })
        );
        let alternatives = envelope.alternative_results.unwrap();
        assert_eq!(alternatives.len(), 4);
        assert_eq!(alternatives[0].url, "https://example.com/2");
        assert_eq!(envelope.kind, EnvelopeKind::BusinessInfo);
        assert_eq!(envelope.images.unwrap().len(), 1);
        assert_eq!(envelope.sections.unwrap().offers, "Free garlic knots.");
        assert_eq!(classifier.summarize_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_page_extracts_first_entry_of_that_page() {
        let classifier = Arc::new(FakeClassifier::calling(
            ANALYZE_BUSINESS_QUERY,
            json!({ "business_name": "pizza" }),
        ));
        let scraper = Arc::new(FakeScraper::with_results(7));
        let envelope = orchestrator(classifier, scraper.clone())
            .run(&query("pizza", 2, 5))
            .await
            .unwrap();

        assert_eq!(
            *scraper.extracted.lock().unwrap(),
            vec!["https://example.com/6".to_string()]
        );
        assert!(!envelope.pagination.unwrap().has_more);
        assert_eq!(envelope.alternative_results.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_search_is_not_found_without_summarize() {
        let classifier = Arc::new(FakeClassifier::calling(
            ANALYZE_BUSINESS_QUERY,
            json!({ "business_name": "nowhere" }),
        ));
        let scraper = Arc::new(FakeScraper::default());
        let err = orchestrator(classifier.clone(), scraper)
            .run(&query("nowhere", 1, 5))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.status().as_u16(), 404);
        assert_eq!(classifier.summarize_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_page_beyond_range_is_not_found() {
        let classifier = Arc::new(FakeClassifier::calling(
            ANALYZE_BUSINESS_QUERY,
            json!({ "business_name": "pizza" }),
        ));
        let scraper = Arc::new(FakeScraper::with_results(3));
        let err = orchestrator(classifier, scraper)
            .run(&query("pizza", 2, 5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_ad_type_flows_into_ad_preferences() {
        let classifier = Arc::new(FakeClassifier::calling(
            ANALYZE_BUSINESS_QUERY,
            json!({ "business_name": "pizza", "ad_type": "valpak" }),
        ));
        let scraper = Arc::new(FakeScraper::with_results(1));
        let envelope = orchestrator(classifier, scraper)
            .run(&query("pizza", 1, 5))
            .await
            .unwrap();

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["data"]["adPreferences"]["type"], "valpak");
    }

    #[tokio::test]
    async fn test_summarize_history_includes_user_turn_and_preceding_text() {
        let classifier = Arc::new(FakeClassifier::calling(
            EXTRACT_BUSINESS_INFO,
            json!({ "url": "https://tonys.example" }),
        ));
        let scraper = Arc::new(FakeScraper::default());
        let mut request = query("tell me about tonys.example", 1, 5);
        request.history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];

        let envelope = orchestrator(classifier.clone(), scraper.clone())
            .run(&request)
            .await
            .unwrap();

        let history = classifier.summarize_history.lock().unwrap().clone();
        assert_eq!(history.len(), 4);
        assert_eq!(history[2], ChatMessage::user("tell me about tonys.example"));
        assert_eq!(history[3], ChatMessage::assistant("Let me look that up."));
        assert!(envelope.pagination.is_none());
        assert!(scraper.search_queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extract_from_arguments_makes_no_scraper_call() {
        let classifier = Arc::new(FakeClassifier::calling(
            EXTRACT_BUSINESS_INFO,
            json!({
                "business_details": { "name": "Tony's", "business_type": "pizza" },
                "target_audience": { "demographics": ["students"] }
            }),
        ));
        let scraper = Arc::new(FakeScraper::default());
        let envelope = orchestrator(classifier, scraper.clone())
            .run(&query("Tony's is a pizza place for students", 1, 5))
            .await
            .unwrap();

        assert!(scraper.extracted.lock().unwrap().is_empty());
        assert_eq!(envelope.images, Some(vec![]));
        assert_eq!(envelope.data.unwrap().details.name, "Tony's");
    }

    #[tokio::test]
    async fn test_handle_caches_and_replays_identical_body() {
        let classifier = Arc::new(FakeClassifier::calling(
            ANALYZE_BUSINESS_QUERY,
            json!({ "business_name": "pizza" }),
        ));
        let scraper = Arc::new(FakeScraper::with_results(2));
        let orchestrator = orchestrator(classifier.clone(), scraper);
        let request = query("pizza", 1, 5);

        let first = orchestrator.handle(&request).await.unwrap();
        let second = orchestrator.handle(&request).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.body, second.body);
        assert_eq!(classifier.analyze_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_pipeline_is_not_cached() {
        let classifier = Arc::new(FakeClassifier::calling(
            ANALYZE_BUSINESS_QUERY,
            json!({ "business_name": "pizza" }),
        ));
        let scraper = Arc::new(FakeScraper {
            fail_extract: true,
            ..FakeScraper::with_results(2)
        });
        let orchestrator = orchestrator(classifier.clone(), scraper);
        let request = query("pizza", 1, 5);

        let err = orchestrator.handle(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalApi);

        let _ = orchestrator.handle(&request).await;
        assert_eq!(classifier.analyze_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_image_scrape_failure_aborts_before_summary() {
        let classifier = Arc::new(FakeClassifier::calling(
            ANALYZE_BUSINESS_QUERY,
            json!({ "business_name": "pizza" }),
        ));
        let scraper = Arc::new(FakeScraper {
            fail_images: true,
            ..FakeScraper::with_results(2)
        });
        let orchestrator = orchestrator(classifier.clone(), scraper.clone());
        let request = query("pizza", 1, 5);

        let err = orchestrator.handle(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalApi);
        assert!(err.to_string().contains("scrape_images"), "{err}");
        assert_eq!(classifier.summarize_calls.load(Ordering::SeqCst), 0);

        // Nothing was cached, so the retry runs the pipeline again
        let _ = orchestrator.handle(&request).await;
        assert_eq!(classifier.analyze_calls.load(Ordering::SeqCst), 2);
        assert_eq!(scraper.search_queries.lock().unwrap().len(), 2);
    }
}
