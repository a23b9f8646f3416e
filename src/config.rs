//! Configuration management for adscout
//!
//! Settings come from a TOML file; API credentials come from the environment and are
//! never read from or written to the file. Every section is optional and falls back
//! to production defaults, so an empty file is a valid configuration.

use crate::error::{AppError, AppResult};
use crate::retry::{RetryPattern, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable holding the classifier API key
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable holding the scraper API key
pub const FIRECRAWL_API_KEY_ENV: &str = "FIRECRAWL_API_KEY";
/// Environment variable overriding `cache.redis_url`
pub const REDIS_URL_ENV: &str = "REDIS_URL";

/// Longest upstream call timeout accepted
const MAX_TIMEOUT_SECONDS: u64 = 300;
/// Highest retry attempt count accepted
const MAX_RETRY_ATTEMPTS: u32 = 10;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

/// Language model settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_summary_temperature")]
    pub summary_temperature: f32,
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,
    #[serde(default = "RetryConfig::classifier_default")]
    pub retry: RetryConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: default_classifier_url(),
            model: default_model(),
            timeout_seconds: default_timeout(),
            summary_temperature: default_summary_temperature(),
            summary_max_tokens: default_summary_max_tokens(),
            retry: RetryConfig::classifier_default(),
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_classifier_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4-turbo-preview".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_summary_temperature() -> f32 {
    0.7
}

fn default_summary_max_tokens() -> u32 {
    2000
}

/// Scraping provider settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_scraper_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,
    #[serde(default = "RetryConfig::scraper_default")]
    pub retry: RetryConfig,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_scraper_url(),
            timeout_seconds: default_timeout(),
            search_limit: default_search_limit(),
            retry: RetryConfig::scraper_default(),
        }
    }
}

impl ScraperConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_scraper_url() -> String {
    "https://api.firecrawl.dev/v1".to_string()
}

fn default_search_limit() -> u32 {
    50
}

/// One retryable pattern: `{ substring = "..." }` or `{ regex = "..." }`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternConfig {
    Substring(String),
    Regex(String),
}

impl PatternConfig {
    fn compile(&self) -> Result<RetryPattern, regex::Error> {
        match self {
            PatternConfig::Substring(text) => Ok(RetryPattern::substring(text.clone())),
            PatternConfig::Regex(pattern) => RetryPattern::regex(pattern),
        }
    }
}

/// Retry settings for one upstream client
///
/// Fields are private; [`RetryConfig::policy`] is the only way to use them and it
/// re-checks every bound.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    max_delay_ms: u64,
    #[serde(default = "default_patterns")]
    retryable_patterns: Vec<PatternConfig>,
}

impl RetryConfig {
    /// Classifier defaults: 3 attempts, 1s initial, 5s cap
    pub fn classifier_default() -> Self {
        Self {
            max_delay_ms: 5_000,
            ..Self::scraper_default()
        }
    }

    /// Scraper defaults: 3 attempts, 1s initial, 10s cap
    pub fn scraper_default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            retryable_patterns: default_patterns(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay_ms(&self) -> u64 {
        self.initial_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    pub fn retryable_patterns(&self) -> &[PatternConfig] {
        &self.retryable_patterns
    }

    /// Build the runtime policy, compiling regex patterns
    ///
    /// # Errors
    /// Returns a configuration error naming the offending key.
    pub fn policy(&self, section: &str) -> AppResult<RetryPolicy> {
        if self.max_attempts == 0 || self.max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(AppError::Config(format!(
                "{section}.retry.max_attempts must be between 1 and {MAX_RETRY_ATTEMPTS}, got {}",
                self.max_attempts
            )));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(AppError::Config(format!(
                "{section}.retry.max_delay_ms ({}) must not be smaller than initial_delay_ms ({})",
                self.max_delay_ms, self.initial_delay_ms
            )));
        }

        let patterns = self
            .retryable_patterns
            .iter()
            .map(|pattern| {
                pattern.compile().map_err(|e| {
                    AppError::Config(format!(
                        "{section}.retry.retryable_patterns contains an invalid regex: {e}"
                    ))
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            patterns,
        )
    }
}

fn default_max_attempts() -> u32 {
    crate::retry::DEFAULT_MAX_ATTEMPTS
}

fn default_initial_delay_ms() -> u64 {
    crate::retry::DEFAULT_INITIAL_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    crate::retry::DEFAULT_MAX_DELAY_MS
}

fn default_patterns() -> Vec<PatternConfig> {
    vec![
        PatternConfig::Substring("ECONNREFUSED".to_string()),
        PatternConfig::Substring("ECONNRESET".to_string()),
        PatternConfig::Substring("ETIMEDOUT".to_string()),
        PatternConfig::Regex("HTTP 429".to_string()),
        PatternConfig::Regex(r"HTTP 5\d\d".to_string()),
    ]
}

/// Response cache settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
    /// Shared Redis store; the in-process store is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl(),
            redis_url: None,
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    300
}

/// Inbound rate limit settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

fn default_max_requests() -> u32 {
    100
}

fn default_window_seconds() -> u64 {
    60
}

/// Search pagination settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaginationConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

fn default_limit() -> u32 {
    crate::orchestrator::DEFAULT_LIMIT
}

fn default_max_limit() -> u32 {
    10
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// API credentials, read from the environment only
#[derive(Clone)]
pub struct Secrets {
    openai_api_key: String,
    firecrawl_api_key: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("openai_api_key", &"<redacted>")
            .field("firecrawl_api_key", &"<redacted>")
            .finish()
    }
}

impl Secrets {
    pub fn new(openai_api_key: impl Into<String>, firecrawl_api_key: impl Into<String>) -> Self {
        Self {
            openai_api_key: openai_api_key.into(),
            firecrawl_api_key: firecrawl_api_key.into(),
        }
    }

    /// Read both keys from the process environment
    ///
    /// # Errors
    /// Returns a configuration error naming the first missing or empty variable.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read both keys through `lookup`
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| {
                    AppError::Config(format!("{name} environment variable is required"))
                })
        };

        Ok(Self {
            openai_api_key: require(OPENAI_API_KEY_ENV)?,
            firecrawl_api_key: require(FIRECRAWL_API_KEY_ENV)?,
        })
    }

    pub fn openai_api_key(&self) -> &str {
        &self.openai_api_key
    }

    pub fn firecrawl_api_key(&self) -> &str {
        &self.firecrawl_api_key
    }
}

fn check_url(key: &str, url: &str) -> AppResult<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "{key} must start with 'http://' or 'https://', got '{url}'"
        )))
    }
}

fn check_timeout(key: &str, seconds: u64) -> AppResult<()> {
    if seconds == 0 || seconds > MAX_TIMEOUT_SECONDS {
        return Err(AppError::Config(format!(
            "{key} must be between 1 and {MAX_TIMEOUT_SECONDS} seconds, got {seconds}"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: read
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 2: parse
        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        // Phase 3: validate
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.message(),
            })?;

        Ok(config)
    }

    /// Apply environment overrides (`REDIS_URL`) through `lookup`
    ///
    /// An empty variable is ignored. Call [`Config::validate`] afterwards.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(REDIS_URL_ENV).filter(|url| !url.trim().is_empty()) {
            self.cache.redis_url = Some(url.trim().to_string());
        }
    }

    /// Validate configuration after parsing
    pub fn validate(&self) -> AppResult<()> {
        check_url("classifier.base_url", &self.classifier.base_url)?;
        check_url("scraper.base_url", &self.scraper.base_url)?;
        check_timeout("classifier.timeout_seconds", self.classifier.timeout_seconds)?;
        check_timeout("scraper.timeout_seconds", self.scraper.timeout_seconds)?;

        if self.classifier.model.trim().is_empty() {
            return Err(AppError::Config(
                "classifier.model must not be empty".to_string(),
            ));
        }

        let temperature = self.classifier.summary_temperature;
        if !temperature.is_finite() || !(0.0..=2.0).contains(&temperature) {
            return Err(AppError::Config(format!(
                "classifier.summary_temperature must be a finite number between 0.0 and 2.0, got {temperature}"
            )));
        }

        if self.classifier.summary_max_tokens == 0 {
            return Err(AppError::Config(
                "classifier.summary_max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.scraper.search_limit == 0 || self.scraper.search_limit > 100 {
            return Err(AppError::Config(format!(
                "scraper.search_limit must be between 1 and 100, got {}",
                self.scraper.search_limit
            )));
        }

        if self.scraper.search_limit < self.pagination.max_limit {
            return Err(AppError::Config(format!(
                "scraper.search_limit ({}) must be at least pagination.max_limit ({})",
                self.scraper.search_limit, self.pagination.max_limit
            )));
        }

        self.classifier.retry.policy("classifier")?;
        self.scraper.retry.policy("scraper")?;

        if self.cache.ttl_seconds == 0 {
            return Err(AppError::Config(
                "cache.ttl_seconds must be greater than 0".to_string(),
            ));
        }
        if self.cache.sweep_interval_seconds == 0 {
            return Err(AppError::Config(
                "cache.sweep_interval_seconds must be greater than 0".to_string(),
            ));
        }
        if let Some(url) = &self.cache.redis_url {
            let known_scheme = ["redis://", "rediss://", "unix://"]
                .iter()
                .any(|scheme| url.starts_with(scheme));
            if !known_scheme {
                return Err(AppError::Config(
                    "cache.redis_url must start with 'redis://', 'rediss://' or 'unix://'"
                        .to_string(),
                ));
            }
        }

        if self.rate_limit.max_requests == 0 {
            return Err(AppError::Config(
                "rate_limit.max_requests must be greater than 0".to_string(),
            ));
        }
        if self.rate_limit.window_seconds == 0 {
            return Err(AppError::Config(
                "rate_limit.window_seconds must be greater than 0".to_string(),
            ));
        }

        if self.pagination.max_limit == 0 {
            return Err(AppError::Config(
                "pagination.max_limit must be greater than 0".to_string(),
            ));
        }
        if self.pagination.default_limit == 0
            || self.pagination.default_limit > self.pagination.max_limit
        {
            return Err(AppError::Config(format!(
                "pagination.default_limit must be between 1 and pagination.max_limit ({}), got {}",
                self.pagination.max_limit, self.pagination.default_limit
            )));
        }

        let level = self.observability.log_level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(AppError::Config(format!(
                "observability.log_level must be one of {LOG_LEVELS:?}, got '{}'",
                self.observability.log_level
            )));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}
