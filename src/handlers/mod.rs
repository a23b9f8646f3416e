//! HTTP request handlers for the adscout API

use crate::cache::{MemoryStore, RedisStore, ResponseCache, Store};
use crate::classifier::OpenAiClassifier;
use crate::config::{Config, Secrets};
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::middleware::SlidingWindowLimiter;
use crate::orchestrator::Orchestrator;
use crate::retry::Retrier;
use crate::scraper::FirecrawlClient;
use std::sync::Arc;

pub mod chat;
pub mod export;
pub mod extractor;
pub mod health;
pub mod metrics;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    orchestrator: Arc<Orchestrator>,
    metrics: Arc<Metrics>,
    limiter: Arc<SlidingWindowLimiter>,
}

impl AppState {
    /// Assemble state from already-built components
    ///
    /// The rate limiter is created from `config.rate_limit`.
    pub fn new(config: Config, orchestrator: Orchestrator, metrics: Arc<Metrics>) -> Self {
        let limiter = SlidingWindowLimiter::new(
            config.rate_limit.max_requests,
            config.rate_limit.window(),
        );

        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            metrics,
            limiter: Arc::new(limiter),
        }
    }

    /// Build the production clients, cache, and limiter from configuration
    ///
    /// Connects to Redis when `cache.redis_url` is set; otherwise starts an
    /// in-process store with a background sweeper.
    ///
    /// # Errors
    /// Returns an error if a retry policy is invalid, an HTTP client cannot be
    /// built, the metrics registry fails, or Redis is unreachable.
    pub async fn from_config(config: Config, secrets: &Secrets) -> AppResult<Self> {
        let metrics = Arc::new(Metrics::new().map_err(|e| {
            AppError::Internal(format!("failed to create metrics registry: {e}"))
        })?);

        let classifier = OpenAiClassifier::new(
            &config.classifier.base_url,
            secrets.openai_api_key(),
            &config.classifier.model,
            config.classifier.timeout(),
            config.classifier.summary_temperature,
            config.classifier.summary_max_tokens,
            Retrier::new(
                config.classifier.retry.policy("classifier")?,
                metrics.clone(),
            ),
        )?;

        let scraper = FirecrawlClient::new(
            &config.scraper.base_url,
            secrets.firecrawl_api_key(),
            config.scraper.timeout(),
            config.scraper.search_limit,
            Retrier::new(config.scraper.retry.policy("scraper")?, metrics.clone()),
        )?;

        let store: Arc<dyn Store> = match &config.cache.redis_url {
            Some(url) => {
                tracing::info!("Using Redis response cache");
                Arc::new(RedisStore::connect(url).await?)
            }
            None => {
                tracing::info!("Using in-process response cache");
                let store = Arc::new(MemoryStore::new());
                spawn_sweeper(store.clone(), &config);
                store
            }
        };

        let cache = ResponseCache::new(store, config.cache.ttl(), metrics.clone());
        let orchestrator = Orchestrator::new(
            Arc::new(classifier),
            Arc::new(scraper),
            cache,
            metrics.clone(),
        );

        Ok(Self::new(config, orchestrator, metrics))
    }

    /// Get reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }
}

/// Start the memory store sweeper and log if it ever stops
fn spawn_sweeper(store: Arc<MemoryStore>, config: &Config) {
    let handle = store.start_sweeper(config.cache.sweep_interval());

    tokio::spawn(async move {
        match handle.await {
            Ok(()) => {
                tracing::error!(
                    "Cache sweeper terminated unexpectedly. Expired entries will only \
                    be removed when they are read."
                );
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Cache sweeper panicked. Expired entries will only be removed \
                    when they are read."
                );
            }
        }
    });
}
