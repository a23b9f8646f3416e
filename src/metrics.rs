//! Prometheus metrics collection for adscout
//!
//! Tracks:
//! - Chat request outcomes (success, cached, or the error kind)
//! - Upstream call attempts per operation and how each attempt ended
//! - Response cache hits and misses
//! - Inbound rate-limit rejections
//! - End-to-end pipeline latency
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.
//! Recording never fails a request; callers log and continue.

use crate::error::ErrorKind;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// External operation label
///
/// Restricts the `operation` label to the five calls the pipeline makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Search,
    Extract,
    ScrapeImages,
    Analyze,
    Summarize,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Search => "search",
            Operation::Extract => "extract",
            Operation::ScrapeImages => "scrape_images",
            Operation::Analyze => "analyze",
            Operation::Summarize => "summarize",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single upstream attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    /// The call succeeded
    Success,
    /// The call failed with a transient error and will be retried
    Retried,
    /// The call failed transiently but no attempts remain
    Exhausted,
    /// The call failed with an error that is never retried
    Terminal,
}

impl AttemptResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptResult::Success => "success",
            AttemptResult::Retried => "retried",
            AttemptResult::Exhausted => "exhausted",
            AttemptResult::Terminal => "terminal",
        }
    }
}

/// Final outcome of a `/chat` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Cached,
    Failed(ErrorKind),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Cached => "cached",
            Outcome::Failed(kind) => kind.as_str(),
        }
    }
}

/// Metrics collector for adscout
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    requests_total: IntCounterVec,
    upstream_attempts: IntCounterVec,
    cache_lookups: IntCounterVec,
    rate_limited: IntCounter,
    pipeline_duration: HistogramVec,
}

impl Metrics {
    /// Create a new Metrics instance with its own registry
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 2 successes + 6 error kinds
        let requests_total = IntCounterVec::new(
            Opts::new(
                "adscout_requests_total",
                "Total chat requests by outcome (success, cached, or error kind)",
            ),
            &["outcome"],
        )?;

        // Cardinality: 5 operations x 4 results
        let upstream_attempts = IntCounterVec::new(
            Opts::new(
                "adscout_upstream_attempts_total",
                "Upstream call attempts by operation and attempt result",
            ),
            &["operation", "result"],
        )?;

        let cache_lookups = IntCounterVec::new(
            Opts::new(
                "adscout_cache_lookups_total",
                "Response cache lookups by result (hit, miss, error)",
            ),
            &["result"],
        )?;

        let rate_limited = IntCounter::with_opts(Opts::new(
            "adscout_rate_limited_total",
            "Inbound requests rejected by the sliding-window rate limiter",
        ))?;

        let pipeline_duration = HistogramVec::new(
            HistogramOpts::new(
                "adscout_pipeline_duration_ms",
                "End-to-end chat pipeline latency in milliseconds",
            )
            .buckets(vec![
                10.0, 50.0, 100.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0, 60000.0,
            ]),
            &["outcome"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(upstream_attempts.clone()))?;
        registry.register(Box::new(cache_lookups.clone()))?;
        registry.register(Box::new(rate_limited.clone()))?;
        registry.register(Box::new(pipeline_duration.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            upstream_attempts,
            cache_lookups,
            rate_limited,
            pipeline_duration,
        })
    }

    /// Record the final outcome of a chat request
    pub fn record_request(&self, outcome: Outcome) -> Result<(), prometheus::Error> {
        self.requests_total
            .get_metric_with_label_values(&[outcome.as_str()])?
            .inc();
        Ok(())
    }

    /// Record one upstream attempt
    pub fn record_attempt(
        &self,
        operation: Operation,
        result: AttemptResult,
    ) -> Result<(), prometheus::Error> {
        self.upstream_attempts
            .get_metric_with_label_values(&[operation.as_str(), result.as_str()])?
            .inc();
        Ok(())
    }

    /// Record a cache lookup (`"hit"`, `"miss"` or `"error"`)
    pub fn record_cache_lookup(&self, result: &'static str) -> Result<(), prometheus::Error> {
        self.cache_lookups
            .get_metric_with_label_values(&[result])?
            .inc();
        Ok(())
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.inc();
    }

    /// Record pipeline latency
    ///
    /// # Errors
    ///
    /// Rejects NaN, infinite, or negative durations.
    pub fn record_pipeline_duration(
        &self,
        outcome: Outcome,
        duration_ms: f64,
    ) -> Result<(), prometheus::Error> {
        if !duration_ms.is_finite() || duration_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "invalid pipeline duration: {duration_ms}"
            )));
        }
        self.pipeline_duration
            .get_metric_with_label_values(&[outcome.as_str()])?
            .observe(duration_ms);
        Ok(())
    }

    /// Number of attempts recorded for an operation/result pair
    pub fn attempt_count(&self, operation: Operation, result: AttemptResult) -> u64 {
        self.upstream_attempts
            .get_metric_with_label_values(&[operation.as_str(), result.as_str()])
            .map(|counter| counter.get())
            .unwrap_or(0)
    }

    /// Number of requests recorded for an outcome
    pub fn request_count(&self, outcome: Outcome) -> u64 {
        self.requests_total
            .get_metric_with_label_values(&[outcome.as_str()])
            .map(|counter| counter.get())
            .unwrap_or(0)
    }

    pub fn rate_limited_count(&self) -> u64 {
        self.rate_limited.get()
    }

    /// Encode all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("metrics output is not UTF-8: {e}")))
    }
}
