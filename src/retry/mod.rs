//! Retryable operation wrapper
//!
//! [`Retrier`] runs an async operation under a [`RetryPolicy`]: transient failures
//! (those matching the policy's patterns) are retried with exponential backoff,
//! terminal failures abort on first occurrence, and the last error always reaches
//! the caller unchanged once attempts run out.

pub mod backoff;

pub use backoff::{RetryPattern, is_retryable, next_delay, transport_patterns};

use crate::error::{AppError, AppResult};
use crate::metrics::{AttemptResult, Metrics, Operation};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default maximum number of attempts (first try included)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default delay before the first retry
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;
/// Default ceiling for any single delay
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// Retry policy for one external client
///
/// Fields are private so a policy can only be built through [`RetryPolicy::new`],
/// which rejects zero attempts and inverted delay bounds.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    patterns: Vec<RetryPattern>,
}

impl RetryPolicy {
    /// Create a validated retry policy
    ///
    /// # Errors
    /// Returns a configuration error if `max_attempts` is 0 or
    /// `max_delay < initial_delay`.
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        patterns: Vec<RetryPattern>,
    ) -> AppResult<Self> {
        if max_attempts == 0 {
            return Err(AppError::Config(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        if max_delay < initial_delay {
            return Err(AppError::Config(format!(
                "retry max_delay ({}ms) must not be smaller than initial_delay ({}ms)",
                max_delay.as_millis(),
                initial_delay.as_millis()
            )));
        }
        Ok(Self {
            max_attempts,
            initial_delay,
            max_delay,
            patterns,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn patterns(&self) -> &[RetryPattern] {
        &self.patterns
    }

    /// Delay to sleep after failed attempt `attempt`
    ///
    /// A `retryAfter` hint from a rate-limit error stretches the delay, but never
    /// past `max_delay`.
    pub fn delay_for(&self, attempt: u32, error: &AppError) -> Duration {
        let base = next_delay(attempt, self.initial_delay, self.max_delay);
        match error.retry_after() {
            Some(seconds) => base.max(Duration::from_secs(seconds)).min(self.max_delay),
            None => base,
        }
    }

    fn should_retry(&self, error: &AppError) -> bool {
        !error.is_terminal() && is_retryable(error, &self.patterns)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            transport_patterns(),
        )
        .expect("default RetryPolicy values must be valid")
    }
}

/// Runs operations under a retry policy and records every attempt
#[derive(Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl Retrier {
    pub fn new(policy: RetryPolicy, metrics: Arc<Metrics>) -> Self {
        Self { policy, metrics }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `op`, retrying transient failures
    ///
    /// `op` is invoked at most `max_attempts` times. Terminal errors and errors
    /// matching no pattern are returned after the first invocation that produced
    /// them. Dropping the returned future cancels the in-flight attempt and any
    /// pending backoff sleep.
    pub async fn run<T, F, Fut>(&self, operation: Operation, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => {
                    self.record(operation, AttemptResult::Success);
                    if attempt > 1 {
                        tracing::info!(
                            operation = %operation,
                            attempt = attempt,
                            max_attempts = max_attempts,
                            "Upstream call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !self.policy.should_retry(&error) {
                        self.record(operation, AttemptResult::Terminal);
                        tracing::debug!(
                            operation = %operation,
                            attempt = attempt,
                            error_kind = %error.kind(),
                            error = %error,
                            "Upstream call failed with non-retryable error"
                        );
                        return Err(error);
                    }

                    if attempt >= max_attempts {
                        self.record(operation, AttemptResult::Exhausted);
                        tracing::warn!(
                            operation = %operation,
                            attempts = attempt,
                            error_kind = %error.kind(),
                            error = %error,
                            "Upstream call failed, retry attempts exhausted"
                        );
                        return Err(error);
                    }

                    self.record(operation, AttemptResult::Retried);
                    let delay = self.policy.delay_for(attempt, &error);
                    tracing::warn!(
                        operation = %operation,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient upstream failure, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn record(&self, operation: Operation, result: AttemptResult) {
        if let Err(e) = self.metrics.record_attempt(operation, result) {
            tracing::error!(
                error = %e,
                operation = %operation,
                result = result.as_str(),
                "Metrics recording failed (non-fatal)"
            );
        }
    }
}
