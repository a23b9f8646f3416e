//! Backoff policy engine
//!
//! Pure functions deciding how long to wait before the next attempt and whether
//! a failure is worth another attempt at all.

use crate::error::AppError;
use regex::Regex;
use std::time::Duration;

/// Matcher deciding whether a failure is transient
///
/// A pattern is tested against both the error's message and its kind string
/// (e.g. `"ExternalAPIError"`).
#[derive(Debug, Clone)]
pub enum RetryPattern {
    /// Exact substring match
    Substring(String),
    /// Regular expression match anywhere in the text
    Regex(Regex),
}

impl RetryPattern {
    pub fn substring(text: impl Into<String>) -> Self {
        Self::Substring(text.into())
    }

    /// Compile a regex pattern
    ///
    /// # Errors
    /// Returns the compile error for an invalid expression.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Substring(needle) => text.contains(needle.as_str()),
            Self::Regex(re) => re.is_match(text),
        }
    }
}

impl std::fmt::Display for RetryPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Substring(needle) => write!(f, "substring({needle})"),
            Self::Regex(re) => write!(f, "regex({})", re.as_str()),
        }
    }
}

/// Patterns covering connection refusal/reset, timeouts, HTTP 429 and HTTP 5xx
///
/// Clients render transport failures with these tokens in their messages.
pub fn transport_patterns() -> Vec<RetryPattern> {
    vec![
        RetryPattern::substring("ECONNREFUSED"),
        RetryPattern::substring("ECONNRESET"),
        RetryPattern::substring("ETIMEDOUT"),
        RetryPattern::Regex(Regex::new(r"HTTP 429").expect("static regex is valid")),
        RetryPattern::Regex(Regex::new(r"HTTP 5\d\d").expect("static regex is valid")),
    ]
}

/// Delay before the attempt following `attempt` (1-indexed)
///
/// Computes `min(initial_delay * 2^(attempt-1), max_delay)` without jitter.
/// Arithmetic saturates, so huge attempt numbers simply yield `max_delay`.
///
/// With initial=1s, max=10s:
/// - Attempt 1: 1s
/// - Attempt 2: 2s
/// - Attempt 3: 4s
/// - Attempt 5+: 10s (capped)
pub fn next_delay(attempt: u32, initial_delay: Duration, max_delay: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1);
    initial_delay
        .saturating_mul(2_u32.saturating_pow(exponent))
        .min(max_delay)
}

/// True if the error's message or kind matches any of `patterns`
pub fn is_retryable(error: &AppError, patterns: &[RetryPattern]) -> bool {
    let message = error.message();
    let kind = error.kind();
    patterns
        .iter()
        .any(|pattern| pattern.matches(&message) || pattern.matches(kind.as_str()))
}
