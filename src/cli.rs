//! Command-line interface for adscout
//!
//! Provides argument parsing and subcommand handling for the adscout binary.

use clap::{Parser, Subcommand};

/// Chat-driven business research for direct-mail advertising
#[derive(Parser)]
#[command(name = "adscout")]
#[command(version)]
#[command(about = "Chat-driven business research for direct-mail advertising")]
#[command(
    long_about = "adscout answers chat messages about local businesses by searching and \
    scraping the web, then summarizing what it finds into an advertising brief."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# adscout Configuration
# =====================
#
# Every section and key is optional; the values below are the defaults.
#
# API keys are NOT read from this file. Set them in the environment:
#   OPENAI_API_KEY     language model credentials (required)
#   FIRECRAWL_API_KEY  scraping provider credentials (required)
#   REDIS_URL          overrides [cache] redis_url (optional)

# ─────────────────────────────────────────────────────────────────────────────
# SERVER
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"
port = 3001

# ─────────────────────────────────────────────────────────────────────────────
# CLASSIFIER (language model)
# ─────────────────────────────────────────────────────────────────────────────

[classifier]
# Any OpenAI-compatible chat completions API
base_url = "https://api.openai.com/v1"
model = "gpt-4-turbo-preview"
timeout_seconds = 30

# Sampling settings for the business summary
summary_temperature = 0.7
summary_max_tokens = 2000

[classifier.retry]
max_attempts = 3
initial_delay_ms = 1000
max_delay_ms = 5000
# Errors whose message matches any pattern are retried.
# Validation and not-found errors are never retried.
retryable_patterns = [
    { substring = "ECONNREFUSED" },
    { substring = "ECONNRESET" },
    { substring = "ETIMEDOUT" },
    { regex = "HTTP 429" },
    { regex = "HTTP 5\\d\\d" },
]

# ─────────────────────────────────────────────────────────────────────────────
# SCRAPER
# ─────────────────────────────────────────────────────────────────────────────

[scraper]
base_url = "https://api.firecrawl.dev/v1"
timeout_seconds = 30

# Search results requested per query (1-100, at least pagination.max_limit)
search_limit = 50

[scraper.retry]
max_attempts = 3
initial_delay_ms = 1000
max_delay_ms = 10000
retryable_patterns = [
    { substring = "ECONNREFUSED" },
    { substring = "ECONNRESET" },
    { substring = "ETIMEDOUT" },
    { regex = "HTTP 429" },
    { regex = "HTTP 5\\d\\d" },
]

# ─────────────────────────────────────────────────────────────────────────────
# RESPONSE CACHE
# ─────────────────────────────────────────────────────────────────────────────

[cache]
ttl_seconds = 3600

# Share the cache between instances (in-process cache when unset)
# redis_url = "redis://127.0.0.1:6379"

# How often the in-process cache drops expired entries
sweep_interval_seconds = 300

# ─────────────────────────────────────────────────────────────────────────────
# RATE LIMITING
# ─────────────────────────────────────────────────────────────────────────────
#
# Per client (first x-forwarded-for entry, else peer address).
# Applies to /chat and /export.

[rate_limit]
max_requests = 100
window_seconds = 60

# ─────────────────────────────────────────────────────────────────────────────
# PAGINATION
# ─────────────────────────────────────────────────────────────────────────────

[pagination]
# Used when a request has no ?limit=
default_limit = 5
# Largest ?limit= accepted
max_limit = 10

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
log_level = "info"

# Prometheus metrics are always available at /metrics on the server port
"#
}
