//! Telemetry and observability setup
//!
//! Configures structured logging with tracing and tracing-subscriber.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Directive used when `RUST_LOG` is unset or invalid
pub fn default_directive(level: &str) -> String {
    format!("adscout={level},tower_http=debug")
}

/// Initialize tracing subscriber for structured logging
///
/// This can only be called once per process. Subsequent calls are silently ignored.
///
/// Reads filters from the RUST_LOG environment variable, falling back to
/// `level` (from `observability.log_level`) for this crate.
///
/// # Examples
///
/// ```no_run
/// adscout::telemetry::init("info");
/// tracing::info!("Application started");
/// ```
pub fn init(level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
