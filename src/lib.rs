//! adscout - chat-driven business research for direct-mail advertising
//!
//! A chat message is classified by a language model into either a direct reply or a
//! business lookup. Lookups are searched and scraped through a web-scraping API,
//! summarized back by the model, and returned as one paginated response envelope.
//! Every upstream call runs under a retry policy, finished envelopes are cached, and
//! inbound traffic is rate limited per client.

pub mod business;
pub mod cache;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod orchestrator;
pub mod retry;
pub mod scraper;
pub mod server;
pub mod telemetry;
pub mod upstream;
