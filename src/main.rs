//! adscout HTTP server
//!
//! Loads configuration, builds the upstream clients and cache, and serves the chat
//! API with Axum.

use adscout::{
    cli::{Cli, Command, generate_config_template},
    config::{Config, Secrets},
    handlers::AppState,
    server, telemetry,
};
use clap::Parser;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                eprintln!("Configuration template written to {path}");
            }
            None => print!("{template}"),
        }
        return Ok(());
    }

    let mut config = Config::from_file(&cli.config)?;
    config.apply_env_overrides(|name| std::env::var(name).ok());
    config.validate()?;

    telemetry::init(&config.observability.log_level);

    let secrets = Secrets::from_env()?;

    tracing::info!(
        "Starting adscout server on {}:{}",
        config.server.host,
        config.server.port
    );

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .map_err(|e| format!("invalid server.host '{}': {e}", config.server.host))?,
        config.server.port,
    ));

    let state = AppState::from_config(config, &secrets).await?;
    let app = server::router(state);

    tracing::info!("Listening on {}", addr);
    tracing::info!("Health check available at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(server::shutdown_signal())
    .await?;

    Ok(())
}
