use std::path::PathBuf;

use agent_relay_core::config::load_config;
use agent_relay_core::proxy::ProxyServer;

pub async fn run(
    config_path: Option<PathBuf>,
    port_override: Option<u16>,
    backend_override: Option<String>,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;

    if let Some(port) = port_override {
        config.server.port = port;
    }
    if let Some(backend) = backend_override {
        config.backend.url = backend;
        config.validate()?;
    }

    tracing::info!("Starting Agent Relay...");
    tracing::info!("  Host: {}", config.server.host);
    tracing::info!("  Port: {}", config.server.port);
    tracing::info!("  Backend: {}", config.backend.url);
    tracing::info!("  Allowed paths: {}", config.routes.allowed_paths.join(", "));

    let server = ProxyServer::new(&config)?;

    tracing::info!("Relay starting on http://{}:{}", config.server.host, config.server.port);
    tracing::info!("Press Ctrl+C to stop");

    server.run().await?;

    Ok(())
}
