use std::path::PathBuf;
use std::time::Duration;

use agent_relay_core::config::{default_config_path, load_config};

pub async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path.clone())?;

    println!("Agent Relay Status");
    println!("==================");
    println!();
    println!("Configuration:");
    println!("  Config file: {:?}", config_path.unwrap_or_else(default_config_path));
    println!();
    println!("Server settings:");
    println!("  Host: {}", config.server.host);
    println!("  Port: {}", config.server.port);
    println!("  HTTP root: {}", config.routes.http_root);
    println!("  WebSocket path: {}", config.routes.websocket_path);
    println!();
    println!("Backend:");
    println!("  URL: {}", config.backend.url);
    println!("  WebSocket path: {}", config.backend.websocket_path);
    println!("  Allowed paths:");
    for path in &config.routes.allowed_paths {
        println!("    {}{}", config.routes.http_root, path);
    }
    println!();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .no_proxy()
        .build()?;

    let relay_url = format!("http://{}:{}/healthz", config.server.host, config.server.port);
    match client.get(&relay_url).send().await {
        Ok(resp) if resp.status().is_success() => println!("Relay: RUNNING ✓"),
        _ => println!("Relay: NOT RUNNING"),
    }

    // Any HTTP answer means the backend is up
    match client.get(&config.backend.url).send().await {
        Ok(resp) => println!("Backend: REACHABLE ({})", resp.status()),
        Err(_) => println!("Backend: UNREACHABLE"),
    }

    Ok(())
}
