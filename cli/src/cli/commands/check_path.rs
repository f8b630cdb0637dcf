use std::path::PathBuf;

use agent_relay_core::config::load_config;
use agent_relay_core::proxy::security::{PathAllowlist, WebSocketPathValidator};
use agent_relay_core::proxy::RouteTable;

pub fn run(config_path: Option<PathBuf>, path: &str, websocket: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    if websocket {
        let gate = WebSocketPathValidator::new(config.routes.websocket_path.clone());
        let verdict = gate.validate(path);
        match verdict.error {
            None => println!("ALLOWED  {} -> {}{}", path, config.backend.url, config.backend.websocket_path),
            Some(reason) => println!("REJECTED {} ({})", path, reason),
        }
        return Ok(());
    }

    let allowlist = PathAllowlist::new(config.routes.http_root.clone(), config.routes.allowed_paths.clone());
    match allowlist.resolve(path) {
        Ok(target) => {
            let routes = RouteTable::new(&config.routes.endpoints);
            let handling = routes
                .resolve(&target.backend_path)
                .map(|endpoint| endpoint.name())
                .unwrap_or("passthrough");
            println!(
                "ALLOWED  {} -> {} [{}]",
                path,
                target.backend_target(&config.backend.url),
                handling
            );
        }
        Err(reason) => println!("REJECTED {} ({})", path, reason),
    }

    Ok(())
}
