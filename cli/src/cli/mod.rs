pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agent-relay")]
#[command(author, version, about = "Agent Relay - allow-listed proxy between a chat UI and an agent backend")]
pub struct Cli {
    /// Path to config file (checked in order: local config.toml, ~/.config/agent-relay/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level for the relay crates (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay server
    Start {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Backend base URL (overrides config)
        #[arg(short, long)]
        backend: Option<String>,
    },

    /// Show configuration and whether the relay and backend respond
    Status,

    /// Check a path against the configured allowlist without starting the server
    CheckPath {
        /// Request path, e.g. /api/chat/stream
        path: String,

        /// Validate as a WebSocket upgrade path
        #[arg(long)]
        websocket: bool,
    },
}
