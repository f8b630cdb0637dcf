use clap::Parser;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level for anything it names
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("agent_relay={}", cli.log_level).parse()?)
                .add_directive(format!("agent_relay_core={}", cli.log_level).parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    match cli.command {
        Commands::Start { port, backend } => {
            cli::commands::start::run(cli.config, port, backend).await?;
        }
        Commands::Status => {
            cli::commands::status::run(cli.config).await?;
        }
        Commands::CheckPath { path, websocket } => {
            cli::commands::check_path::run(cli.config, &path, websocket)?;
        }
    }

    Ok(())
}
