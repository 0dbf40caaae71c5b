//! pushbridge server binary.

mod cli;
mod server;

use clap::Parser;
use tracing::info;

use pushbridge_config::ConfigLoader;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = ConfigLoader::load_or_default(&cli.config)?;

    let (host, port) = match cli.command {
        Some(Commands::CheckConfig) => {
            if !server::check_config(&config) {
                std::process::exit(1);
            }
            println!("{}: ok", cli.config.display());
            return Ok(());
        }
        Some(Commands::Run { host, port }) => (host, port),
        None => (None, None),
    };

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    server::init_tracing(&config.logging)?;
    info!(config = %cli.config.display(), "configuration loaded");
    server::run_server(config).await
}
