//! CLI definitions for pushbridge.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// pushbridge CLI.
#[derive(Parser)]
#[command(name = "pushbridge")]
#[command(about = "WebSocket push bridge with correlated SSE reply streaming")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the server in foreground (default)
    Run {
        /// Server host, overrides `server.host`
        #[arg(long)]
        host: Option<String>,

        /// Server port, overrides `server.port`
        #[arg(long)]
        port: Option<u16>,
    },

    /// Load and validate the configuration, then exit
    CheckConfig,
}
