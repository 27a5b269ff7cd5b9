//! CLI module for har-relay
//!
//! Command-line interface for the demo server that shows the middleware and
//! login redirect in place.
//!
//! # Commands
//!
//! - `serve` - Start the demo server
//! - `config` - Configuration utilities (init)
//!
//! # Example
//!
//! ```bash
//! # Start the demo server
//! HAR_RELAY_API_KEY=... har-relay serve
//!
//! # Write a default config file
//! har-relay config init --output har-relay.toml
//! ```

pub mod config;
pub mod serve;

pub use config::handle_config_init;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// har-relay - HTTP exchange telemetry
#[derive(Parser, Debug)]
#[command(
    name = "har-relay",
    version,
    about = "Capture HTTP exchanges and ship them as HAR batches"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the demo server
    Serve(ServeArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "har-relay.toml")]
    pub config: PathBuf,

    /// Override server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Override server host
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// API key used for telemetry uploads and the companion API
    #[arg(long)]
    pub api_key: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate a configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "har-relay.toml")]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(short, long)]
    pub force: bool,
}
