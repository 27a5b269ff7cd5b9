use clap::Parser;
use har_relay::cli::{handle_config_init, Cli, Commands, ConfigCommands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(args) => har_relay::cli::serve::run_serve(args).await,
        Commands::Config(ConfigCommands::Init(args)) => handle_config_init(&args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
