mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use contentbox::ContentManager;
use contentbox::config::Config;
use contentbox::pipeline::LoaderRegistry;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.telemetry.log_filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let registry = Arc::new(LoaderRegistry::with_defaults());
    let manager = ContentManager::from_config(&config, registry)?;

    match cli.command {
        Commands::Fetch(args) => commands::fetch(&manager, args).await?,
        Commands::Load(args) => commands::load(&manager, args).await?,
    }

    Ok(())
}
