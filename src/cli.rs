use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "contentbox")]
#[command(about = "Content pipeline CLI", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $CONTENTBOX_CONFIG or config/contentbox.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download a URL through the download cache and describe it
    Fetch(FetchArgs),
    /// Run the full loader pipeline on a source
    Load(LoadArgs),
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Absolute URL, data URI, or a path relative to download.base_url
    pub url: String,
}

#[derive(clap::Args, Debug)]
pub struct LoadArgs {
    pub url: String,

    /// Built-in document type to produce
    #[arg(long = "as", value_enum, default_value_t = Output::Text)]
    pub output: Output,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Output {
    Json,
    Text,
}
