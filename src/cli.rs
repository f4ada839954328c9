use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "logbox")]
#[command(about = "Incremental cloud audit log collector", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to LOGBOX_CONFIG or config/logbox.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect new rows from configured sources
    Collect(CollectArgs),
    /// List artifacts a bucket source would collect, without downloading
    Discover(DiscoverArgs),
    /// Inspect or reset persisted collection state
    #[command(subcommand)]
    State(StateCommand),
    /// Validate configuration and print the effective settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Only collect these sources (repeatable); all sources when omitted
    #[arg(long = "source", short = 's')]
    pub sources: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Bucket source to walk
    pub source: String,

    /// Also list matched directories
    #[arg(long)]
    pub directories: bool,
}

#[derive(Subcommand, Debug)]
pub enum StateCommand {
    /// Print persisted snapshots as JSON
    Show {
        /// Only this source
        source: Option<String>,
    },
    /// Forget a source's cursor and collected artifacts
    Reset { source: String },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate and print the effective configuration as TOML
    Check,
}
