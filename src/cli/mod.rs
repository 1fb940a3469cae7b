//! Command-line surface.

mod export;
mod progress;
mod prompt;
mod run;
mod watch;

use clap::{Parser, Subcommand};

use altscribe::config::load_settings;

#[derive(Parser)]
#[command(name = "altscribe")]
#[command(about = "Generate alt text for every image in a crawler export")]
#[command(version)]
pub struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a table, writing alt text back into it
    Run(run::RunArgs),
    /// Process tables dropped into a watched directory
    Watch(watch::WatchArgs),
    /// Write the simplified and filename tables from a processed table
    Export(export::ExportArgs),
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings().await;

    match cli.command {
        Commands::Run(args) => run::execute(args, settings).await,
        Commands::Watch(args) => watch::execute(args, settings).await,
        Commands::Export(args) => export::execute(args),
    }
}
