mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env may hold ANTHROPIC_API_KEY
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let default_filter = if cli.verbose { "altscribe=debug" } else { "altscribe=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    cli::run(cli).await
}
