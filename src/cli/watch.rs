use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tracing::info;

use altscribe::config::Settings;
use altscribe::services::{api_key_from_env, SettingsFactory};
use altscribe::watch::{WatchOptions, WatchService};

#[derive(Args)]
pub struct WatchArgs {
    /// Directory to watch (default: <data dir>/watched)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Directory for outputs (default: <data dir>/output)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Delete inputs and their sidecars after they complete
    #[arg(long)]
    pub cleanup: bool,
}

pub async fn execute(args: WatchArgs, settings: Settings) -> anyhow::Result<()> {
    let api_key = api_key_from_env()?;

    let mut options = WatchOptions::from_settings(&settings);
    if let Some(dir) = args.dir {
        options.watch_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        options.output_dir = dir;
    }
    options.cleanup = args.cleanup;

    let factory = Arc::new(SettingsFactory::new(settings.clone(), api_key));
    let service = WatchService::new(options, settings, factory);

    tokio::select! {
        result = service.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            let status = service.queue().status().await;
            info!(
                "Stopped: {} completed, {} failed, {} queued",
                status.completed, status.failed, status.queued
            );
        }
    }
    Ok(())
}
