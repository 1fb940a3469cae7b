//! Watch folder mode.
//!
//! New tables dropped into the watched directory are queued and processed
//! one at a time with their sidecar options. Outputs land in the output
//! directory; completed inputs can optionally be removed.

mod queue;
mod watcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

pub use queue::{JobStatus, ProcessingJob, ProcessingQueue, QueueStatus};
pub use watcher::{is_input_table, scan_existing, FolderWatcher};

use crate::config::Settings;
use crate::pipeline::LogObserver;
use crate::services::{process_file, CollaboratorFactory};

/// Pause before reading a new file so its writer can finish.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub watch_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Remove completed inputs and their sidecars.
    pub cleanup: bool,
}

impl WatchOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            watch_dir: settings.watch_dir.clone(),
            output_dir: settings.output_dir.clone(),
            cleanup: false,
        }
    }
}

pub struct WatchService {
    options: WatchOptions,
    settings: Settings,
    factory: Arc<dyn CollaboratorFactory>,
    queue: Arc<ProcessingQueue>,
}

impl WatchService {
    pub fn new(options: WatchOptions, settings: Settings, factory: Arc<dyn CollaboratorFactory>) -> Self {
        Self {
            options,
            settings,
            factory,
            queue: Arc::new(ProcessingQueue::new()),
        }
    }

    pub fn queue(&self) -> Arc<ProcessingQueue> {
        self.queue.clone()
    }

    /// Queue every table already present in the watched directory.
    pub async fn enqueue_existing(&self) -> Result<usize, WatchError> {
        let mut added = 0;
        for path in scan_existing(&self.options.watch_dir)? {
            if self.queue.enqueue(&path).await.is_some() {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Process queued jobs until none remain. Returns how many ran.
    pub async fn drain(&self) -> usize {
        let mut ran = 0;
        while let Some(job) = self.queue.start_next().await {
            self.run_job(&job).await;
            ran += 1;
        }
        ran
    }

    async fn run_job(&self, job: &ProcessingJob) {
        info!("Processing {}", job.csv_path.display());
        let sidecar = job.sidecar_path();

        let result = process_file(
            &job.csv_path,
            &self.options.output_dir,
            &self.settings,
            self.factory.as_ref(),
            Arc::new(LogObserver),
        )
        .await;

        match result {
            Ok(done) => {
                info!(
                    "Completed {}: {} processed, {} skipped, {} failed",
                    job.csv_path.display(),
                    done.summary.processed,
                    done.summary.skipped,
                    done.summary.failed
                );
                let outputs = vec![
                    done.outputs.updated.clone(),
                    done.outputs.simplified.clone(),
                    done.outputs.filenames.clone(),
                ];
                self.queue.complete(job.id, done.summary, outputs).await;
                if self.options.cleanup {
                    remove_inputs(&job.csv_path, sidecar.as_deref());
                }
            }
            Err(e) => {
                error!("Failed {}: {}", job.csv_path.display(), e);
                self.queue.fail(job.id, e.to_string()).await;
            }
        }
    }

    /// Watch until the directory watcher closes.
    pub async fn run(&self) -> Result<(), WatchError> {
        std::fs::create_dir_all(&self.options.watch_dir)?;
        std::fs::create_dir_all(&self.options.output_dir)?;

        let mut watcher = FolderWatcher::start(&self.options.watch_dir)?;
        info!(
            "Watching {} (outputs in {})",
            self.options.watch_dir.display(),
            self.options.output_dir.display()
        );

        let existing = self.enqueue_existing().await?;
        if existing > 0 {
            info!("Found {} existing table(s)", existing);
        }
        self.drain().await;

        while let Some(path) = watcher.next().await {
            tokio::time::sleep(SETTLE_DELAY).await;
            if self.queue.enqueue(&path).await.is_some() {
                info!("Queued {}", path.display());
            }
            self.drain().await;
        }
        Ok(())
    }
}

fn remove_inputs(csv_path: &Path, sidecar: Option<&Path>) {
    for path in std::iter::once(csv_path).chain(sidecar) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
