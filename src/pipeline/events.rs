//! Events emitted during a pipeline run.
//! Used by the CLI to drive progress bars and by watch mode for logging.

use tracing::{debug, info, warn};

use super::ledger::RunSummary;
use crate::models::{Disposition, PageContext, RowId};

/// How a page's context was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSource {
    Scraped,
    /// Reused from values already in the store.
    Reused,
}

/// How a row reached its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Result of a vision call for this row.
    Generated,
    /// Copied from an earlier row with the same URL.
    Duplicate,
    /// Copied from another resolution of the same upload.
    Variant,
    /// Rejected by admission or download.
    Rejected,
}

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Started {
        to_process: usize,
        pages: usize,
        estimated_cost: f64,
    },
    PageResolved {
        index: usize,
        total: usize,
        page_url: String,
        source: PageSource,
        context: PageContext,
        images: usize,
    },
    RowResolved {
        row_id: RowId,
        image_url: String,
        disposition: Disposition,
        resolution: Resolution,
        text: String,
    },
    RowDeferred {
        row_id: RowId,
        image_url: String,
        base: String,
    },
    BatchFlushed {
        size: usize,
        cost: f64,
        error: Option<String>,
    },
    Complete {
        summary: RunSummary,
    },
}

/// Receives pipeline events synchronously, in order.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn on_event(&self, _event: &PipelineEvent) {}
}

/// Reports events through `tracing`. Used when no terminal is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl PipelineObserver for LogObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Started {
                to_process,
                pages,
                estimated_cost,
            } => info!(
                "Processing {} image(s) across {} page(s), estimated cost ${:.4}",
                to_process, pages, estimated_cost
            ),
            PipelineEvent::PageResolved {
                index,
                total,
                page_url,
                source,
                context,
                ..
            } => match (&context.error, source) {
                (Some(error), _) => warn!("[{}/{}] {}: {}", index, total, page_url, error),
                (None, PageSource::Reused) => {
                    debug!("[{}/{}] Already scraped: {}", index, total, page_url)
                }
                (None, PageSource::Scraped) => info!("[{}/{}] Scraped: {}", index, total, page_url),
            },
            PipelineEvent::RowResolved {
                image_url,
                disposition,
                text,
                ..
            } => match disposition {
                Disposition::Processed => debug!("{}: {}", image_url, text),
                Disposition::Skipped => info!("Skipped {}: {}", image_url, text),
                Disposition::Failed => warn!("Failed {}: {}", image_url, text),
            },
            PipelineEvent::RowDeferred { image_url, .. } => {
                debug!("Variant queued behind open batch: {}", image_url)
            }
            PipelineEvent::BatchFlushed { size, error, .. } => match error {
                Some(error) => warn!("Batch of {} failed: {}", size, error),
                None => debug!("Batch of {} flushed", size),
            },
            PipelineEvent::Complete { summary } => info!(
                "Done: {} processed, {} skipped, {} failed",
                summary.processed, summary.skipped, summary.failed
            ),
        }
    }
}
