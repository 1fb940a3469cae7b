//! Batch processing pipeline.
//!
//! Turns the unprocessed rows of a [`RowStore`] into the smallest set of
//! page scrapes and vision calls: page context is resolved once per page,
//! admission rules reject images before spending on them, duplicates and
//! resized variants reuse earlier results, and admitted images are sent in
//! bounded batches. The store is saved after every scraped page and every
//! batch, so a killed run resumes from the rows still lacking alt text.

pub mod admission;
pub mod canonical;
pub mod context;
pub mod dedup;
pub mod events;
pub mod ledger;
pub mod scheduler;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm::{PricingModel, VisionGenerator, VisionResult};
use crate::models::{Outcome, RowId, RowUpdate};
use crate::repository::{RowStore, StoreError};
use crate::scrapers::{ImageFetcher, PageScraper};

pub use admission::{AdmissionLimits, SizeClass};
pub use context::{ContextResolver, ContextStats};
pub use dedup::{DedupCache, Lookup};
pub use events::{LogObserver, NoopObserver, PageSource, PipelineEvent, PipelineObserver, Resolution};
pub use ledger::{format_duration, CostGuard, ProgressLedger, RunSummary};
pub use scheduler::{Batch, BatchEntry, BatchScheduler, PendingVariant, DEFAULT_BATCH_CAPACITY};

const DUPLICATE_NOTE: &str = "Duplicate image (copied alt text)";
const VARIANT_NOTE: &str = "Image variant (copied alt text)";

/// Fatal errors that stop a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Access forbidden while scraping {page_url}: {reason}")]
    Forbidden { page_url: String, reason: String },

    #[error("Estimated cost (${estimated:.4}) exceeds max cost (${ceiling:.4})")]
    CostCeilingExceeded { estimated: f64, ceiling: f64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Receives each generated alt text as soon as it is known.
pub trait ResultSink: Send {
    fn write(&mut self, image_url: &str, alt_text: &str) -> Result<(), crate::export::ExportError>;
}

/// Tunables for a run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_cost: Option<f64>,
    pub scrape_delay: Duration,
    pub batch_capacity: usize,
    pub limits: AdmissionLimits,
    pub pricing: PricingModel,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_cost: None,
            scrape_delay: Duration::ZERO,
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            limits: AdmissionLimits::default(),
            pricing: PricingModel::default(),
        }
    }
}

/// What a run would do, computed without any network access.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub total_rows: usize,
    pub to_process: usize,
    pub already_done: usize,
    pub pages: usize,
    pub unique_images: usize,
    pub estimated_cost: f64,
}

impl RunPlan {
    pub fn duplicates(&self) -> usize {
        self.to_process - self.unique_images
    }
}

pub struct Pipeline {
    options: PipelineOptions,
    scraper: Arc<dyn PageScraper>,
    fetcher: Arc<dyn ImageFetcher>,
    vision: Arc<dyn VisionGenerator>,
    observer: Arc<dyn PipelineObserver>,
    sink: Option<Box<dyn ResultSink>>,
    cache: DedupCache,
    scheduler: BatchScheduler,
    ledger: ProgressLedger,
}

impl Pipeline {
    pub fn new(
        scraper: Arc<dyn PageScraper>,
        fetcher: Arc<dyn ImageFetcher>,
        vision: Arc<dyn VisionGenerator>,
    ) -> Self {
        let options = PipelineOptions::default();
        Self {
            scheduler: BatchScheduler::new(options.batch_capacity),
            options,
            scraper,
            fetcher,
            vision,
            observer: Arc::new(NoopObserver),
            sink: None,
            cache: DedupCache::new(),
            ledger: ProgressLedger::new(0),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.scheduler = BatchScheduler::new(options.batch_capacity);
        self.options = options;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Counters of the current (or last) run.
    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    pub fn take_sink(&mut self) -> Option<Box<dyn ResultSink>> {
        self.sink.take()
    }

    fn cost_guard(&self) -> CostGuard {
        CostGuard::new(self.options.pricing.clone(), self.options.max_cost)
    }

    /// Summarize pending work and estimate its cost.
    pub fn plan(&self, store: &RowStore) -> RunPlan {
        let pending = store.get_unprocessed_rows();
        let unique_images = pending
            .iter()
            .filter_map(|&id| store.row(id))
            .map(|row| row.image_url.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len();

        RunPlan {
            total_rows: store.len(),
            to_process: pending.len(),
            already_done: store.len() - pending.len(),
            pages: store.get_unique_pages().len(),
            unique_images,
            estimated_cost: self.cost_guard().estimate(pending.len()),
        }
    }

    /// Process every unprocessed row of `store`.
    ///
    /// On a fatal error the store is saved before the error is returned, and
    /// [`Pipeline::ledger`] still reports the last row written.
    pub async fn run(&mut self, store: &mut RowStore) -> Result<RunSummary, PipelineError> {
        let result = self.run_inner(store).await;
        if let Err(e) = &result {
            if !matches!(e, PipelineError::CostCeilingExceeded { .. }) {
                if let Err(save_err) = store.save() {
                    warn!("Failed to save row table after error: {}", save_err);
                }
            }
        }
        result
    }

    async fn run_inner(&mut self, store: &mut RowStore) -> Result<RunSummary, PipelineError> {
        let pending = store.get_unprocessed_rows();
        self.ledger = ProgressLedger::new(pending.len());
        self.cache = DedupCache::new();
        self.scheduler = BatchScheduler::new(self.options.batch_capacity);

        if pending.is_empty() {
            info!("No images to process; every row already has alt text");
            return Ok(self.ledger.summary());
        }

        let estimated = self.cost_guard().check(pending.len())?;
        self.ledger.estimated_cost = estimated;

        self.observer.on_event(&PipelineEvent::Started {
            to_process: pending.len(),
            pages: store.get_unique_pages().len(),
            estimated_cost: estimated,
        });

        let stats = ContextResolver::new(self.scraper.as_ref(), self.observer.as_ref())
            .with_delay(self.options.scrape_delay)
            .resolve_all(store)
            .await?;
        debug!(
            "Context: {} scraped, {} reused, {} failed",
            stats.scraped, stats.reused, stats.failed
        );

        for row_id in pending {
            self.process_row(store, row_id).await?;
        }

        let rest = self.scheduler.take();
        if !rest.is_empty() {
            self.flush(store, rest).await?;
        }
        store.save()?;

        let summary = self.ledger.summary();
        self.observer.on_event(&PipelineEvent::Complete {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    async fn process_row(&mut self, store: &mut RowStore, row_id: RowId) -> Result<(), PipelineError> {
        let row = store
            .row(row_id)
            .cloned()
            .ok_or(StoreError::UnknownRow(row_id))?;
        let image_url = row.image_url.clone();
        let base = canonical::base_filename(&image_url);

        match self.cache.lookup(&image_url, &base) {
            Lookup::Exact(outcome) => {
                return self.resolve(store, row_id, &image_url, &outcome, Resolution::Duplicate);
            }
            Lookup::Variant(outcome) => {
                self.cache.record_url(&image_url, outcome.clone());
                return self.resolve(store, row_id, &image_url, &outcome, Resolution::Variant);
            }
            Lookup::Miss => {}
        }

        if self.scheduler.contains_base(&base) {
            self.observer.on_event(&PipelineEvent::RowDeferred {
                row_id,
                image_url: image_url.clone(),
                base: base.clone(),
            });
            self.scheduler.defer(PendingVariant {
                row_id,
                image_url,
                base,
            });
            return Ok(());
        }

        if let Some(outcome) = admission::precheck(&row, &self.options.limits) {
            return self.reject(store, row_id, &image_url, outcome);
        }

        let image = match self.fetcher.fetch(&image_url).await {
            Ok(image) => image,
            Err(e) => {
                let outcome = Outcome::Failed(format!("Error: download error: {}", e));
                return self.reject(store, row_id, &image_url, outcome);
            }
        };

        let class = match admission::inspect(&image, &self.options.limits) {
            Ok(class) => class,
            Err(outcome) => return self.reject(store, row_id, &image_url, outcome),
        };

        let entry = BatchEntry {
            row_id,
            image_url,
            base,
            image,
            title: row.title_or_empty().to_string(),
            heading: row.heading_or_empty().to_string(),
            adjacent_text: row.adjacent_text_or_empty().to_string(),
        };

        match class {
            SizeClass::Large => {
                let open = self.scheduler.take();
                if !open.is_empty() {
                    self.flush(store, open).await?;
                }
                debug!("Large image {} sent on its own", entry.image_url);
                self.flush(store, Batch::solo(entry)).await?;
            }
            SizeClass::Normal => {
                if self.scheduler.push(entry) {
                    let full = self.scheduler.take();
                    self.flush(store, full).await?;
                }
            }
        }
        Ok(())
    }

    /// Record an admission or download rejection for one row.
    fn reject(
        &mut self,
        store: &mut RowStore,
        row_id: RowId,
        image_url: &str,
        outcome: Outcome,
    ) -> Result<(), PipelineError> {
        self.cache.record_url(image_url, outcome.clone());
        self.resolve(store, row_id, image_url, &outcome, Resolution::Rejected)
    }

    /// Write an outcome to the row, count it, and report it.
    fn resolve(
        &mut self,
        store: &mut RowStore,
        row_id: RowId,
        image_url: &str,
        outcome: &Outcome,
        resolution: Resolution,
    ) -> Result<(), PipelineError> {
        let update = match (outcome, resolution) {
            (Outcome::Generated(text), Resolution::Duplicate) => {
                RowUpdate::new().alt_text(text.as_str()).status_message(DUPLICATE_NOTE)
            }
            (Outcome::Generated(text), Resolution::Variant) => {
                RowUpdate::new().alt_text(text.as_str()).status_message(VARIANT_NOTE)
            }
            (Outcome::Generated(text), _) => {
                RowUpdate::new().alt_text(text.as_str()).clear_status_message()
            }
            (other, _) => RowUpdate::new()
                .alt_text(other.text())
                .status_message(other.text()),
        };
        store.update_row(row_id, update)?;
        self.ledger.record(row_id, outcome.disposition());

        if let (Outcome::Generated(text), Some(sink)) = (outcome, self.sink.as_mut()) {
            if let Err(e) = sink.write(image_url, text) {
                warn!("Failed to write backup row for {}: {}", image_url, e);
            }
        }

        self.observer.on_event(&PipelineEvent::RowResolved {
            row_id,
            image_url: image_url.to_string(),
            disposition: outcome.disposition(),
            resolution,
            text: outcome.text().to_string(),
        });
        Ok(())
    }

    /// Send one batch to the vision collaborator and fan results out to rows.
    async fn flush(&mut self, store: &mut RowStore, batch: Batch) -> Result<(), PipelineError> {
        let Batch { entries, variants } = batch;
        let images: Vec<_> = entries.iter().map(BatchEntry::to_vision_image).collect();
        let size = entries.len();

        let (cost, batch_error) = match self.vision.generate(&images).await {
            Ok(result) => {
                let cost = self.options.pricing.cost_of(&result.usage);
                self.ledger.record_call(result.usage, cost);

                let mut by_url: HashMap<String, VisionResult> = HashMap::new();
                for r in result.results {
                    by_url.entry(r.image_url.clone()).or_insert(r);
                }

                for entry in &entries {
                    let outcome = match by_url.remove(&entry.image_url) {
                        Some(VisionResult {
                            alt_text: Some(text),
                            ..
                        }) if !text.trim().is_empty() => Outcome::Generated(text.trim().to_string()),
                        Some(VisionResult { error: Some(e), .. }) => Outcome::Failed(format!("Error: {}", e)),
                        Some(_) => Outcome::Failed("Error: failed to generate alt text".to_string()),
                        None => Outcome::Failed("Error: no result returned for image".to_string()),
                    };
                    self.cache.record(&entry.image_url, &entry.base, outcome.clone());
                    self.resolve(store, entry.row_id, &entry.image_url, &outcome, Resolution::Generated)?;
                }
                (cost, None)
            }
            Err(e) => {
                warn!("Batch of {} failed: {}", size, e);
                let outcome = Outcome::Failed(format!("Error: batch processing error: {}", e));
                for entry in &entries {
                    self.cache.record(&entry.image_url, &entry.base, outcome.clone());
                    self.resolve(store, entry.row_id, &entry.image_url, &outcome, Resolution::Generated)?;
                }
                (0.0, Some(e.to_string()))
            }
        };

        for variant in variants {
            let (outcome, resolution) = match self.cache.lookup(&variant.image_url, &variant.base) {
                Lookup::Exact(outcome) => (outcome, Resolution::Duplicate),
                Lookup::Variant(outcome) => (outcome, Resolution::Variant),
                Lookup::Miss => (
                    Outcome::Failed("Error: variant of unresolved image".to_string()),
                    Resolution::Variant,
                ),
            };
            self.cache.record_url(&variant.image_url, outcome.clone());
            self.resolve(store, variant.row_id, &variant.image_url, &outcome, resolution)?;
        }

        store.save()?;
        self.observer.on_event(&PipelineEvent::BatchFlushed {
            size,
            cost,
            error: batch_error,
        });
        Ok(())
    }
}
