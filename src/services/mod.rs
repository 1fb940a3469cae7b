//! Service layer shared by the CLI and watch mode.
//!
//! Builds the network collaborators from [`Settings`] and processes whole
//! input tables without any interactive step.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, ProcessingConfig, Settings};
use crate::export::{OutputError, OutputPaths};
use crate::llm::{VisionClient, VisionError, VisionGenerator};
use crate::pipeline::{Pipeline, PipelineError, PipelineObserver, PipelineOptions, RunSummary};
use crate::repository::{RowStore, StoreError};
use crate::scrapers::{HtmlPageScraper, HttpClient, HttpImageFetcher, ImageFetcher, PageScraper};

/// Environment variable holding the vision API key.
pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("ANTHROPIC_API_KEY is not set")]
    MissingApiKey,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read the API key from the environment, treating blank values as unset.
pub fn api_key_from_env() -> Result<String, ServiceError> {
    std::env::var(API_KEY_VAR)
        .ok()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .ok_or(ServiceError::MissingApiKey)
}

/// The three collaborators a pipeline needs.
#[derive(Clone)]
pub struct Collaborators {
    pub scraper: Arc<dyn PageScraper>,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub vision: Arc<dyn VisionGenerator>,
}

impl Collaborators {
    pub fn new(
        scraper: Arc<dyn PageScraper>,
        fetcher: Arc<dyn ImageFetcher>,
        vision: Arc<dyn VisionGenerator>,
    ) -> Self {
        Self {
            scraper,
            fetcher,
            vision,
        }
    }

    /// HTTP scraper, image fetcher and vision client sharing one rate limiter.
    pub fn from_settings(
        settings: &Settings,
        api_key: &str,
        instructions: Option<&str>,
    ) -> Result<Self, VisionError> {
        let http = HttpClient::with_user_agent(
            settings.request_timeout(),
            settings.request_delay(),
            settings.user_agent.as_deref(),
        );

        let mut vision = VisionClient::new(settings.vision.clone(), api_key)?;
        if let Some(instructions) = instructions {
            vision = vision.with_instructions(instructions);
        }

        Ok(Self {
            scraper: Arc::new(HtmlPageScraper::new(http.clone())),
            fetcher: Arc::new(HttpImageFetcher::new(http)),
            vision: Arc::new(vision),
        })
    }

    pub fn pipeline(&self, options: PipelineOptions) -> Pipeline {
        Pipeline::new(self.scraper.clone(), self.fetcher.clone(), self.vision.clone())
            .with_options(options)
    }
}

/// Produces collaborators for one input's instructions.
pub trait CollaboratorFactory: Send + Sync {
    fn build(&self, instructions: Option<&str>) -> Result<Collaborators, ServiceError>;
}

/// Builds real network collaborators from settings.
pub struct SettingsFactory {
    settings: Settings,
    api_key: String,
}

impl SettingsFactory {
    pub fn new(settings: Settings, api_key: String) -> Self {
        Self { settings, api_key }
    }
}

impl CollaboratorFactory for SettingsFactory {
    fn build(&self, instructions: Option<&str>) -> Result<Collaborators, ServiceError> {
        Ok(Collaborators::from_settings(&self.settings, &self.api_key, instructions)?)
    }
}

/// Pipeline options for one input, from settings overlaid with its sidecar.
pub fn options_for(settings: &Settings, sidecar: &ProcessingConfig) -> PipelineOptions {
    PipelineOptions {
        max_cost: sidecar.max_cost,
        scrape_delay: sidecar.scrape_delay().unwrap_or_default(),
        limits: settings.limits.clone(),
        pricing: settings.pricing.clone(),
        ..Default::default()
    }
}

/// Clear every row's alt text ahead of a restart and save.
///
/// `confirm` sees the number of rows that would lose their text and is only
/// asked when there is any. Returns `None` when it declines.
pub fn restart_store<F>(store: &mut RowStore, confirm: F) -> Result<Option<usize>, ServiceError>
where
    F: FnOnce(usize) -> std::io::Result<bool>,
{
    let existing = store.processed_count();
    if existing > 0 && !confirm(existing)? {
        return Ok(None);
    }
    let cleared = store.clear_alt_text();
    store.save()?;
    info!("Restart: cleared alt text on {} row(s) of {}", cleared, store.path().display());
    Ok(Some(cleared))
}

/// How an interruptible run ended.
#[derive(Debug, Clone)]
pub enum RunEnd {
    Finished(RunSummary),
    Interrupted(RunSummary),
}

/// Run the pipeline until it completes or `interrupt` resolves.
///
/// An interrupted run drops the in-flight batch and saves every row resolved
/// so far. The result sink is closed either way.
pub async fn run_interruptible<F>(
    pipeline: &mut Pipeline,
    store: &mut RowStore,
    interrupt: F,
) -> Result<RunEnd, PipelineError>
where
    F: Future<Output = ()>,
{
    let outcome = tokio::select! {
        result = pipeline.run(store) => Some(result),
        _ = interrupt => None,
    };
    drop(pipeline.take_sink());

    match outcome {
        Some(result) => result.map(RunEnd::Finished),
        None => {
            store.save()?;
            let summary = pipeline.ledger().summary();
            info!(
                "Interrupted after {} of {} row(s); saved {}",
                summary.completed(),
                summary.total,
                store.path().display()
            );
            Ok(RunEnd::Interrupted(summary))
        }
    }
}

/// Result of processing one input table end to end.
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub input: PathBuf,
    pub summary: RunSummary,
    pub outputs: OutputPaths,
}

/// Process one table without prompting: honor the sidecar, run the
/// pipeline, and write the three outputs into `output_dir`.
pub async fn process_file(
    input: &Path,
    output_dir: &Path,
    settings: &Settings,
    factory: &dyn CollaboratorFactory,
    observer: Arc<dyn PipelineObserver>,
) -> Result<ProcessedFile, ServiceError> {
    let sidecar = ProcessingConfig::for_input(input)?;
    let mut store = RowStore::load(input)?;

    if sidecar.restart {
        restart_store(&mut store, |_| Ok(true))?;
    }

    let collaborators = factory.build(sidecar.instructions())?;
    let mut pipeline = collaborators
        .pipeline(options_for(settings, &sidecar))
        .with_observer(observer);
    let summary = pipeline.run(&mut store).await?;

    std::fs::create_dir_all(output_dir)?;
    let outputs = OutputPaths::for_input(input, output_dir);
    outputs.write_all(&store)?;

    Ok(ProcessedFile {
        input: input.to_path_buf(),
        summary,
        outputs,
    })
}
