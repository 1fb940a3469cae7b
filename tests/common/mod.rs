#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use altscribe::llm::{TokenUsage, VisionBatch, VisionError, VisionGenerator, VisionImage, VisionResult};
use altscribe::pipeline::canonical::file_name;
use altscribe::scrapers::{FetchError, FetchedImage, ImageFetcher, PageScraper, ScrapeError, ScrapedPage};
use altscribe::services::{CollaboratorFactory, Collaborators, ServiceError};
use altscribe::Pipeline;

/// Scraper that answers from memory and records every page it is asked for.
#[derive(Default)]
pub struct FakeScraper {
    pub calls: Mutex<Vec<String>>,
    pub forbidden: HashSet<String>,
    pub failing: HashSet<String>,
}

impl FakeScraper {
    pub fn forbidding(page: &str) -> Self {
        Self {
            forbidden: [page.to_string()].into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn failing(page: &str) -> Self {
        Self {
            failing: [page.to_string()].into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageScraper for FakeScraper {
    async fn scrape(&self, page_url: &str, image_urls: &[String]) -> Result<ScrapedPage, ScrapeError> {
        self.calls.lock().unwrap().push(page_url.to_string());
        if self.forbidden.contains(page_url) {
            return Err(ScrapeError::Forbidden {
                url: page_url.to_string(),
            });
        }
        if self.failing.contains(page_url) {
            return Err(ScrapeError::Http { status: 500 });
        }
        Ok(ScrapedPage {
            title: format!("Title of {}", page_url),
            heading: "Heading".to_string(),
            adjacent: image_urls
                .iter()
                .map(|url| (url.clone(), format!("Caption for {}", file_name(url))))
                .collect(),
        })
    }
}

/// Fetcher returning synthetic images; dimensions default to 800x600.
#[derive(Default)]
pub struct FakeFetcher {
    pub calls: Mutex<Vec<String>>,
    pub dimensions: HashMap<String, (u32, u32)>,
    pub failing: HashSet<String>,
}

impl FakeFetcher {
    pub fn with_dimensions(mut self, url: &str, width: u32, height: u32) -> Self {
        self.dimensions.insert(url.to_string(), (width, height));
        self
    }

    pub fn with_failure(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch(&self, image_url: &str) -> Result<FetchedImage, FetchError> {
        self.calls.lock().unwrap().push(image_url.to_string());
        if self.failing.contains(image_url) {
            return Err(FetchError::Http { status: 404 });
        }
        let (width, height) = self.dimensions.get(image_url).copied().unwrap_or((800, 600));
        Ok(FetchedImage {
            bytes: vec![0u8; 2048],
            media_type: "image/jpeg".to_string(),
            width,
            height,
        })
    }
}

/// Vision fake that records the image URLs of every call.
///
/// Results come back in reverse order so callers must match by URL.
#[derive(Default)]
pub struct RecordingVision {
    pub calls: Mutex<Vec<Vec<String>>>,
    pub fail_all: bool,
    pub missing: HashSet<String>,
    /// Calls from this index on never return.
    pub stall_from: Option<usize>,
}

impl RecordingVision {
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Default::default()
        }
    }

    pub fn stalling_from(call: usize) -> Self {
        Self {
            stall_from: Some(call),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.calls().iter().map(Vec::len).collect()
    }

    pub fn images_sent(&self) -> usize {
        self.batch_sizes().iter().sum()
    }
}

pub fn alt_for(url: &str) -> String {
    format!("Alt text for {}", file_name(url))
}

#[async_trait]
impl VisionGenerator for RecordingVision {
    async fn generate(&self, images: &[VisionImage]) -> Result<VisionBatch, VisionError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(images.iter().map(|i| i.image_url.clone()).collect());
            calls.len() - 1
        };
        if self.stall_from.is_some_and(|from| call >= from) {
            std::future::pending::<()>().await;
        }
        if self.fail_all {
            return Err(VisionError::Api {
                status: 500,
                body: "overloaded".to_string(),
            });
        }
        let results = images
            .iter()
            .rev()
            .filter(|i| !self.missing.contains(&i.image_url))
            .map(|i| VisionResult::success(&i.image_url, alt_for(&i.image_url)))
            .collect();
        Ok(VisionBatch {
            results,
            usage: TokenUsage {
                input_tokens: 1000 * images.len() as u64,
                output_tokens: 50 * images.len() as u64,
            },
        })
    }
}

/// The three fakes, shared so tests can inspect them after a run.
pub struct Fakes {
    pub scraper: Arc<FakeScraper>,
    pub fetcher: Arc<FakeFetcher>,
    pub vision: Arc<RecordingVision>,
}

impl Fakes {
    pub fn new(scraper: FakeScraper, fetcher: FakeFetcher, vision: RecordingVision) -> Self {
        Self {
            scraper: Arc::new(scraper),
            fetcher: Arc::new(fetcher),
            vision: Arc::new(vision),
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.scraper.clone(), self.fetcher.clone(), self.vision.clone())
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(self.scraper.clone(), self.fetcher.clone(), self.vision.clone())
    }
}

impl Default for Fakes {
    fn default() -> Self {
        Self::new(FakeScraper::default(), FakeFetcher::default(), RecordingVision::default())
    }
}

/// Factory handing out the same fakes for every job.
pub struct FakeFactory(pub Collaborators);

impl CollaboratorFactory for FakeFactory {
    fn build(&self, _instructions: Option<&str>) -> Result<Collaborators, ServiceError> {
        Ok(self.0.clone())
    }
}

/// Write a crawler export with `Source,Destination` rows.
pub fn write_table<P: AsRef<str>, I: AsRef<str>>(dir: &Path, name: &str, rows: &[(P, I)]) -> PathBuf {
    let mut content = String::from("Source,Destination\n");
    for (page, image) in rows {
        content.push_str(&format!("{},{}\n", page.as_ref(), image.as_ref()));
    }
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

pub fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}
