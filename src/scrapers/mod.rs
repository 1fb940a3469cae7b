//! Network collaborators: page context scraping and image download.
//!
//! The pipeline only sees the [`PageScraper`] and [`ImageFetcher`] traits;
//! the HTTP implementations here share one [`HttpClient`] so that pacing
//! against a host covers both pages and images.

mod http_client;
mod image;
mod page;
mod rate_limiter;
pub mod retry;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

pub use http_client::{resolve_user_agent, HttpClient, HttpResponse};
pub use self::image::{FetchedImage, HttpImageFetcher};
pub use page::HtmlPageScraper;
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::{RetryPolicy, Retryable};

/// Context extracted from one source page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedPage {
    pub title: String,
    pub heading: String,
    /// Adjacent text keyed by the image URL passed in.
    pub adjacent: HashMap<String, String>,
}

impl ScrapedPage {
    pub fn adjacent_text(&self, image_url: &str) -> &str {
        self.adjacent.get(image_url).map(|s| s.as_str()).unwrap_or("")
    }
}

/// Errors from the page scraping collaborator.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Access permanently denied. Aborts the whole run.
    #[error("403 Forbidden error for {url}")]
    Forbidden { url: String },

    #[error("HTTP error: {status}")]
    Http { status: u16 },

    #[error("Timeout error")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Scraping error: {0}")]
    Parse(String),
}

impl ScrapeError {
    pub fn is_forbidden(&self) -> bool {
        matches!(self, ScrapeError::Forbidden { .. })
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScrapeError::Timeout
        } else if let Some(status) = err.status() {
            ScrapeError::Http {
                status: status.as_u16(),
            }
        } else {
            ScrapeError::Connection(err.to_string())
        }
    }
}

impl Retryable for ScrapeError {
    fn is_retryable(&self) -> bool {
        match self {
            ScrapeError::Forbidden { .. } | ScrapeError::Parse(_) => false,
            ScrapeError::Http { status } => *status == 429 || *status >= 500,
            ScrapeError::Timeout | ScrapeError::Connection(_) => true,
        }
    }
}

/// Errors from the image download collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {status}")]
    Http { status: u16 },

    #[error("request failed: {0}")]
    Request(String),

    #[error("could not decode image: {0}")]
    Decode(String),
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Http { status } => *status == 429 || *status >= 500,
            FetchError::Request(_) => true,
            FetchError::Decode(_) => false,
        }
    }
}

/// Fetches title, heading and per-image adjacent text for a page.
#[async_trait]
pub trait PageScraper: Send + Sync {
    async fn scrape(&self, page_url: &str, image_urls: &[String]) -> Result<ScrapedPage, ScrapeError>;
}

/// Downloads an image and reports its size and pixel dimensions.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, image_url: &str) -> Result<FetchedImage, FetchError>;
}
