//! Page context resolution.
//!
//! Each unique page still holding unprocessed rows is scraped at most once.
//! Pages whose first row already has a title are reused from the store.

use std::collections::HashSet;
use std::time::Duration;

use tracing::debug;

use super::events::{PageSource, PipelineEvent, PipelineObserver};
use super::PipelineError;
use crate::models::{PageContext, RowUpdate};
use crate::repository::RowStore;
use crate::scrapers::PageScraper;

/// Counts from one context pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    pub scraped: usize,
    pub reused: usize,
    pub failed: usize,
}

pub struct ContextResolver<'a> {
    scraper: &'a dyn PageScraper,
    observer: &'a dyn PipelineObserver,
    scrape_delay: Duration,
}

impl<'a> ContextResolver<'a> {
    pub fn new(scraper: &'a dyn PageScraper, observer: &'a dyn PipelineObserver) -> Self {
        Self {
            scraper,
            observer,
            scrape_delay: Duration::ZERO,
        }
    }

    /// Pause between consecutive page fetches.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.scrape_delay = delay;
        self
    }

    /// Resolve context for every pending page, saving after each scraped page.
    ///
    /// A forbidden response stops immediately; other scrape errors are stored
    /// on the page's rows and the pass continues.
    pub async fn resolve_all(&self, store: &mut RowStore) -> Result<ContextStats, PipelineError> {
        let pages = store.get_unique_pages();
        let total = pages.len();
        let mut stats = ContextStats::default();

        for (i, page_url) in pages.iter().enumerate() {
            let row_ids = store.get_rows_for_page(page_url);
            let Some(&first) = row_ids.first() else {
                continue;
            };

            let mut image_urls = Vec::new();
            let mut seen = HashSet::new();
            for &id in &row_ids {
                if let Some(row) = store.row(id) {
                    if seen.insert(row.image_url.clone()) {
                        image_urls.push(row.image_url.clone());
                    }
                }
            }

            let stored = store.row(first).filter(|row| row.has_page_context()).map(|row| PageContext {
                title: row.title_or_empty().to_string(),
                heading: row.heading_or_empty().to_string(),
                error: None,
            });

            if let Some(context) = stored {
                stats.reused += 1;
                self.observer.on_event(&PipelineEvent::PageResolved {
                    index: i + 1,
                    total,
                    page_url: page_url.clone(),
                    source: PageSource::Reused,
                    context,
                    images: image_urls.len(),
                });
                continue;
            }

            if stats.scraped + stats.failed > 0 && !self.scrape_delay.is_zero() {
                debug!("Waiting {:?} before next page", self.scrape_delay);
                tokio::time::sleep(self.scrape_delay).await;
            }

            let context = match self.scraper.scrape(page_url, &image_urls).await {
                Ok(page) => {
                    for &id in &row_ids {
                        let adjacent = store
                            .row(id)
                            .map(|row| page.adjacent_text(&row.image_url).to_string())
                            .unwrap_or_default();
                        store.update_row(
                            id,
                            RowUpdate::new()
                                .title(page.title.as_str())
                                .heading(page.heading.as_str())
                                .adjacent_text(adjacent),
                        )?;
                    }
                    stats.scraped += 1;
                    PageContext {
                        title: page.title,
                        heading: page.heading,
                        error: None,
                    }
                }
                Err(e) if e.is_forbidden() => {
                    return Err(PipelineError::Forbidden {
                        page_url: page_url.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    let error = e.to_string();
                    for &id in &row_ids {
                        let mut update = RowUpdate::new().context_error(error.as_str());
                        // Finished rows keep their status
                        if !store.row(id).is_some_and(|row| row.is_processed()) {
                            update =
                                update.status_message(format!("Error: scraping failed: {}", error));
                        }
                        store.update_row(id, update)?;
                    }
                    stats.failed += 1;
                    PageContext {
                        error: Some(error),
                        ..Default::default()
                    }
                }
            };

            store.save()?;
            self.observer.on_event(&PipelineEvent::PageResolved {
                index: i + 1,
                total,
                page_url: page_url.clone(),
                source: PageSource::Scraped,
                context,
                images: image_urls.len(),
            });
        }

        Ok(stats)
    }
}
