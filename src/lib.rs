//! Batch alt text generation for crawled image inventories.
//!
//! A crawler export lists every (page, image) pair of a site. altscribe
//! gathers page context, filters out images that cannot or should not be
//! described, collapses duplicates and resized variants, and asks a vision
//! model for alt text in bounded batches. Progress is written back to the
//! table as it goes, so an interrupted run resumes where it stopped.

pub mod config;
pub mod export;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod repository;
pub mod scrapers;
pub mod services;
pub mod watch;

pub use config::{ProcessingConfig, Settings};
pub use pipeline::{Pipeline, PipelineError, PipelineOptions, RunSummary};
pub use repository::RowStore;
