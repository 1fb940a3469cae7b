//! Open-batch bookkeeping.
//!
//! Holds admitted images until the batch is full, tracks the base filenames
//! it contains, and keeps the variants deferred against it.

use std::collections::HashSet;

use crate::llm::VisionImage;
use crate::models::RowId;
use crate::scrapers::FetchedImage;

/// Images per vision call.
pub const DEFAULT_BATCH_CAPACITY: usize = 8;

/// An admitted row waiting for its vision call.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub row_id: RowId,
    pub image_url: String,
    pub base: String,
    pub image: FetchedImage,
    pub title: String,
    pub heading: String,
    pub adjacent_text: String,
}

impl BatchEntry {
    pub fn to_vision_image(&self) -> VisionImage {
        VisionImage {
            image_url: self.image_url.clone(),
            bytes: self.image.bytes.clone(),
            media_type: self.image.media_type.clone(),
            title: self.title.clone(),
            heading: self.heading.clone(),
            adjacent_text: self.adjacent_text.clone(),
        }
    }
}

/// A row whose image is already queued, unresolved, in the open batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVariant {
    pub row_id: RowId,
    pub image_url: String,
    pub base: String,
}

/// A closed batch ready to flush.
#[derive(Debug, Default)]
pub struct Batch {
    pub entries: Vec<BatchEntry>,
    pub variants: Vec<PendingVariant>,
}

impl Batch {
    pub fn solo(entry: BatchEntry) -> Self {
        Self {
            entries: vec![entry],
            variants: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug)]
pub struct BatchScheduler {
    capacity: usize,
    open: Batch,
    bases: HashSet<String>,
}

impl BatchScheduler {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            open: Batch::default(),
            bases: HashSet::new(),
        }
    }

    /// Whether an image with this base filename is queued in the open batch.
    pub fn contains_base(&self, base: &str) -> bool {
        self.bases.contains(base)
    }

    pub fn defer(&mut self, variant: PendingVariant) {
        self.open.variants.push(variant);
    }

    /// Queue an entry. Returns true once the batch is at capacity.
    pub fn push(&mut self, entry: BatchEntry) -> bool {
        self.bases.insert(entry.base.clone());
        self.open.entries.push(entry);
        self.open.len() >= self.capacity
    }

    /// Close the open batch and start a new one.
    pub fn take(&mut self) -> Batch {
        self.bases.clear();
        std::mem::take(&mut self.open)
    }
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_CAPACITY)
    }
}
