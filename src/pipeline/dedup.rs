//! Run-scoped result caches keyed by exact URL and by base filename.

use std::collections::HashMap;

use crate::models::Outcome;

/// Result of consulting the caches for a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Same URL already resolved.
    Exact(Outcome),
    /// Another resolution of the same upload already resolved.
    Variant(Outcome),
    Miss,
}

#[derive(Debug, Default)]
pub struct DedupCache {
    by_url: HashMap<String, Outcome>,
    by_base: HashMap<String, Outcome>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, image_url: &str, base: &str) -> Lookup {
        if let Some(outcome) = self.by_url.get(image_url) {
            return Lookup::Exact(outcome.clone());
        }
        match self.by_base.get(base) {
            Some(outcome) => Lookup::Variant(outcome.clone()),
            None => Lookup::Miss,
        }
    }

    /// Record under the exact URL only. Used for admission rejections, which
    /// say nothing about other resolutions of the same upload.
    pub fn record_url(&mut self, image_url: &str, outcome: Outcome) {
        self.by_url.insert(image_url.to_string(), outcome);
    }

    /// Record a vision result under both keys.
    pub fn record(&mut self, image_url: &str, base: &str, outcome: Outcome) {
        self.by_base.insert(base.to_string(), outcome.clone());
        self.by_url.insert(image_url.to_string(), outcome);
    }

}
