//! Image admission rules.
//!
//! Cheap checks on the row run before any download; dimension checks run on
//! the downloaded image. Every rejection becomes a permanent [`Outcome`].

use serde::{Deserialize, Serialize};

use crate::models::{Outcome, Row};
use crate::scrapers::FetchedImage;

const MIB: f64 = 1024.0 * 1024.0;

/// How an exclusion pattern is matched against the lowercased image URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    Suffix,
    Contains,
}

/// A known-bad URL pattern and the message recorded for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlExclusion {
    pub pattern: String,
    pub rule: MatchRule,
    pub message: String,
}

impl UrlExclusion {
    pub fn suffix(pattern: &str, message: &str) -> Self {
        Self {
            pattern: pattern.to_lowercase(),
            rule: MatchRule::Suffix,
            message: message.to_string(),
        }
    }

    pub fn contains(pattern: &str, message: &str) -> Self {
        Self {
            pattern: pattern.to_lowercase(),
            rule: MatchRule::Contains,
            message: message.to_string(),
        }
    }

    fn matches(&self, url_lower: &str) -> bool {
        match self.rule {
            MatchRule::Suffix => url_lower.ends_with(&self.pattern),
            MatchRule::Contains => url_lower.contains(&self.pattern),
        }
    }
}

/// Size limits and URL exclusions for admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionLimits {
    /// Byte ceiling for declared and downloaded sizes.
    pub max_bytes: u64,
    /// Longest side above this is rejected as too large.
    pub max_dimension: u32,
    /// Longest side above this forces a solo batch.
    pub large_dimension: u32,
    /// Either side below this is rejected as an icon or thumbnail.
    pub min_dimension: u32,
    pub exclusions: Vec<UrlExclusion>,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
            max_dimension: 8000,
            large_dimension: 2000,
            min_dimension: 100,
            exclusions: vec![
                UrlExclusion::suffix(".svg", "Skipped: SVG icon"),
                UrlExclusion::contains("googleusercontent", "Skipped: avatar (googleusercontent)"),
            ],
        }
    }
}

/// Batching class of an admitted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    Normal,
    /// Flushed on its own, never batched with other images.
    Large,
}

fn too_large_bytes(bytes: f64) -> Outcome {
    Outcome::Skipped(format!("Image too large: {:.2}MB (max 5MB)", bytes / MIB))
}

/// Checks that need no network access: URL exclusions, declared size and
/// a scrape error carried over from the row's page.
pub fn precheck(row: &Row, limits: &AdmissionLimits) -> Option<Outcome> {
    let url_lower = row.image_url.to_lowercase();
    let path_lower = url_lower.split(['?', '#']).next().unwrap_or(&url_lower);
    if let Some(exclusion) = limits
        .exclusions
        .iter()
        .find(|e| e.matches(path_lower) || e.matches(&url_lower))
    {
        return Some(Outcome::Skipped(exclusion.message.clone()));
    }

    if let Some(size) = row.declared_size {
        if size > limits.max_bytes as f64 {
            return Some(too_large_bytes(size));
        }
    }

    if let Some(error) = &row.context_error {
        return Some(Outcome::Failed(format!("Error: scraping failed: {}", error)));
    }

    None
}

/// Checks on the downloaded image: byte count, then pixel dimensions.
pub fn inspect(image: &FetchedImage, limits: &AdmissionLimits) -> Result<SizeClass, Outcome> {
    if image.byte_len() > limits.max_bytes {
        return Err(too_large_bytes(image.byte_len() as f64));
    }

    if image.longest_side() > limits.max_dimension {
        return Err(Outcome::Skipped(format!(
            "Image too large: {}x{}px (max {}x{})",
            image.width, image.height, limits.max_dimension, limits.max_dimension
        )));
    }

    if image.shortest_side() < limits.min_dimension {
        return Err(Outcome::Skipped(format!(
            "Skipped: icon/thumbnail ({}x{}px, minimum {}x{})",
            image.width, image.height, limits.min_dimension, limits.min_dimension
        )));
    }

    if image.longest_side() > limits.large_dimension {
        Ok(SizeClass::Large)
    } else {
        Ok(SizeClass::Normal)
    }
}
