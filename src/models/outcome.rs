//! Per-image and per-page results.

/// Terminal result for one image.
///
/// Skips and failures carry the message that is written to the row; both
/// occupy the alt text slot so the row is not retried on resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Alt text produced by the vision model.
    Generated(String),
    /// Rejected by an admission rule.
    Skipped(String),
    /// Scrape, download or generation failure.
    Failed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Generated(_))
    }

    /// Text stored in the row's alt text column.
    pub fn text(&self) -> &str {
        match self {
            Outcome::Generated(text) | Outcome::Skipped(text) | Outcome::Failed(text) => text,
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            Outcome::Generated(_) => Disposition::Processed,
            Outcome::Skipped(_) => Disposition::Skipped,
            Outcome::Failed(_) => Disposition::Failed,
        }
    }
}

/// How a resolved row is counted by the progress ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Processed,
    Skipped,
    Failed,
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Disposition::Processed => write!(f, "processed"),
            Disposition::Skipped => write!(f, "skipped"),
            Disposition::Failed => write!(f, "failed"),
        }
    }
}

/// Page-level context shared by every row of a source page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContext {
    pub title: String,
    pub heading: String,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_follows_variant() {
        assert_eq!(Outcome::Generated("x".into()).disposition(), Disposition::Processed);
        assert_eq!(Outcome::Skipped("x".into()).disposition(), Disposition::Skipped);
        assert_eq!(Outcome::Failed("x".into()).disposition(), Disposition::Failed);
        assert!(!Outcome::Skipped("Skipped: SVG icon".into()).is_success());
        assert_eq!(Outcome::Failed("Error: boom".into()).text(), "Error: boom");
    }
}
