//! One (page, image) observation and its processing outcome.

/// Stable position of a row in the store.
pub type RowId = usize;

/// A single image-on-page record.
///
/// Empty cells are represented as `None`. A row counts as processed once
/// `alt_text` holds anything non-empty, whether that is generated text or a
/// skip/error marker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub source_page_url: String,
    pub image_url: String,
    pub title: Option<String>,
    pub heading: Option<String>,
    pub adjacent_text: Option<String>,
    pub status_message: Option<String>,
    pub alt_text: Option<String>,
    /// File size in bytes as declared by the crawler export, if present.
    pub declared_size: Option<f64>,
    /// Scrape error for the row's page. Lives only for the current run.
    pub context_error: Option<String>,
}

impl Row {
    pub fn new(source_page_url: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            source_page_url: source_page_url.into(),
            image_url: image_url.into(),
            ..Default::default()
        }
    }

    /// Whether the row already occupies the resume slot.
    pub fn is_processed(&self) -> bool {
        self.alt_text
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }

    /// Whether page context was resolved for this row (in this run or a previous one).
    pub fn has_page_context(&self) -> bool {
        self.title.is_some()
    }

    pub fn title_or_empty(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    pub fn heading_or_empty(&self) -> &str {
        self.heading.as_deref().unwrap_or("")
    }

    pub fn adjacent_text_or_empty(&self) -> &str {
        self.adjacent_text.as_deref().unwrap_or("")
    }

    pub(crate) fn apply(&mut self, update: RowUpdate) {
        if let Some(title) = update.title {
            self.title = Some(title);
        }
        if let Some(heading) = update.heading {
            self.heading = Some(heading);
        }
        if let Some(adjacent_text) = update.adjacent_text {
            self.adjacent_text = Some(adjacent_text);
        }
        if let Some(message) = update.status_message {
            self.status_message = Some(message).filter(|m| !m.is_empty());
        }
        if let Some(alt_text) = update.alt_text {
            self.alt_text = Some(alt_text);
        }
        if let Some(error) = update.context_error {
            self.context_error = Some(error);
        }
    }
}

/// Partial update for a row; unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct RowUpdate {
    pub title: Option<String>,
    pub heading: Option<String>,
    pub adjacent_text: Option<String>,
    pub status_message: Option<String>,
    pub alt_text: Option<String>,
    pub context_error: Option<String>,
}

impl RowUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    pub fn adjacent_text(mut self, text: impl Into<String>) -> Self {
        self.adjacent_text = Some(text.into());
        self
    }

    pub fn status_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    /// Remove any note left by an earlier run.
    pub fn clear_status_message(mut self) -> Self {
        self.status_message = Some(String::new());
        self
    }

    pub fn alt_text(mut self, alt_text: impl Into<String>) -> Self {
        self.alt_text = Some(alt_text.into());
        self
    }

    pub fn context_error(mut self, error: impl Into<String>) -> Self {
        self.context_error = Some(error.into());
        self
    }
}
