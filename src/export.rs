//! Output tables derived from a processed row table.
//!
//! Two deduplicated tables are produced: one keyed by image URL and one keyed
//! by bare filename. Rows whose alt text is a skip or error message never
//! reach either table.

use std::collections::{BTreeMap, HashSet};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::pipeline::canonical::file_name;
use crate::pipeline::ResultSink;
use crate::repository::RowStore;

/// Case-insensitive substrings that mark an alt text as a skip or failure.
pub const SKIP_VOCABULARY: &[&str] = &[
    "skip",
    "too small",
    "too large",
    "error",
    "download error",
    "icon",
    "thumbnail",
    "avatar",
];

pub const URL_TABLE_HEADERS: [&str; 2] = ["Image URL", "ALT Text"];
pub const FILENAME_TABLE_HEADERS: [&str; 2] = ["Image Filename", "ALT Text"];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Whether an alt text is real output rather than a skip or error message.
pub fn is_valid_alt_text(alt_text: &str) -> bool {
    let trimmed = alt_text.trim();
    if trimmed.is_empty() {
        return false;
    }
    let lower = trimmed.to_lowercase();
    !SKIP_VOCABULARY.iter().any(|word| lower.contains(word))
}

/// First valid alt text per key, ordered by key.
fn collect_by<F>(store: &RowStore, key: F) -> BTreeMap<String, String>
where
    F: Fn(&str) -> String,
{
    let mut table = BTreeMap::new();
    for row in store.rows() {
        let Some(alt_text) = row.alt_text.as_deref() else {
            continue;
        };
        if !is_valid_alt_text(alt_text) {
            continue;
        }
        table
            .entry(key(&row.image_url))
            .or_insert_with(|| alt_text.trim().to_string());
    }
    table
}

fn write_table(path: &Path, headers: [&str; 2], table: &BTreeMap<String, String>) -> Result<usize, ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(headers)?;
    for (key, alt_text) in table {
        writer.write_record([key.as_str(), alt_text.as_str()])?;
    }
    writer.flush()?;
    debug!("Wrote {} row(s) to {}", table.len(), path.display());
    Ok(table.len())
}

/// Write the `Image URL, ALT Text` table. Returns the number of rows written.
pub fn write_url_table(store: &RowStore, path: &Path) -> Result<usize, ExportError> {
    let table = collect_by(store, |url| url.to_string());
    write_table(path, URL_TABLE_HEADERS, &table)
}

/// Write the `Image Filename, ALT Text` table. Returns the number of rows written.
pub fn write_filename_table(store: &RowStore, path: &Path) -> Result<usize, ExportError> {
    let table = collect_by(store, |url| file_name(url).to_string());
    write_table(path, FILENAME_TABLE_HEADERS, &table)
}

/// Output file locations for one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub updated: PathBuf,
    pub simplified: PathBuf,
    pub filenames: PathBuf,
}

impl OutputPaths {
    /// `<stem>-original-updated.csv`, `<stem>-simplified.csv` and
    /// `<stem>-filenames-only.csv` inside `dir`.
    pub fn for_input(input: &Path, dir: &Path) -> Self {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        Self {
            updated: dir.join(format!("{}-original-updated.csv", stem)),
            simplified: dir.join(format!("{}-simplified.csv", stem)),
            filenames: dir.join(format!("{}-filenames-only.csv", stem)),
        }
    }

    /// Write all three outputs.
    pub fn write_all(&self, store: &RowStore) -> Result<(), OutputError> {
        store.save_as(&self.updated)?;
        write_url_table(store, &self.simplified)?;
        write_filename_table(store, &self.filenames)?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error(transparent)]
    Store(#[from] crate::repository::StoreError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Companion filename table for a simplified output: `out.csv` → `out-filenames.csv`.
pub fn filenames_path_for(simplified: &Path) -> PathBuf {
    let stem = simplified
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    simplified.with_file_name(format!("{}-filenames.csv", stem))
}

/// Appends each generated alt text to a simplified table as it arrives.
///
/// Existing rows in the file are kept and their URLs are not written again,
/// so a resumed run extends the same backup.
pub struct SimplifiedCsvWriter {
    writer: csv::Writer<File>,
    seen: HashSet<String>,
    path: PathBuf,
}

impl SimplifiedCsvWriter {
    pub fn create(path: &Path) -> Result<Self, ExportError> {
        let mut seen = HashSet::new();
        let existing = path.exists() && std::fs::metadata(path)?.len() > 0;
        if existing {
            let mut reader = csv::Reader::from_path(path)?;
            for record in reader.records() {
                let record = record?;
                if let Some(url) = record.get(0) {
                    seen.insert(url.to_string());
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if !existing {
            writer.write_record(URL_TABLE_HEADERS)?;
            writer.flush()?;
        }

        Ok(Self {
            writer,
            seen,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        self.seen.len()
    }
}

impl ResultSink for SimplifiedCsvWriter {
    fn write(&mut self, image_url: &str, alt_text: &str) -> Result<(), ExportError> {
        if !is_valid_alt_text(alt_text) || !self.seen.insert(image_url.to_string()) {
            return Ok(());
        }
        self.writer.write_record([image_url, alt_text.trim()])?;
        self.writer.flush()?;
        Ok(())
    }
}
