//! CSV-backed row store.
//!
//! The store is the single source of truth for what remains to be done. Every
//! column of the source export is carried through untouched; the output
//! columns owned by this crate are appended with empty defaults when missing.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::models::{Row, RowId, RowUpdate};

/// Page URL column of a crawler export.
pub const SOURCE_COLUMN: &str = "Source";
/// Image URL column of a crawler export.
pub const DESTINATION_COLUMN: &str = "Destination";
pub const TITLE_COLUMN: &str = "title tag";
pub const HEADING_COLUMN: &str = "H1 tag";
pub const ADJACENT_TEXT_COLUMN: &str = "adjacent text";
pub const MESSAGE_COLUMN: &str = "message";
pub const ALT_TEXT_COLUMN: &str = "ALT text";

/// Accepted spellings of the declared byte size column, in priority order.
pub const SIZE_COLUMN_ALIASES: &[&str] = &["Size (Bytes)", "Size (bytes)", "Size", "File Size", "size"];

const REQUIRED_COLUMNS: &[&str] = &[SOURCE_COLUMN, DESTINATION_COLUMN];
const OUTPUT_COLUMNS: &[&str] = &[
    TITLE_COLUMN,
    HEADING_COLUMN,
    ADJACENT_TEXT_COLUMN,
    MESSAGE_COLUMN,
    ALT_TEXT_COLUMN,
];

/// Errors from loading or saving the row table.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Row table not found: {0}")]
    NotFound(PathBuf),

    #[error("Row table missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("Unknown row: {0}")]
    UnknownRow(RowId),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to persist row table: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Resolved column positions, computed once at load time.
#[derive(Debug, Clone)]
struct ColumnMap {
    source: usize,
    destination: usize,
    title: usize,
    heading: usize,
    adjacent_text: usize,
    message: usize,
    alt_text: usize,
    size: Option<usize>,
}

impl ColumnMap {
    fn position(headers: &[String], name: &str) -> Option<usize> {
        headers.iter().position(|h| h == name)
    }

    /// Resolve positions, appending missing output columns to `headers`.
    fn resolve(headers: &mut Vec<String>) -> Result<Self, StoreError> {
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|name| Self::position(headers, name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::MissingColumns(missing));
        }

        for name in OUTPUT_COLUMNS {
            if Self::position(headers, name).is_none() {
                headers.push(name.to_string());
            }
        }

        let size = SIZE_COLUMN_ALIASES
            .iter()
            .find_map(|alias| Self::position(headers, alias));

        // Every lookup below is guaranteed by the checks above
        let at = |name: &str| Self::position(headers, name).unwrap_or_default();

        Ok(Self {
            source: at(SOURCE_COLUMN),
            destination: at(DESTINATION_COLUMN),
            title: at(TITLE_COLUMN),
            heading: at(HEADING_COLUMN),
            adjacent_text: at(ADJACENT_TEXT_COLUMN),
            message: at(MESSAGE_COLUMN),
            alt_text: at(ALT_TEXT_COLUMN),
            size,
        })
    }
}

fn non_empty(cell: &str) -> Option<String> {
    if cell.is_empty() {
        None
    } else {
        Some(cell.to_string())
    }
}

fn parse_size(cell: &str) -> Option<f64> {
    let cleaned = cell.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Tabular store of every (page, image) row.
#[derive(Debug)]
pub struct RowStore {
    path: PathBuf,
    headers: Vec<String>,
    columns: ColumnMap,
    /// Original cells per row, padded to the header width.
    records: Vec<Vec<String>>,
    rows: Vec<Row>,
}

impl RowStore {
    /// Load a row table, adding any missing output columns.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(true)
            .from_path(path)?;

        let mut headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();
        let columns = ColumnMap::resolve(&mut headers)?;

        let mut records = Vec::new();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut cells: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            cells.resize(headers.len(), String::new());

            rows.push(Row {
                source_page_url: cells[columns.source].clone(),
                image_url: cells[columns.destination].clone(),
                title: non_empty(&cells[columns.title]),
                heading: non_empty(&cells[columns.heading]),
                adjacent_text: non_empty(&cells[columns.adjacent_text]),
                status_message: non_empty(&cells[columns.message]),
                alt_text: non_empty(&cells[columns.alt_text]),
                declared_size: columns.size.and_then(|i| parse_size(&cells[i])),
                context_error: None,
            });
            records.push(cells);
        }

        debug!("Loaded {} rows from {}", rows.len(), path.display());

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            columns,
            records,
            rows,
        })
    }

    /// Path the store saves to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.get(id)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Rows whose alt text is still empty, in input order.
    pub fn get_unprocessed_rows(&self) -> Vec<RowId> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !row.is_processed())
            .map(|(id, _)| id)
            .collect()
    }

    /// Number of rows already holding alt text (or a skip/error marker).
    pub fn processed_count(&self) -> usize {
        self.rows.iter().filter(|row| row.is_processed()).count()
    }

    /// Source pages that still have unprocessed rows, in order of first appearance.
    pub fn get_unique_pages(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|row| !row.is_processed())
            .filter(|row| seen.insert(row.source_page_url.as_str()))
            .map(|row| row.source_page_url.clone())
            .collect()
    }

    /// Every row of a page, processed or not.
    pub fn get_rows_for_page(&self, page_url: &str) -> Vec<RowId> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.source_page_url == page_url)
            .map(|(id, _)| id)
            .collect()
    }

    /// Apply a partial update to one row in memory.
    pub fn update_row(&mut self, id: RowId, update: RowUpdate) -> Result<(), StoreError> {
        let row = self.rows.get_mut(id).ok_or(StoreError::UnknownRow(id))?;
        row.apply(update);
        Ok(())
    }

    /// Clear every alt text value. Page context columns are kept.
    /// Returns how many rows had a value.
    pub fn clear_alt_text(&mut self) -> usize {
        let mut cleared = 0;
        for row in &mut self.rows {
            if row.is_processed() {
                cleared += 1;
            }
            row.alt_text = None;
        }
        cleared
    }

    /// Durably write the whole table back to its source path.
    ///
    /// Writes a sibling temp file and renames it over the target so an
    /// interrupted save never leaves a truncated table behind.
    pub fn save(&self) -> Result<(), StoreError> {
        self.write_atomic(&self.path)
    }

    /// Write the whole table to another path.
    pub fn save_as(&self, path: &Path) -> Result<(), StoreError> {
        self.write_atomic(path)
    }

    fn write_atomic(&self, path: &Path) -> Result<(), StoreError> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = NamedTempFile::new_in(dir)?;
        self.write_to(&mut tmp)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)?;

        debug!("Saved {} rows to {}", self.rows.len(), path.display());
        Ok(())
    }

    fn write_to<W: Write>(&self, out: W) -> Result<(), StoreError> {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(&self.headers)?;

        let c = &self.columns;
        for (row, cells) in self.rows.iter().zip(&self.records) {
            let mut cells = cells.clone();
            cells[c.title] = row.title.clone().unwrap_or_default();
            cells[c.heading] = row.heading.clone().unwrap_or_default();
            cells[c.adjacent_text] = row.adjacent_text.clone().unwrap_or_default();
            cells[c.message] = row.status_message.clone().unwrap_or_default();
            cells[c.alt_text] = row.alt_text.clone().unwrap_or_default();
            writer.write_record(&cells)?;
        }

        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_csv(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_rejects_missing_identity_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "bad.csv", "Source,Alt\nhttps://a.test/,x\n");

        match RowStore::load(&path) {
            Err(StoreError::MissingColumns(cols)) => assert_eq!(cols, vec!["Destination"]),
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = RowStore::load(&dir.path().join("nope.csv"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_load_adds_output_columns_and_keeps_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "in.csv",
            "Source,Destination,ALT text,Status Code\n\
             https://a.test/,https://a.test/1.jpg,Existing alt,200\n\
             https://a.test/,https://a.test/2.jpg,,200\n",
        );

        let store = RowStore::load(&path).unwrap();
        assert_eq!(
            store.headers(),
            &[
                "Source",
                "Destination",
                "ALT text",
                "Status Code",
                "title tag",
                "H1 tag",
                "adjacent text",
                "message"
            ]
        );
        assert_eq!(store.row(0).unwrap().alt_text.as_deref(), Some("Existing alt"));
        assert_eq!(store.get_unprocessed_rows(), vec![1]);
    }

    #[test]
    fn test_size_alias_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "in.csv",
            "Source,Destination,File Size\n\
             https://a.test/,https://a.test/1.jpg,\"6,000,000\"\n\
             https://a.test/,https://a.test/2.jpg,n/a\n",
        );

        let store = RowStore::load(&path).unwrap();
        assert_eq!(store.row(0).unwrap().declared_size, Some(6_000_000.0));
        assert_eq!(store.row(1).unwrap().declared_size, None);
    }

    #[test]
    fn test_unique_pages_in_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "in.csv",
            "Source,Destination,ALT text\n\
             https://b.test/,https://b.test/1.jpg,\n\
             https://a.test/,https://a.test/1.jpg,\n\
             https://b.test/,https://b.test/2.jpg,\n\
             https://c.test/,https://c.test/1.jpg,done\n",
        );

        let store = RowStore::load(&path).unwrap();
        assert_eq!(store.get_unique_pages(), vec!["https://b.test/", "https://a.test/"]);
        assert_eq!(store.get_rows_for_page("https://b.test/"), vec![0, 2]);
    }

    #[test]
    fn test_save_round_trip_preserves_passthrough_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "in.csv",
            "Source,Destination,Status Code\nhttps://a.test/,https://a.test/1.jpg,200\n",
        );

        let mut store = RowStore::load(&path).unwrap();
        store
            .update_row(0, RowUpdate::new().title("Home, sweet home").alt_text("A \"red\" barn"))
            .unwrap();
        store.save().unwrap();

        let reloaded = RowStore::load(&path).unwrap();
        let row = reloaded.row(0).unwrap();
        assert_eq!(row.title.as_deref(), Some("Home, sweet home"));
        assert_eq!(row.alt_text.as_deref(), Some("A \"red\" barn"));
        assert!(row.heading.is_none());

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("Source,Destination,Status Code,title tag"));
        assert!(raw.contains(",200,"));
    }

    #[test]
    fn test_update_unknown_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "in.csv", "Source,Destination\n");
        let mut store = RowStore::load(&path).unwrap();
        assert!(matches!(
            store.update_row(3, RowUpdate::new()),
            Err(StoreError::UnknownRow(3))
        ));
    }

    #[test]
    fn test_clear_alt_text_keeps_page_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "in.csv",
            "Source,Destination,title tag,ALT text\n\
             https://a.test/,https://a.test/1.jpg,Home,A barn\n\
             https://a.test/,https://a.test/2.jpg,Home,\n",
        );

        let mut store = RowStore::load(&path).unwrap();
        assert_eq!(store.clear_alt_text(), 1);
        assert_eq!(store.get_unprocessed_rows(), vec![0, 1]);
        assert_eq!(store.row(0).unwrap().title.as_deref(), Some("Home"));
    }
}
