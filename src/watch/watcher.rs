//! Directory observer that reports new input tables.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use notify::event::{CreateKind, EventKind, ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Suffixes of files this tool writes, never treated as inputs.
const OUTPUT_SUFFIXES: &[&str] = &["-original-updated", "-simplified", "-filenames-only", "-filenames"];

/// Whether `path` looks like an input table: a visible `.csv` that is not one
/// of our own outputs.
pub fn is_input_table(path: &Path) -> bool {
    let is_csv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    is_csv && !stem.starts_with('.') && !OUTPUT_SUFFIXES.iter().any(|suffix| stem.ends_with(suffix))
}

/// Paths of newly created or moved-in tables carried by an event.
fn input_paths(event: &Event) -> Vec<PathBuf> {
    let candidates: &[PathBuf] = match event.kind {
        EventKind::Create(CreateKind::Any | CreateKind::File) => &event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => &event.paths,
        // Both paths: the destination is last
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            return event
                .paths
                .last()
                .filter(|p| is_input_table(p))
                .cloned()
                .into_iter()
                .collect();
        }
        _ => return Vec::new(),
    };
    candidates.iter().filter(|p| is_input_table(p)).cloned().collect()
}

/// Input tables already present in `dir`, sorted by name.
pub fn scan_existing(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_input_table(&path) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Keeps the OS watcher alive and yields input paths as they appear.
pub struct FolderWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<PathBuf>,
    seen: HashSet<PathBuf>,
}

impl FolderWatcher {
    /// Watch `dir` (non-recursively).
    pub fn start(dir: &Path) -> notify::Result<Self> {
        let (tx, rx) = mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for path in input_paths(&event) {
                    if let Err(e) = tx.blocking_send(path) {
                        error!("Failed to forward file event: {}", e);
                    }
                }
            }
            Err(e) => warn!("Watch error: {:?}", e),
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        debug!("Watching {} for new tables", dir.display());

        Ok(Self {
            _watcher: watcher,
            rx,
            seen: HashSet::new(),
        })
    }

    /// Next new input path. Each path is reported once.
    pub async fn next(&mut self) -> Option<PathBuf> {
        while let Some(path) = self.rx.recv().await {
            if self.seen.insert(path.clone()) {
                return Some(path);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_input_table() {
        assert!(is_input_table(Path::new("/w/site.csv")));
        assert!(is_input_table(Path::new("/w/SITE.CSV")));
        assert!(!is_input_table(Path::new("/w/site.yaml")));
        assert!(!is_input_table(Path::new("/w/.site.csv")));
        assert!(!is_input_table(Path::new("/w/site-simplified.csv")));
        assert!(!is_input_table(Path::new("/w/site-filenames-only.csv")));
        assert!(!is_input_table(Path::new("/w/site-original-updated.csv")));
    }

    #[test]
    fn test_input_paths_from_events() {
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/w/a.csv"));
        assert_eq!(input_paths(&create), vec![PathBuf::from("/w/a.csv")]);

        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/tmp/a.csv"))
            .add_path(PathBuf::from("/w/b.csv"));
        assert_eq!(input_paths(&rename), vec![PathBuf::from("/w/b.csv")]);

        let data = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(PathBuf::from("/w/a.csv"));
        assert!(input_paths(&data).is_empty());
    }

    #[test]
    fn test_scan_existing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.csv"), "").unwrap();
        std::fs::write(dir.path().join("a.csv"), "").unwrap();
        std::fs::write(dir.path().join("a.yaml"), "").unwrap();
        std::fs::write(dir.path().join("a-simplified.csv"), "").unwrap();

        let found = scan_existing(dir.path()).unwrap();
        assert_eq!(found, vec![dir.path().join("a.csv"), dir.path().join("b.csv")]);
    }
}
