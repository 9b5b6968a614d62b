use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    scraped_ids: Vec<String>,
    #[serde(default)]
    last_updated: Option<String>,
}

/// Listing ids processed in earlier runs.
///
/// The in-memory set is authoritative for the rest of a run even when saving
/// it fails.
#[derive(Debug)]
pub struct CrawlHistory {
    path: PathBuf,
    ids: BTreeSet<String>,
}

impl CrawlHistory {
    /// A missing or unreadable file starts an empty history.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = match read_ids(&path) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "History unreadable, starting fresh");
                BTreeSet::new()
            }
        };

        Self { path, ids }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn mark_processed(&mut self, id: &str) {
        self.ids.insert(id.to_string());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Write the set with the current timestamp. Failures are logged only.
    pub fn persist(&self) {
        if let Err(e) = self.try_persist() {
            warn!(path = %self.path.display(), error = %e, "Failed to save history");
        }
    }

    pub fn try_persist(&self) -> Result<()> {
        let file = HistoryFile {
            scraped_ids: self.ids.iter().cloned().collect(),
            last_updated: Some(Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// Forget everything and save the empty state immediately.
    pub fn reset(&mut self) {
        let dropped = self.ids.len();
        self.ids.clear();
        self.persist();
        info!(dropped, "History cleared");
    }
}

fn read_ids(path: &Path) -> Result<BTreeSet<String>> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }

    let text = fs::read_to_string(path)?;
    let file: HistoryFile = serde_json::from_str(&text)?;
    Ok(file.scraped_ids.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let history = CrawlHistory::load(tmp.path().join("none.json"));
        assert!(history.is_empty());
    }

    #[test]
    fn corrupt_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("history.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(CrawlHistory::load(&path).is_empty());
    }

    #[test]
    fn marked_ids_survive_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("history.json");

        let mut history = CrawlHistory::load(&path);
        history.mark_processed("A100");
        history.mark_processed("B200");
        history.mark_processed("A100");
        assert!(history.contains("A100"));
        assert_eq!(history.len(), 2);
        history.persist();

        let reloaded = CrawlHistory::load(&path);
        assert!(reloaded.contains("A100"));
        assert!(reloaded.contains("B200"));
        assert_eq!(reloaded.len(), 2);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["scraped_ids"], serde_json::json!(["A100", "B200"]));
        assert!(raw["last_updated"].is_string());
    }

    #[test]
    fn reset_clears_memory_and_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("history.json");

        let mut history = CrawlHistory::load(&path);
        history.mark_processed("A100");
        history.persist();
        history.reset();

        assert!(!history.contains("A100"));
        assert!(!CrawlHistory::load(&path).contains("A100"));
    }

    #[test]
    fn failed_save_keeps_memory() {
        let tmp = tempfile::tempdir().unwrap();
        // a directory in place of the file makes the write fail
        let path = tmp.path().join("history.json");
        fs::create_dir(&path).unwrap();

        let mut history = CrawlHistory::load(&path);
        history.mark_processed("A100");
        assert!(history.try_persist().is_err());
        history.persist();
        assert!(history.contains("A100"));
    }
}
