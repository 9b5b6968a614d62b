use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::info;

use crate::crawler::models::ListingRecord;
use crate::error::Result;

const BOM: &str = "\u{feff}";

/// The persisted listing table, kept as CSV and JSON with identical rows.
///
/// Only the fixed listing columns survive a rewrite. Columns in an existing CSV
/// that the record doesn't know are dropped the next time rows are merged.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    csv_path: PathBuf,
    json_path: PathBuf,
}

impl DatasetStore {
    pub fn new(csv_path: impl Into<PathBuf>, json_path: impl Into<PathBuf>) -> Self {
        Self { csv_path: csv_path.into(), json_path: json_path.into() }
    }

    /// Rows from the existing CSV file, or nothing if there isn't one.
    pub fn load(&self) -> Result<Vec<ListingRecord>> {
        if !self.csv_path.exists() {
            return Ok(Vec::new());
        }
        read_csv(&self.csv_path)
    }

    /// Upsert `new_rows` into the persisted dataset and return its final size.
    ///
    /// With no new rows the files are left as they are.
    pub fn merge_and_persist(&self, new_rows: &[ListingRecord]) -> Result<usize> {
        if new_rows.is_empty() {
            return Ok(self.load()?.len());
        }

        let mut combined = self.load()?;
        let existing = combined.len();
        combined.extend_from_slice(new_rows);

        let merged = dedup_keep_last(combined);
        self.write(&merged)?;

        info!(
            existing,
            added = new_rows.len(),
            total = merged.len(),
            "Dataset written"
        );
        Ok(merged.len())
    }

    /// Both files are staged next to their targets before either is replaced.
    fn write(&self, rows: &[ListingRecord]) -> Result<()> {
        let csv = stage(&self.csv_path, |out| write_csv(out, rows))?;
        let json = stage(&self.json_path, |out| write_json(out, rows))?;

        csv.persist(&self.csv_path).map_err(|e| e.error)?;
        json.persist(&self.json_path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Collapse rows sharing an id onto the last one, keeping the order of survivors.
pub fn dedup_keep_last(rows: Vec<ListingRecord>) -> Vec<ListingRecord> {
    let mut last: HashMap<String, usize> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        last.insert(row.id.clone(), idx);
    }

    rows.into_iter()
        .enumerate()
        .filter(|(idx, row)| last.get(&row.id) == Some(idx))
        .map(|(_, row)| row)
        .collect()
}

fn read_csv(path: &Path) -> Result<Vec<ListingRecord>> {
    let text = fs::read_to_string(path)?;
    let text = text.strip_prefix(BOM).unwrap_or(&text);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;
        let cells: HashMap<&str, &str> = headers.iter().zip(record.iter()).collect();
        rows.push(ListingRecord::from_columns(&cells));
    }

    Ok(rows)
}

fn stage(
    path: &Path,
    fill: impl FnOnce(&mut fs::File) -> Result<()>,
) -> Result<NamedTempFile> {
    ensure_parent(path)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    fill(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

fn write_csv(out: &mut fs::File, rows: &[ListingRecord]) -> Result<()> {
    out.write_all(BOM.as_bytes())?;

    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(ListingRecord::columns())?;
    for row in rows {
        writer.write_record(row.to_row())?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json(out: &mut fs::File, rows: &[ListingRecord]) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, rows)?;
    out.flush()?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
