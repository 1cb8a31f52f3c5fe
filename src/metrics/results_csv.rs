//! Incremental `test_results*.csv` aggregation shared between processes.

use std::fs::{self, OpenOptions};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::metrics::SubjectStats;
use crate::store::{LockGuard, RetryPolicy, StoreError};

/// Appends one row, writing the header first when the file is new or empty.
/// Writers serialize on `<path>.lock`; a held lock is retried.
pub fn append_row(path: &Path, row: &SubjectStats, retry: &RetryPolicy) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    retry.run(path, || {
        let _lock = LockGuard::acquire(path)?;
        let io = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io)?;
        let empty = file.metadata().map_err(io)?.len() == 0;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(empty)
            .from_writer(file);
        writer
            .serialize(row)
            .map_err(|e| StoreError::Backend(format!("{}: {}", path.display(), e)))?;
        writer.flush().map_err(io)
    })?;
    debug!(subject = %row.id, path = %path.display(), "results row appended");
    Ok(())
}

/// Reads every row back. A missing file yields no rows.
pub fn read_rows(path: &Path) -> Result<Vec<SubjectStats>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: SubjectStats =
            record.with_context(|| format!("malformed row in {}", path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}
