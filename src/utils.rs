//! Utility functions for the ranking pipeline

use crate::error::{RankerError, Result};
use chrono::{DateTime, Utc};
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Generate a new unique run ID
pub fn generate_run_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Write a file through a temporary sibling that is renamed into place
///
/// Readers observe either the previous file or the complete new one. If
/// writing fails or is abandoned, the temporary file is removed.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| RankerError::io(dir, e))?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| RankerError::io(dir, e))?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        write(&mut writer).map_err(|e| RankerError::io(path, e))?;
        writer.flush().map_err(|e| RankerError::io(path, e))?;
    }
    temp.persist(path)
        .map_err(|e| RankerError::io(path, e.error))?;
    Ok(())
}
