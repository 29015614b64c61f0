use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::utils::error::{AppError, Result};

/// Writes `data` as pretty JSON next to `path` and renames it into place, so
/// an interrupted write never leaves a truncated file behind.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let contents = serde_json::to_vec_pretty(data)?;
    write_bytes_atomic(path, &contents)
}

pub fn write_bytes_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut temp_file = NamedTempFile::new_in(parent)?;
    temp_file.write_all(contents)?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path)?;
    Ok(())
}

/// Reads a file to string, mapping a missing file to a configuration error
/// naming what was expected there.
pub fn read_required(path: &Path, what: &str) -> Result<String> {
    if !path.exists() {
        return Err(AppError::configuration(format!(
            "{} not found: {}",
            what,
            path.display()
        )));
    }
    Ok(std::fs::read_to_string(path)?)
}
