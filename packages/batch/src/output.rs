//! CSV output for stage results.
//!
//! Results are written to a sibling `.partial` file first and renamed into
//! place once complete, so a crashed run never leaves a truncated CSV
//! under the final name.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::BatchError;

/// Writes `rows` to `path` as CSV with a header row derived from the
/// serialized field names.
///
/// `columns` is the header written when `rows` is empty, so a stage that
/// skipped everything still leaves a readable file. It must match the
/// serialized field names of `T`.
///
/// Parent directories are created as needed.
///
/// # Errors
///
/// Returns [`BatchError`] if the file cannot be created, a row fails to
/// serialize, or the final rename fails.
pub fn write_csv<T: Serialize>(
    path: &Path,
    columns: &[&str],
    rows: &[T],
) -> Result<(), BatchError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let partial = partial_path(path);
    {
        let mut writer = csv::Writer::from_path(&partial)?;
        if rows.is_empty() {
            writer.write_record(columns)?;
        }
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    std::fs::rename(&partial, path)?;

    log::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}
