//! Persistence of accepted routines and validated output.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::core::table::Table;
use crate::io::reference::table_to_csv;

/// Write the accepted routine to its stable, target-keyed location,
/// replacing any previous version.
pub fn persist_routine(path: &Path, source: &str) -> Result<()> {
    write_atomic(path, source.as_bytes())?;
    info!(path = %path.display(), "routine persisted");
    Ok(())
}

/// Write the validated table in the reference's delimited format.
pub fn persist_output(path: &Path, table: &Table) -> Result<()> {
    let payload = table_to_csv(table)?;
    write_atomic(path, &payload)?;
    info!(path = %path.display(), rows = table.len(), "output persisted");
    Ok(())
}

/// Atomically replace `path` with `contents`.
///
/// Each call stages into its own uniquely named sibling, so concurrent
/// writers of the same path never share a staging file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?;
    let mut prefix = std::ffi::OsString::from(".");
    prefix.push(file_name);
    prefix.push(".");
    let mut staged = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    staged
        .write_all(contents)
        .with_context(|| format!("write temp file {}", staged.path().display()))?;
    staged
        .persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
