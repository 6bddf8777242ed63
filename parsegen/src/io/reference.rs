//! Reference dataset loading and delimited rendering of tables.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::table::{Cell, Table};
use crate::error::AgentError;

/// Load the ground-truth table from a delimited file.
///
/// Columns named in `numeric_columns` are coerced to numbers, with values that
/// fail coercion mapped to missing. Every other column keeps its text, blank
/// fields becoming missing.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_reference(path: &Path, numeric_columns: &[String]) -> Result<Table, AgentError> {
    let unavailable = |detail: String| AgentError::ReferenceUnavailable {
        path: path.to_path_buf(),
        detail,
    };
    if !path.is_file() {
        return Err(unavailable("file does not exist".to_string()));
    }
    let bytes = fs::read(path).map_err(|err| unavailable(err.to_string()))?;
    let table = parse_delimited(&bytes, numeric_columns).map_err(|err| unavailable(format!("{err:#}")))?;
    debug!(
        columns = table.columns.len(),
        rows = table.len(),
        "reference loaded"
    );
    Ok(table)
}

fn parse_delimited(bytes: &[u8], numeric_columns: &[String]) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);
    let headers = reader.headers().context("read header row")?.clone();
    let columns: Vec<String> = headers.iter().map(ToString::to_string).collect();
    if columns.is_empty() || columns.iter().all(|c| c.trim().is_empty()) {
        return Err(anyhow!("missing header row"));
    }
    for numeric in numeric_columns {
        if !columns.contains(numeric) {
            return Err(anyhow!("numeric column {numeric:?} not in header {columns:?}"));
        }
    }
    let numeric_mask: Vec<bool> = columns
        .iter()
        .map(|c| numeric_columns.contains(c))
        .collect();

    let mut table = Table::new(columns);
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("read row {}", idx + 1))?;
        let row = record
            .iter()
            .zip(&numeric_mask)
            .map(|(field, numeric)| {
                if *numeric {
                    Cell::coerce_numeric(field)
                } else {
                    Cell::text(field)
                }
            })
            .collect();
        table.rows.push(row);
    }
    Ok(table)
}

/// Render a table in the same delimited format as the reference dataset.
pub fn table_to_csv(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&table.columns)
        .context("write header row")?;
    for (idx, row) in table.rows.iter().enumerate() {
        writer
            .write_record(row.iter().map(Cell::to_field))
            .with_context(|| format!("write row {}", idx + 1))?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow!("flush csv: {}", err.error()))
}
