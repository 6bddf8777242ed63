//! Dynamic loading of untrusted candidate routines.
//!
//! A candidate is materialized as a uniquely named unit in the scratch
//! directory, run through the configured runtime command, and its entry
//! point's result read back as a [`Table`]. Every failure on the way (write,
//! spawn, load, missing entry point, runtime fault, timeout, malformed
//! output) surfaces as [`AgentError::ExecutionFailed`]. Materialized files are
//! temp files owned by this call and are removed when it returns, on every
//! path.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};

use crate::core::table::{Cell, Table};
use crate::core::types::Target;
use crate::error::AgentError;
use crate::io::config::RuntimeConfig;
use crate::io::process::run_command_with_timeout;

const HARNESS: &str = include_str!("harness/load_unit.py");
const STDERR_TAIL_BYTES: usize = 2_000;

/// Runs candidate source text against an input document.
#[derive(Debug, Clone)]
pub struct DynamicLoader {
    scratch_dir: PathBuf,
    runtime: RuntimeConfig,
}

impl DynamicLoader {
    pub fn new(scratch_dir: impl Into<PathBuf>, runtime: RuntimeConfig) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            runtime,
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Materialize `source`, invoke its entry point with `input`, and return
    /// the resulting table.
    #[instrument(skip_all, fields(target = %target, input = %input.display()))]
    pub fn run(&self, source: &str, target: &Target, input: &Path) -> Result<Table, AgentError> {
        self.load_and_invoke(source, target, input).map_err(|err| {
            let detail = format!("{err:#}");
            warn!(detail = %detail, "candidate execution failed");
            AgentError::ExecutionFailed(detail)
        })
    }

    fn load_and_invoke(&self, source: &str, target: &Target, input: &Path) -> Result<Table> {
        fs::create_dir_all(&self.scratch_dir)
            .with_context(|| format!("create scratch dir {}", self.scratch_dir.display()))?;

        let prefix = format!("{target}_");
        let unit = materialize(
            &self.scratch_dir,
            &prefix,
            &format!(".{}", self.runtime.unit_extension),
            source.as_bytes(),
        )
        .context("materialize unit")?;
        let harness = if self.uses_placeholder("{harness}") {
            Some(
                materialize(&self.scratch_dir, &prefix, "_harness.py", HARNESS.as_bytes())
                    .context("materialize harness")?,
            )
        } else {
            None
        };
        let output = materialize(&self.scratch_dir, &prefix, "_out.json", b"")
            .context("allocate output file")?;
        debug!(unit = %unit.path().display(), "unit materialized");

        let cmd = self.build_command(
            unit.path(),
            harness.as_ref().map(NamedTempFile::path),
            input,
            output.path(),
        )?;
        let timeout = Duration::from_secs(self.runtime.timeout_secs);
        let result = run_command_with_timeout(cmd, None, timeout, self.runtime.output_limit_bytes)
            .context("run candidate")?;

        if result.timed_out || !result.status.success() {
            let stderr = result.stderr_tail(STDERR_TAIL_BYTES);
            if stderr.is_empty() {
                bail!("candidate runtime {}", result.describe_exit(timeout));
            }
            bail!(
                "candidate runtime {}:\n{}",
                result.describe_exit(timeout),
                stderr
            );
        }

        let raw = fs::read_to_string(output.path()).context("read candidate output")?;
        let table = parse_frame_json(&raw)?;
        debug!(
            columns = table.columns.len(),
            rows = table.len(),
            "candidate produced table"
        );
        Ok(table)
    }

    fn uses_placeholder(&self, placeholder: &str) -> bool {
        self.runtime
            .command
            .iter()
            .any(|arg| arg.contains(placeholder))
    }

    fn build_command(
        &self,
        unit: &Path,
        harness: Option<&Path>,
        input: &Path,
        output: &Path,
    ) -> Result<Command> {
        let harness = harness.map(|p| p.display().to_string()).unwrap_or_default();
        let unit = unit.display().to_string();
        let input = input.display().to_string();
        let output = output.display().to_string();
        let args: Vec<String> = self
            .runtime
            .command
            .iter()
            .map(|arg| {
                arg.replace("{harness}", &harness)
                    .replace("{unit}", &unit)
                    .replace("{entry}", &self.runtime.entry_point)
                    .replace("{input}", &input)
                    .replace("{output}", &output)
            })
            .collect();
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| anyhow!("runtime.command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(rest).env("PYTHONDONTWRITEBYTECODE", "1");
        Ok(cmd)
    }
}

/// Create a uniquely named file `<prefix><random><suffix>` in `dir`.
///
/// The returned handle deletes the file when dropped.
pub fn materialize(dir: &Path, prefix: &str, suffix: &str, contents: &[u8]) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .rand_bytes(10)
        .tempfile_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    file.write_all(contents).context("write temp file")?;
    file.flush().context("flush temp file")?;
    Ok(file)
}

#[derive(Debug, Deserialize)]
struct SplitFrame {
    columns: Vec<Value>,
    data: Vec<Vec<Value>>,
}

/// Parse a frame serialized as `{"columns": [...], "data": [[...], ...]}`.
pub fn parse_frame_json(raw: &str) -> Result<Table> {
    if raw.trim().is_empty() {
        bail!("entry point produced no output");
    }
    let frame: SplitFrame = serde_json::from_str(raw).context("parse candidate output json")?;
    let columns: Vec<String> = frame
        .columns
        .into_iter()
        .map(|value| match value {
            Value::String(name) => name,
            other => other.to_string(),
        })
        .collect();

    let mut table = Table::new(columns);
    for (idx, row) in frame.data.into_iter().enumerate() {
        if row.len() != table.columns.len() {
            bail!(
                "row {idx} has {} values for {} columns",
                row.len(),
                table.columns.len()
            );
        }
        table.rows.push(row.into_iter().map(json_cell).collect());
    }
    Ok(table)
}

fn json_cell(value: Value) -> Cell {
    match value {
        Value::Null => Cell::Missing,
        Value::String(text) => Cell::Text(text),
        Value::Number(number) => number.as_f64().map_or(Cell::Missing, Cell::number),
        Value::Bool(flag) => Cell::Text(if flag { "True" } else { "False" }.to_string()),
        other => Cell::Text(other.to_string()),
    }
}
