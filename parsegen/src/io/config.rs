//! Agent configuration stored under `.parsegen/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::compare::CompareLimits;

/// Agent configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values used
/// for bank-statement targets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Synthesis attempts before switching to the fallback routine.
    pub attempts: u32,

    /// Ask the generation service for a plan before the first attempt.
    pub plan: bool,

    /// Reference rows included in prompts as a worked example.
    pub example_rows: usize,

    /// Unified-diff lines kept in a value mismatch diagnostic.
    pub diff_max_lines: usize,

    /// Upper bound on any mismatch diagnostic fed back into prompts.
    pub diagnostic_limit_bytes: usize,

    /// Maximum bytes for a rendered prompt before dropping sections.
    pub prompt_budget_bytes: usize,

    pub generator: GeneratorConfig,
    pub runtime: RuntimeConfig,
    pub reference: ReferenceConfig,
}

/// External generation service invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command argv; the prompt arrives on stdin and `{output}` is replaced
    /// with the path the response must be written to.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: [
                "codex",
                "exec",
                "--sandbox",
                "read-only",
                "--skip-git-repo-check",
                "--output-last-message",
                "{output}",
                "-",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

/// Candidate runtime invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Command argv with `{harness}`, `{unit}`, `{entry}`, `{input}` and
    /// `{output}` placeholders.
    pub command: Vec<String>,
    /// Name of the single entry point every candidate must expose.
    pub entry_point: String,
    /// File extension for materialized and persisted routines.
    pub unit_extension: String,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command: [
                "python3",
                "{harness}",
                "{unit}",
                "{entry}",
                "{input}",
                "{output}",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            entry_point: "parse".to_string(),
            unit_extension: "py".to_string(),
            timeout_secs: 5 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

/// Reference dataset schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReferenceConfig {
    /// Columns coerced to floating point; bad values become missing.
    pub numeric_columns: Vec<String>,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            numeric_columns: vec![
                "Debit Amt".to_string(),
                "Credit Amt".to_string(),
                "Balance".to_string(),
            ],
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            plan: true,
            example_rows: 5,
            diff_max_lines: 40,
            diagnostic_limit_bytes: 4_000,
            prompt_budget_bytes: 40_000,
            generator: GeneratorConfig::default(),
            runtime: RuntimeConfig::default(),
            reference: ReferenceConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.diff_max_lines == 0 {
            return Err(anyhow!("diff_max_lines must be > 0"));
        }
        if self.diagnostic_limit_bytes == 0 {
            return Err(anyhow!("diagnostic_limit_bytes must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.generator.command.is_empty() || self.generator.command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        if self.generator.timeout_secs == 0 || self.runtime.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be > 0"));
        }
        if self.generator.output_limit_bytes == 0 || self.runtime.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.runtime.command.is_empty() || self.runtime.command[0].trim().is_empty() {
            return Err(anyhow!("runtime.command must be a non-empty array"));
        }
        if !self.runtime.command.iter().any(|arg| arg.contains("{unit}")) {
            return Err(anyhow!("runtime.command must reference {{unit}}"));
        }
        if self.runtime.entry_point.trim().is_empty() {
            return Err(anyhow!("runtime.entry_point must not be empty"));
        }
        if self.runtime.unit_extension.is_empty()
            || !self
                .runtime
                .unit_extension
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(anyhow!("runtime.unit_extension must be alphanumeric"));
        }
        Ok(())
    }

    pub fn compare_limits(&self) -> CompareLimits {
        CompareLimits {
            diff_max_lines: self.diff_max_lines,
            detail_limit_bytes: self.diagnostic_limit_bytes,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    crate::io::persist::write_atomic(path, buf.as_bytes())
}
