//! Shared deterministic types for the synthesize-execute-validate loop.
//!
//! These types define stable contracts between core components. They do not
//! depend on external state or I/O.

use std::fmt;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Identifier naming a data source (e.g. a bank statement format).
///
/// Restricted to `[A-Za-z0-9._-]` so it can be embedded in file and unit names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target(String);

impl Target {
    pub fn parse(id: &str) -> Result<Self> {
        if id.is_empty() {
            return Err(anyhow!("target must not be empty"));
        }
        if id
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
        {
            return Err(anyhow!("target must be [A-Za-z0-9._-] only (got '{id}')"));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Target {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Target::parse(&value)
    }
}

impl From<Target> for String {
    fn from(value: Target) -> Self {
        value.0
    }
}

/// Where the candidate under test came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateOrigin {
    Synthesized,
    Fallback,
}

impl CandidateOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            CandidateOrigin::Synthesized => "synthesized",
            CandidateOrigin::Fallback => "fallback",
        }
    }
}

/// Category of a failed test cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// The generation service could not produce a candidate.
    Synthesis,
    /// The candidate source was empty after stripping formatting.
    EmptyCode,
    /// The candidate could not be loaded or its entry point failed.
    Execution,
    /// Column names, order, or count differ from the reference.
    ColumnSequence,
    /// Columns match but values differ.
    Value,
}

impl MismatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MismatchKind::Synthesis => "synthesis",
            MismatchKind::EmptyCode => "empty_code",
            MismatchKind::Execution => "execution",
            MismatchKind::ColumnSequence => "column_sequence",
            MismatchKind::Value => "value",
        }
    }
}

/// A categorized failure with bounded diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub kind: MismatchKind,
    pub detail: String,
}

impl Mismatch {
    /// Build a mismatch, truncating `detail` to at most `limit_bytes`.
    pub fn bounded(kind: MismatchKind, detail: impl Into<String>, limit_bytes: usize) -> Self {
        Self {
            kind,
            detail: truncate_detail(detail.into(), limit_bytes),
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mismatch: {}", self.kind.as_str(), self.detail)
    }
}

/// Result of validating a candidate against the reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Match,
    Mismatch(Mismatch),
}

fn truncate_detail(mut detail: String, limit_bytes: usize) -> String {
    if detail.len() <= limit_bytes {
        return detail;
    }
    let dropped = detail.len() - limit_bytes;
    let mut cut = limit_bytes;
    while !detail.is_char_boundary(cut) {
        cut -= 1;
    }
    detail.truncate(cut);
    detail.push_str(&format!("\n[truncated {dropped} bytes]"));
    detail
}
