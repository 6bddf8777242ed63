//! In-memory tabular results exchanged between the reference dataset and
//! candidate routines.

use std::cmp::Ordering;
use std::fmt;

/// A single value in a tabular result.
///
/// Missing values (blank fields, failed numeric coercion, JSON `null`) collapse
/// into [`Cell::Missing`], and two missing cells compare equal.
#[derive(Debug, Clone)]
pub enum Cell {
    Text(String),
    Number(f64),
    Missing,
}

impl Cell {
    /// Build a numeric cell, mapping NaN to [`Cell::Missing`].
    pub fn number(value: f64) -> Self {
        if value.is_nan() {
            Cell::Missing
        } else {
            Cell::Number(value)
        }
    }

    /// Coerce a raw field to a number; anything unparsable becomes missing.
    pub fn coerce_numeric(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(value) => Cell::number(value),
            Err(_) => Cell::Missing,
        }
    }

    /// Interpret a raw text field, treating blank as missing.
    pub fn text(raw: &str) -> Self {
        if raw.is_empty() {
            Cell::Missing
        } else {
            Cell::Text(raw.to_string())
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Cell::Text(_) => 0,
            Cell::Number(_) => 1,
            Cell::Missing => 2,
        }
    }

    /// Total order used to put rows into canonical order.
    pub fn canonical_cmp(&self, other: &Cell) -> Ordering {
        match (self, other) {
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            (Cell::Number(a), Cell::Number(b)) => a.total_cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Field value for delimited output (missing renders empty).
    pub fn to_field(&self) -> String {
        match self {
            Cell::Text(value) => value.clone(),
            Cell::Number(value) => format_number(*value),
            Cell::Missing => String::new(),
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cell::Text(a), Cell::Text(b)) => a == b,
            (Cell::Number(a), Cell::Number(b)) => a == b,
            (Cell::Missing, Cell::Missing) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(value) => write!(f, "{value:?}"),
            Cell::Number(value) => f.write_str(&format_number(*value)),
            Cell::Missing => f.write_str("NaN"),
        }
    }
}

/// Render a float the way delimited statement files carry it: integral values
/// keep one decimal place (`150.0`), everything else uses the shortest
/// round-trip form.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Ordered rows over a fixed, ordered set of named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Copy of the first `n` rows.
    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Sort rows into canonical order so positional labels never matter.
    pub fn canonicalize(&mut self) {
        self.rows.sort_by(|a, b| compare_rows(a, b));
    }

    /// Line-oriented rendering used for diagnostics and diffs.
    pub fn render_lines(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.columns.join(" | "));
        out.push('\n');
        for row in &self.rows {
            let line = row
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" | ");
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

fn compare_rows(a: &[Cell], b: &[Cell]) -> Ordering {
    for (left, right) in a.iter().zip(b) {
        let ord = left.canonical_cmp(right);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}
