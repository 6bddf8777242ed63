//! Validation of a generated table against the reference table.
//!
//! Pure: no persistence happens here, the orchestrator owns side effects.

use similar::TextDiff;

use crate::core::table::Table;
use crate::core::types::{Comparison, Mismatch, MismatchKind};

/// Bounds applied to comparator diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct CompareLimits {
    /// Maximum number of unified-diff lines kept in a value mismatch.
    pub diff_max_lines: usize,
    /// Maximum bytes of diagnostic text.
    pub detail_limit_bytes: usize,
}

impl Default for CompareLimits {
    fn default() -> Self {
        Self {
            diff_max_lines: 40,
            detail_limit_bytes: 4_000,
        }
    }
}

/// Compare `generated` against `reference`, ignoring row order.
///
/// Column sequences are checked first; values are only compared when the
/// sequences are identical.
pub fn compare_tables(generated: &Table, reference: &Table, limits: CompareLimits) -> Comparison {
    if generated.columns != reference.columns {
        let detail = format!(
            "column sequence differs\nexpected:  {:?}\ngenerated: {:?}",
            reference.columns, generated.columns
        );
        return Comparison::Mismatch(Mismatch::bounded(
            MismatchKind::ColumnSequence,
            detail,
            limits.detail_limit_bytes,
        ));
    }

    let mut generated = generated.clone();
    let mut reference = reference.clone();
    generated.canonicalize();
    reference.canonicalize();

    if generated.rows == reference.rows {
        return Comparison::Match;
    }

    let detail = format!(
        "values differ (expected {} rows, generated {} rows)\n{}",
        reference.len(),
        generated.len(),
        bounded_diff(
            &reference.render_lines(),
            &generated.render_lines(),
            limits.diff_max_lines
        )
    );
    Comparison::Mismatch(Mismatch::bounded(
        MismatchKind::Value,
        detail,
        limits.detail_limit_bytes,
    ))
}

/// Unified diff of two renderings, cut to `max_lines` lines.
pub fn bounded_diff(expected: &str, generated: &str, max_lines: usize) -> String {
    let diff = TextDiff::from_lines(expected, generated);
    let rendered = diff
        .unified_diff()
        .context_radius(3)
        .header("expected", "generated")
        .to_string();

    let lines: Vec<&str> = rendered.lines().collect();
    if lines.len() <= max_lines {
        return rendered;
    }
    let mut out = lines[..max_lines].join("\n");
    out.push_str(&format!(
        "\n[diff truncated: {} more lines]",
        lines.len() - max_lines
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::table::Cell;

    fn statement_columns() -> Vec<String> {
        ["Date", "Description", "Debit Amt", "Credit Amt", "Balance"]
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn row(date: &str, desc: &str, debit: Cell, credit: Cell, balance: f64) -> Vec<Cell> {
        vec![
            Cell::text(date),
            Cell::text(desc),
            debit,
            credit,
            Cell::Number(balance),
        ]
    }

    fn reference() -> Table {
        Table::with_rows(
            statement_columns(),
            vec![
                row(
                    "02-01-2024",
                    "Coffee shop",
                    Cell::Number(150.0),
                    Cell::Missing,
                    4850.0,
                ),
                row(
                    "03-01-2024",
                    "Salary",
                    Cell::Missing,
                    Cell::Number(1000.0),
                    5850.0,
                ),
            ],
        )
    }

    #[test]
    fn identical_tables_match_regardless_of_row_order() {
        let reference = reference();
        let mut generated = reference.clone();
        generated.rows.reverse();

        let outcome = compare_tables(&generated, &reference, CompareLimits::default());
        assert_eq!(outcome, Comparison::Match);
    }

    #[test]
    fn wrong_shape_reports_both_sequences() {
        let generated = Table::with_rows(
            vec![
                "Date".to_string(),
                "Description".to_string(),
                "Amount".to_string(),
            ],
            vec![vec![
                Cell::text("02-01-2024"),
                Cell::text("Coffee shop"),
                Cell::Number(150.0),
            ]],
        );

        let Comparison::Mismatch(mismatch) =
            compare_tables(&generated, &reference(), CompareLimits::default())
        else {
            panic!("expected mismatch");
        };
        assert_eq!(mismatch.kind, MismatchKind::ColumnSequence);
        assert!(mismatch.detail.contains(
            r#"["Date", "Description", "Debit Amt", "Credit Amt", "Balance"]"#
        ));
        assert!(mismatch.detail.contains(r#"["Date", "Description", "Amount"]"#));
    }

    #[test]
    fn reordered_columns_are_a_sequence_mismatch_even_with_bad_values() {
        let reference = reference();
        let mut columns = statement_columns();
        columns.swap(2, 3);
        let generated = Table::with_rows(columns, Vec::new());

        let Comparison::Mismatch(mismatch) =
            compare_tables(&generated, &reference, CompareLimits::default())
        else {
            panic!("expected mismatch");
        };
        assert_eq!(mismatch.kind, MismatchKind::ColumnSequence);
        assert!(!mismatch.detail.contains("values differ"));
    }

    #[test]
    fn value_mismatch_carries_unified_diff() {
        let reference = reference();
        let mut generated = reference.clone();
        generated.rows[0][2] = Cell::Text("150.0".to_string());

        let Comparison::Mismatch(mismatch) =
            compare_tables(&generated, &reference, CompareLimits::default())
        else {
            panic!("expected mismatch");
        };
        assert_eq!(mismatch.kind, MismatchKind::Value);
        assert!(mismatch.detail.contains("--- expected"));
        assert!(mismatch.detail.contains("+++ generated"));
        assert!(mismatch.detail.contains(r#"+"02-01-2024" | "Coffee shop" | "150.0""#));
    }

    #[test]
    fn value_diff_is_bounded_in_lines() {
        let columns = vec!["n".to_string()];
        let reference = Table::with_rows(
            columns.clone(),
            (0..100).map(|i| vec![Cell::Number(f64::from(i))]).collect(),
        );
        let generated = Table::with_rows(
            columns,
            (0..100)
                .map(|i| vec![Cell::Number(f64::from(i) + 0.5)])
                .collect(),
        );

        let Comparison::Mismatch(mismatch) = compare_tables(
            &generated,
            &reference,
            CompareLimits {
                diff_max_lines: 40,
                detail_limit_bytes: 100_000,
            },
        ) else {
            panic!("expected mismatch");
        };
        assert!(mismatch.detail.contains("[diff truncated:"));
        // summary line + 40 diff lines + truncation marker
        assert_eq!(mismatch.detail.lines().count(), 42);
    }
}
