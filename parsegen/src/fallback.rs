//! Deterministic fallback routine used once the synthesis budget is spent.

const FALLBACK_PARSER: &str = include_str!("../templates/fallback_parser.py");

/// Signature of a fallback source provider. Must return the same text on
/// every call.
pub type FallbackSource = fn() -> &'static str;

/// Hand-written camelot extractor for five-column bank statements.
///
/// Locates the `Date`/`Description` header row, keeps the first five
/// columns, coerces the amount columns to floats and drops rows without a
/// `dd-mm-yyyy` date.
pub fn fallback_source() -> &'static str {
    FALLBACK_PARSER
}
