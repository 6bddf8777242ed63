//! Stable exit codes for parsegen CLI commands.

/// Command succeeded; for `run`, a routine was accepted and persisted.
pub const OK: i32 = 0;
/// Invalid config, layout, target or usage, or any unexpected I/O failure.
pub const INVALID: i32 = 1;
/// The reference dataset is missing or unreadable.
pub const REFERENCE_UNAVAILABLE: i32 = 2;
/// Synthesis never converged and the fallback routine did not match either.
pub const FALLBACK_FAILED: i32 = 3;
/// `parsegen verify` found the persisted routine no longer matches.
pub const MISMATCH: i32 = 4;
