//! Synthesize, execute, validate and retry bank-statement parsers.
//!
//! A generation service writes a candidate parser; the candidate is loaded as
//! an untrusted unit, run against a sample statement and compared with a
//! reference CSV. Failures are fed back into the next attempt until the
//! attempt budget runs out, after which a deterministic fallback parser gets
//! one final test cycle.
//!
//! - **[`core`]**: Pure logic (tables, comparison, budget, state machine).
//! - **[`io`]**: Filesystem layout, child processes, generation service and
//!   candidate runtime.
//!
//! [`orchestrator`] ties them together; [`verify`] re-checks an accepted
//! routine.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod fallback;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod synthesis;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod verify;
