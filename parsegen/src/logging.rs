//! Development-time tracing.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. It is separate from
//! the run narration printed to stdout and from the attempt logs written
//! under `.parsegen/attempts/`, which are always produced.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=parsegen=debug parsegen run --target icici
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
