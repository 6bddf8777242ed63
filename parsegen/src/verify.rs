//! `parsegen verify`: re-run an accepted routine against the reference.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, instrument};

use crate::core::types::{Mismatch, Target};
use crate::io::config::AgentConfig;
use crate::io::loader::DynamicLoader;
use crate::io::paths::TargetPaths;
use crate::io::reference::load_reference;
use crate::orchestrator::evaluate;

/// Result of checking a persisted routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Match { rows: usize },
    Mismatch(Mismatch),
}

/// Load the persisted routine for `target` and compare its output with the
/// reference dataset. Nothing is written besides scratch files.
#[instrument(skip_all, fields(target = %target))]
pub fn verify_routine(root: &Path, target: &Target, config: &AgentConfig) -> Result<VerifyOutcome> {
    let paths = TargetPaths::new(root, target, &config.runtime.unit_extension);
    if !paths.routine_path.is_file() {
        bail!(
            "no persisted routine at {} (run `parsegen run --target {target}` first)",
            paths.routine_path.display()
        );
    }
    let reference = load_reference(&paths.reference_path, &config.reference.numeric_columns)?;
    let source = fs::read_to_string(&paths.routine_path)
        .with_context(|| format!("read {}", paths.routine_path.display()))?;
    let loader = DynamicLoader::new(&paths.scratch_dir, config.runtime.clone());

    let outcome = match evaluate(
        &loader,
        &source,
        target,
        &paths.input_path,
        &reference,
        config.compare_limits(),
    ) {
        Ok(table) => VerifyOutcome::Match { rows: table.len() },
        Err(mismatch) => VerifyOutcome::Mismatch(mismatch),
    };
    info!(matched = matches!(outcome, VerifyOutcome::Match { .. }), "verify finished");
    Ok(outcome)
}
