//! Mutable record threaded through one run of the loop.

use std::path::PathBuf;

use crate::core::budget::AttemptBudget;
use crate::core::types::{Mismatch, Target};

/// Session state owned exclusively by the orchestrator.
#[derive(Debug, Clone)]
pub struct Session {
    pub target: Target,
    pub input_path: PathBuf,
    pub reference_path: PathBuf,
    /// Natural-language plan, when planning ran and succeeded.
    pub plan: Option<String>,
    /// Source text of the candidate currently under test.
    pub candidate: String,
    /// Diagnostic from the previous failed cycle, fed into the next prompt.
    pub last_failure: Option<Mismatch>,
    pub budget: AttemptBudget,
}

impl Session {
    pub fn new(
        target: Target,
        input_path: PathBuf,
        reference_path: PathBuf,
        attempts: u32,
    ) -> Self {
        Self {
            target,
            input_path,
            reference_path,
            plan: None,
            candidate: String::new(),
            last_failure: None,
            budget: AttemptBudget::new(attempts),
        }
    }

    /// Prior candidate and its failure, present only on a retry cycle.
    pub fn feedback(&self) -> Option<(&str, &Mismatch)> {
        let failure = self.last_failure.as_ref()?;
        Some((self.candidate.as_str(), failure))
    }
}
