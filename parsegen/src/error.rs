//! Error taxonomy for a run.
//!
//! Recoverable kinds are converted into retry feedback by the orchestrator;
//! only `ReferenceUnavailable` and `FallbackFailed` reach the user as terminal
//! failures.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::{Mismatch, MismatchKind};

#[derive(Debug, Error)]
pub enum AgentError {
    /// The ground-truth dataset is missing or unreadable. Fatal.
    #[error("reference unavailable at {}: {detail}", path.display())]
    ReferenceUnavailable { path: PathBuf, detail: String },

    /// The generation service failed. Counts as one failed attempt.
    #[error("synthesis unavailable: {0}")]
    SynthesisUnavailable(String),

    /// The candidate could not be materialized, loaded or run.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The candidate ran but its output did not match the reference.
    #[error("{0}")]
    ComparisonMismatch(Mismatch),

    /// The deterministic fallback routine did not match. Terminal.
    #[error("fallback failed: {0}")]
    FallbackFailed(Mismatch),
}

impl AgentError {
    /// Whether the orchestrator should turn this error into retry feedback.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AgentError::SynthesisUnavailable(_)
                | AgentError::ExecutionFailed(_)
                | AgentError::ComparisonMismatch(_)
        )
    }

    /// Retry feedback for a recoverable error, bounded to `limit_bytes`.
    ///
    /// Terminal kinds yield `None` and must be propagated instead.
    pub fn feedback(&self, limit_bytes: usize) -> Option<Mismatch> {
        if !self.is_recoverable() {
            return None;
        }
        let mismatch = match self {
            AgentError::SynthesisUnavailable(_) => {
                Mismatch::bounded(MismatchKind::Synthesis, self.to_string(), limit_bytes)
            }
            AgentError::ExecutionFailed(detail) => {
                Mismatch::bounded(MismatchKind::Execution, detail.as_str(), limit_bytes)
            }
            AgentError::ComparisonMismatch(mismatch) => mismatch.clone(),
            AgentError::ReferenceUnavailable { .. } | AgentError::FallbackFailed(_) => return None,
        };
        Some(mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_kinds() {
        assert!(AgentError::ExecutionFailed("x".into()).is_recoverable());
        assert!(AgentError::SynthesisUnavailable("x".into()).is_recoverable());
        assert!(
            !AgentError::ReferenceUnavailable {
                path: PathBuf::from("a.csv"),
                detail: "missing".into(),
            }
            .is_recoverable()
        );
        let mismatch = Mismatch {
            kind: MismatchKind::Value,
            detail: "diff".into(),
        };
        assert!(!AgentError::FallbackFailed(mismatch).is_recoverable());
    }

    #[test]
    fn recoverable_kinds_become_feedback() {
        let execution = AgentError::ExecutionFailed("KeyError: Balance".into())
            .feedback(4_000)
            .expect("feedback");
        assert_eq!(execution.kind, MismatchKind::Execution);
        assert_eq!(execution.detail, "KeyError: Balance");

        let synthesis = AgentError::SynthesisUnavailable("exit 1".into())
            .feedback(4_000)
            .expect("feedback");
        assert_eq!(synthesis.kind, MismatchKind::Synthesis);
        assert_eq!(synthesis.detail, "synthesis unavailable: exit 1");

        let value = Mismatch {
            kind: MismatchKind::Value,
            detail: "diff".into(),
        };
        assert_eq!(
            AgentError::ComparisonMismatch(value.clone()).feedback(4_000),
            Some(value)
        );
    }

    #[test]
    fn terminal_kinds_yield_no_feedback() {
        let reference = AgentError::ReferenceUnavailable {
            path: PathBuf::from("a.csv"),
            detail: "missing".into(),
        };
        assert_eq!(reference.feedback(4_000), None);
        let fallback = AgentError::FallbackFailed(Mismatch {
            kind: MismatchKind::Value,
            detail: "diff".into(),
        });
        assert_eq!(fallback.feedback(4_000), None);
    }

    #[test]
    fn feedback_detail_is_bounded() {
        let long = "x".repeat(100);
        let mismatch = AgentError::ExecutionFailed(long)
            .feedback(10)
            .expect("feedback");
        assert!(mismatch.detail.len() < 100);
    }

    #[test]
    fn reference_error_names_path() {
        let err = AgentError::ReferenceUnavailable {
            path: PathBuf::from("data/icici/icici_sample.csv"),
            detail: "not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "reference unavailable at data/icici/icici_sample.csv: not found"
        );
    }
}
