//! Bounded attempt counter for synthesis cycles.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Attempt budget shared across one run. Never goes below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptBudget {
    initial: u32,
    remaining: u32,
}

impl AttemptBudget {
    pub fn new(initial: u32) -> Self {
        Self {
            initial,
            remaining: initial,
        }
    }

    pub fn initial(&self) -> u32 {
        self.initial
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Attempts consumed so far.
    pub fn used(&self) -> u32 {
        self.initial - self.remaining
    }

    /// Consume one attempt, returning the 1-indexed attempt number.
    pub fn consume(&mut self) -> Result<u32> {
        if self.remaining == 0 {
            return Err(anyhow!(
                "attempt budget exhausted ({} attempts)",
                self.initial
            ));
        }
        self.remaining -= 1;
        Ok(self.used())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_counts_down_to_zero_and_stops() {
        let mut budget = AttemptBudget::new(2);
        assert_eq!(budget.consume().expect("first"), 1);
        assert_eq!(budget.remaining(), 1);
        assert_eq!(budget.consume().expect("second"), 2);
        assert_eq!(budget.remaining(), 0);

        let err = budget.consume().unwrap_err();
        assert!(err.to_string().contains("exhausted"));
        assert_eq!(budget.remaining(), 0);
        assert_eq!(budget.used(), 2);
    }

    #[test]
    fn zero_budget_starts_exhausted() {
        let budget = AttemptBudget::new(0);
        assert_eq!(budget.remaining(), 0);
        assert_eq!(budget.used(), 0);
    }
}
