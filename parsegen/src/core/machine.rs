//! Explicit state machine for the synthesize-execute-validate-retry loop.
//!
//! The transition function is pure: it takes the current state, the event the
//! orchestrator observed, and the attempts remaining after that event, and
//! returns the next state. It never talks to the generation service.

use serde::Serialize;
use thiserror::Error;

use crate::core::types::CandidateOrigin;

/// Loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "origin", rename_all = "snake_case")]
pub enum State {
    /// Produce or refresh the optional natural-language plan.
    Planning,
    /// Obtain a candidate from the generation service.
    Generating,
    /// Load, run and compare the candidate.
    Testing(CandidateOrigin),
    /// Record failure feedback before generating again.
    Retrying,
    /// Budget spent; the fallback routine is next.
    Exhausted,
    /// A candidate matched the reference. Terminal.
    Accepted(CandidateOrigin),
    /// The fallback routine did not match. Terminal.
    FallbackFailed,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Accepted(_) | State::FallbackFailed)
    }
}

/// Observation that drives a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Planned,
    Generated,
    SynthesisFailed,
    Matched,
    Mismatched,
    FeedbackRecorded,
    FallbackLoaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition from {state:?} on {event:?}")]
pub struct InvalidTransition {
    pub state: State,
    pub event: Event,
}

/// Compute the next state.
///
/// `remaining` is the attempt budget left after the current cycle consumed
/// its attempt.
pub fn transition(state: State, event: Event, remaining: u32) -> Result<State, InvalidTransition> {
    let retry_or_exhaust = if remaining > 0 {
        State::Retrying
    } else {
        State::Exhausted
    };

    let next = match (state, event) {
        (State::Planning, Event::Planned) => {
            if remaining > 0 {
                State::Generating
            } else {
                State::Exhausted
            }
        }
        (State::Generating, Event::Generated) => State::Testing(CandidateOrigin::Synthesized),
        (State::Generating, Event::SynthesisFailed) => retry_or_exhaust,
        (State::Testing(origin), Event::Matched) => State::Accepted(origin),
        (State::Testing(CandidateOrigin::Synthesized), Event::Mismatched) => retry_or_exhaust,
        (State::Testing(CandidateOrigin::Fallback), Event::Mismatched) => State::FallbackFailed,
        (State::Retrying, Event::FeedbackRecorded) => State::Generating,
        (State::Exhausted, Event::FallbackLoaded) => State::Testing(CandidateOrigin::Fallback),
        (state, event) => return Err(InvalidTransition { state, event }),
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the machine with a scripted verdict per synthesized test cycle,
    /// counting test cycles and fallback loads.
    fn simulate(initial: u32, verdicts: &[bool], fallback_matches: bool) -> (State, u32, u32) {
        let mut remaining = initial;
        let mut state = State::Planning;
        let mut test_cycles = 0u32;
        let mut fallback_loads = 0u32;
        let mut verdicts = verdicts.iter().copied();

        while !state.is_terminal() {
            let event = match state {
                State::Planning => Event::Planned,
                State::Generating => {
                    remaining -= 1;
                    Event::Generated
                }
                State::Testing(origin) => {
                    test_cycles += 1;
                    let matched = match origin {
                        CandidateOrigin::Synthesized => verdicts.next().unwrap_or(false),
                        CandidateOrigin::Fallback => fallback_matches,
                    };
                    if matched {
                        Event::Matched
                    } else {
                        Event::Mismatched
                    }
                }
                State::Retrying => Event::FeedbackRecorded,
                State::Exhausted => {
                    fallback_loads += 1;
                    Event::FallbackLoaded
                }
                State::Accepted(_) | State::FallbackFailed => unreachable!(),
            };
            state = transition(state, event, remaining).expect("valid transition");
        }
        (state, test_cycles, fallback_loads)
    }

    #[test]
    fn match_on_first_attempt_accepts() {
        let (state, cycles, fallback) = simulate(3, &[true], false);
        assert_eq!(state, State::Accepted(CandidateOrigin::Synthesized));
        assert_eq!(cycles, 1);
        assert_eq!(fallback, 0);
    }

    #[test]
    fn three_mismatches_invoke_fallback_exactly_once() {
        let (state, cycles, fallback) = simulate(3, &[false, false, false], false);
        assert_eq!(state, State::FallbackFailed);
        assert_eq!(cycles, 4);
        assert_eq!(fallback, 1);

        let (state, _, fallback) = simulate(3, &[false, false, false], true);
        assert_eq!(state, State::Accepted(CandidateOrigin::Fallback));
        assert_eq!(fallback, 1);
    }

    #[test]
    fn loop_terminates_within_budget_plus_one_cycles() {
        for initial in 0..6 {
            let (state, cycles, _) = simulate(initial, &[], false);
            assert!(state.is_terminal());
            assert_eq!(cycles, initial + 1);
        }
    }

    #[test]
    fn zero_budget_goes_straight_to_fallback() {
        assert_eq!(
            transition(State::Planning, Event::Planned, 0),
            Ok(State::Exhausted)
        );
    }

    #[test]
    fn synthesis_failure_retries_while_budget_remains() {
        assert_eq!(
            transition(State::Generating, Event::SynthesisFailed, 2),
            Ok(State::Retrying)
        );
        assert_eq!(
            transition(State::Generating, Event::SynthesisFailed, 0),
            Ok(State::Exhausted)
        );
    }

    #[test]
    fn terminal_states_reject_events() {
        let err = transition(State::FallbackFailed, Event::Planned, 1).unwrap_err();
        assert_eq!(err.state, State::FallbackFailed);
        assert!(
            transition(
                State::Accepted(CandidateOrigin::Synthesized),
                Event::Matched,
                1
            )
            .is_err()
        );
    }
}
