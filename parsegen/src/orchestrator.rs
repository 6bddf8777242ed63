//! Retry orchestrator: drives the state machine through planning, synthesis,
//! testing and fallback for one target.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};
use tracing::{debug, info, instrument, warn};

use crate::core::candidate::is_blank;
use crate::core::compare::{CompareLimits, compare_tables};
use crate::core::machine::{Event, State, transition};
use crate::core::session::Session;
use crate::core::table::Table;
use crate::core::types::{CandidateOrigin, Comparison, Mismatch, MismatchKind, Target};
use crate::error::AgentError;
use crate::fallback::{FallbackSource, fallback_source};
use crate::io::attempt_log::{AttemptMeta, AttemptPaths, AttemptWriteRequest, write_attempt, write_plan};
use crate::io::config::AgentConfig;
use crate::io::generator::Generator;
use crate::io::loader::DynamicLoader;
use crate::io::paths::TargetPaths;
use crate::io::persist::{persist_output, persist_routine};
use crate::io::reference::load_reference;
use crate::synthesis::SynthesisDriver;

/// Everything a run needs besides the generator handle.
#[derive(Debug, Clone)]
pub struct RunRequest<'a> {
    pub root: &'a Path,
    pub target: &'a Target,
    pub config: &'a AgentConfig,
    pub fallback: FallbackSource,
}

impl<'a> RunRequest<'a> {
    pub fn new(root: &'a Path, target: &'a Target, config: &'a AgentConfig) -> Self {
        Self {
            root,
            target,
            config,
            fallback: fallback_source,
        }
    }
}

/// Progress narration reported while a run advances.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    PlanReady,
    PlanSkipped { reason: String },
    Generating { attempt: u32, of: u32 },
    Tested {
        origin: CandidateOrigin,
        attempt: u32,
        of: u32,
        verdict: Comparison,
    },
    FallbackEngaged { after: u32 },
    Persisted { routine: PathBuf, output: PathBuf },
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunEvent::PlanReady => write!(f, "plan ready"),
            RunEvent::PlanSkipped { reason } => write!(f, "plan skipped: {reason}"),
            RunEvent::Generating { attempt, of } => write!(f, "attempt {attempt}/{of}: generating"),
            RunEvent::Tested {
                origin,
                attempt,
                of,
                verdict,
            } => {
                let label = match origin {
                    CandidateOrigin::Synthesized => format!("attempt {attempt}/{of}"),
                    CandidateOrigin::Fallback => "fallback".to_string(),
                };
                match verdict {
                    Comparison::Match => write!(f, "{label}: match"),
                    Comparison::Mismatch(m) => write!(f, "{label}: mismatch ({})", m.kind.as_str()),
                }
            }
            RunEvent::FallbackEngaged { after } => {
                write!(f, "budget exhausted after {after} attempts, trying fallback")
            }
            RunEvent::Persisted { routine, output } => write!(
                f,
                "persisted {} and {}",
                routine.display(),
                output.display()
            ),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_id: String,
    /// Terminal state: `Accepted(_)` or `FallbackFailed`.
    pub state: State,
    /// Synthesis attempts consumed from the budget.
    pub attempts_used: u32,
    /// Test cycles executed, including the fallback cycle.
    pub cycles: u32,
    /// Most recent failure, if any cycle failed.
    pub last_mismatch: Option<Mismatch>,
    pub routine_path: PathBuf,
    pub output_path: PathBuf,
}

impl RunOutcome {
    pub fn accepted(&self) -> Option<CandidateOrigin> {
        match self.state {
            State::Accepted(origin) => Some(origin),
            _ => None,
        }
    }

    /// Terminal failure for a run that did not accept any candidate.
    pub fn failure(&self) -> Option<AgentError> {
        if self.accepted().is_some() {
            return None;
        }
        let mismatch = self.last_mismatch.clone().unwrap_or_else(|| Mismatch {
            kind: MismatchKind::Execution,
            detail: "no candidate was tested".to_string(),
        });
        Some(AgentError::FallbackFailed(mismatch))
    }
}

/// Run the synthesize-execute-validate-retry loop for one target.
///
/// Recoverable failures become retry feedback. A missing reference dataset
/// aborts the run with [`AgentError::ReferenceUnavailable`]; a failing
/// fallback ends it with `State::FallbackFailed`.
#[instrument(skip_all, fields(target = %request.target, attempts = request.config.attempts))]
pub fn run_agent<G, F>(request: &RunRequest<'_>, generator: &G, mut on_event: F) -> Result<RunOutcome>
where
    G: Generator + ?Sized,
    F: FnMut(&RunEvent),
{
    let config = request.config;
    let target = request.target;
    let paths = TargetPaths::new(request.root, target, &config.runtime.unit_extension);
    let reference = load_reference(&paths.reference_path, &config.reference.numeric_columns)?;

    let run_id = new_run_id(target);
    let run_dir = paths.attempts_dir.join(&run_id);
    info!(run_id = %run_id, "run started");

    let driver = SynthesisDriver::new(generator, target, config, &paths, &reference)
        .context("prepare synthesis driver")?;
    let loader = DynamicLoader::new(&paths.scratch_dir, config.runtime.clone());
    let limits = config.compare_limits();

    let mut session = Session::new(
        target.clone(),
        paths.input_path.clone(),
        paths.reference_path.clone(),
        config.attempts,
    );
    let of = session.budget.initial();
    let mut state = State::Planning;
    let mut pending: Option<Mismatch> = None;
    let mut last_mismatch: Option<Mismatch> = None;
    let mut prompt: Option<String> = None;
    let mut attempt = 0u32;
    let mut cycles = 0u32;

    while !state.is_terminal() {
        let event = match state {
            State::Planning => {
                if config.plan {
                    session.plan = plan(&driver, &run_dir, &mut on_event)?;
                }
                Event::Planned
            }
            State::Generating => {
                attempt = session.budget.consume()?;
                on_event(&RunEvent::Generating { attempt, of });
                let attempt_paths = AttemptPaths::new(
                    paths.attempt_dir(&run_id, attempt),
                    &config.runtime.unit_extension,
                );
                let exchange = driver.synthesize(&session, &attempt_paths);
                prompt = exchange.prompt;
                match exchange.response {
                    Ok(source) => {
                        session.candidate = source;
                        Event::Generated
                    }
                    Err(err) => {
                        warn!(attempt, err = %err, "synthesis failed");
                        let Some(mismatch) = err.feedback(limits.detail_limit_bytes) else {
                            return Err(err.into());
                        };
                        session.candidate.clear();
                        record(
                            &attempt_paths,
                            AttemptMeta {
                                run_id: run_id.clone(),
                                attempt,
                                origin: CandidateOrigin::Synthesized,
                                verdict: mismatch.kind.as_str().to_string(),
                                budget_remaining: session.budget.remaining(),
                                duration_ms: 0,
                            },
                            "",
                            Some(&mismatch),
                            prompt.as_deref(),
                        )?;
                        on_event(&RunEvent::Tested {
                            origin: CandidateOrigin::Synthesized,
                            attempt,
                            of,
                            verdict: Comparison::Mismatch(mismatch.clone()),
                        });
                        last_mismatch = Some(mismatch.clone());
                        pending = Some(mismatch);
                        Event::SynthesisFailed
                    }
                }
            }
            State::Testing(origin) => {
                cycles += 1;
                if origin == CandidateOrigin::Fallback {
                    attempt = of + 1;
                    prompt = None;
                }
                let started = Instant::now();
                let result = evaluate(
                    &loader,
                    &session.candidate,
                    &session.target,
                    &session.input_path,
                    &reference,
                    limits,
                );
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                let verdict = match &result {
                    Ok(_) => Comparison::Match,
                    Err(mismatch) => Comparison::Mismatch(mismatch.clone()),
                };
                record(
                    &AttemptPaths::new(
                        paths.attempt_dir(&run_id, attempt),
                        &config.runtime.unit_extension,
                    ),
                    AttemptMeta {
                        run_id: run_id.clone(),
                        attempt,
                        origin,
                        verdict: match &verdict {
                            Comparison::Match => "match".to_string(),
                            Comparison::Mismatch(m) => m.kind.as_str().to_string(),
                        },
                        budget_remaining: session.budget.remaining(),
                        duration_ms,
                    },
                    &session.candidate,
                    result.as_ref().err(),
                    prompt.as_deref(),
                )?;
                on_event(&RunEvent::Tested {
                    origin,
                    attempt,
                    of,
                    verdict,
                });
                match result {
                    Ok(table) => {
                        persist_routine(&paths.routine_path, &session.candidate)?;
                        persist_output(&paths.output_path, &table)?;
                        on_event(&RunEvent::Persisted {
                            routine: paths.routine_path.clone(),
                            output: paths.output_path.clone(),
                        });
                        Event::Matched
                    }
                    Err(mismatch) => {
                        last_mismatch = Some(mismatch.clone());
                        pending = Some(mismatch);
                        Event::Mismatched
                    }
                }
            }
            State::Retrying => {
                session.last_failure = pending.take();
                Event::FeedbackRecorded
            }
            State::Exhausted => {
                session.last_failure = pending.take();
                session.candidate = (request.fallback)().to_string();
                on_event(&RunEvent::FallbackEngaged {
                    after: session.budget.used(),
                });
                Event::FallbackLoaded
            }
            State::Accepted(_) | State::FallbackFailed => break,
        };

        let next = transition(state, event, session.budget.remaining())?;
        debug!(from = ?state, event = ?event, to = ?next, "transition");
        state = next;
    }

    match state {
        State::Accepted(origin) => info!(run_id = %run_id, origin = origin.as_str(), "run accepted"),
        _ => warn!(run_id = %run_id, "fallback failed"),
    }
    Ok(RunOutcome {
        run_id,
        state,
        attempts_used: session.budget.used(),
        cycles,
        last_mismatch,
        routine_path: paths.routine_path,
        output_path: paths.output_path,
    })
}

fn plan<G, F>(driver: &SynthesisDriver<'_, G>, run_dir: &Path, on_event: &mut F) -> Result<Option<String>>
where
    G: Generator + ?Sized,
    F: FnMut(&RunEvent),
{
    let exchange = driver.plan(run_dir);
    let plan = match exchange.response {
        Ok(text) if !text.is_empty() => {
            on_event(&RunEvent::PlanReady);
            Some(text)
        }
        Ok(_) => {
            on_event(&RunEvent::PlanSkipped {
                reason: "empty plan".to_string(),
            });
            None
        }
        Err(err) => {
            warn!(err = %err, "planning failed, continuing without a plan");
            on_event(&RunEvent::PlanSkipped {
                reason: err.to_string(),
            });
            None
        }
    };
    if let Some(prompt) = exchange.prompt.as_deref() {
        write_plan(run_dir, prompt, plan.as_deref())?;
    }
    Ok(plan)
}

/// Run one candidate and compare its output against the reference.
///
/// Returns the generated table on a match.
pub fn evaluate(
    loader: &DynamicLoader,
    source: &str,
    target: &Target,
    input: &Path,
    reference: &Table,
    limits: CompareLimits,
) -> Result<Table, Mismatch> {
    if is_blank(source) {
        return Err(Mismatch::bounded(
            MismatchKind::EmptyCode,
            "candidate source is empty",
            limits.detail_limit_bytes,
        ));
    }
    run_candidate(loader, source, target, input, reference, limits).map_err(|err| {
        err.feedback(limits.detail_limit_bytes).unwrap_or_else(|| {
            Mismatch::bounded(
                MismatchKind::Execution,
                err.to_string(),
                limits.detail_limit_bytes,
            )
        })
    })
}

fn run_candidate(
    loader: &DynamicLoader,
    source: &str,
    target: &Target,
    input: &Path,
    reference: &Table,
    limits: CompareLimits,
) -> Result<Table, AgentError> {
    let table = loader.run(source, target, input)?;
    match compare_tables(&table, reference, limits) {
        Comparison::Match => Ok(table),
        Comparison::Mismatch(mismatch) => Err(AgentError::ComparisonMismatch(mismatch)),
    }
}

fn record(
    paths: &AttemptPaths,
    meta: AttemptMeta,
    candidate: &str,
    mismatch: Option<&Mismatch>,
    prompt: Option<&str>,
) -> Result<()> {
    write_attempt(&AttemptWriteRequest {
        paths,
        meta: &meta,
        candidate,
        diagnostic: mismatch.map(|m| m.detail.as_str()),
        prompt,
    })
    .with_context(|| format!("write attempt log {}", paths.dir.display()))
}

/// `<target>-<YYYYmmdd_HHMMSS>-<6 lowercase alphanumerics>`.
pub fn new_run_id(target: &Target) -> String {
    let mut rng = rand::thread_rng();
    let short_id = std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase();
    format!("{target}-{}-{short_id}", Utc::now().format("%Y%m%d_%H%M%S"))
}
