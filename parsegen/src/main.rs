//! Bank-statement parser synthesis agent.
//!
//! `parsegen run --target icici` asks a generation service for a parser,
//! validates it against `data/icici/icici_sample.csv` and persists it to
//! `custom_parsers/` once it matches.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use parsegen::core::types::Target;
use parsegen::error::AgentError;
use parsegen::exit_codes;
use parsegen::fallback::fallback_source;
use parsegen::io::config::{AgentConfig, load_config, write_config};
use parsegen::io::generator::CommandGenerator;
use parsegen::io::paths::config_path;
use parsegen::logging;
use parsegen::orchestrator::{RunRequest, run_agent};
use parsegen::verify::{VerifyOutcome, verify_routine};

#[derive(Parser)]
#[command(
    name = "parsegen",
    version,
    about = "Synthesize and validate bank-statement parsers"
)]
struct Cli {
    /// Project root holding `data/`, `custom_parsers/` and `.parsegen/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write `.parsegen/config.toml` with default settings.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Synthesize a parser for a target, falling back when attempts run out.
    Run {
        #[arg(long)]
        target: String,
        /// Override the configured attempt budget.
        #[arg(long)]
        attempts: Option<u32>,
        /// Skip the planning step.
        #[arg(long)]
        no_plan: bool,
    },
    /// Re-run the persisted parser for a target against its reference.
    Verify {
        #[arg(long)]
        target: String,
    },
    /// Print the deterministic fallback parser.
    Fallback,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.root, force),
        Command::Run {
            target,
            attempts,
            no_plan,
        } => cmd_run(&cli.root, &target, attempts, no_plan),
        Command::Verify { target } => cmd_verify(&cli.root, &target),
        Command::Fallback => {
            print!("{}", fallback_source());
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let path = config_path(root);
    if path.exists() && !force {
        println!("config exists at {} (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(&path, &AgentConfig::default())?;
    for dir in ["data", "custom_parsers", "output"] {
        let dir = root.join(dir);
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    }
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(root: &Path, target: &str, attempts: Option<u32>, no_plan: bool) -> Result<i32> {
    let target = Target::parse(target)?;
    let mut config = load_config(&config_path(root))?;
    if let Some(attempts) = attempts {
        config.attempts = attempts;
    }
    if no_plan {
        config.plan = false;
    }
    config.validate()?;

    let generator = CommandGenerator::new(config.generator.command.clone());
    let request = RunRequest::new(root, &target, &config);
    let outcome = run_agent(&request, &generator, |event| println!("{event}"))?;

    if let Some(err) = outcome.failure() {
        eprintln!("{err}");
        return Ok(exit_codes::FALLBACK_FAILED);
    }
    println!(
        "accepted {} parser after {} cycle(s): {}",
        outcome
            .accepted()
            .map_or("unknown", |origin| origin.as_str()),
        outcome.cycles,
        outcome.routine_path.display()
    );
    Ok(exit_codes::OK)
}

fn cmd_verify(root: &Path, target: &str) -> Result<i32> {
    let target = Target::parse(target)?;
    let config = load_config(&config_path(root))?;
    match verify_routine(root, &target, &config)? {
        VerifyOutcome::Match { rows } => {
            println!("match ({rows} rows)");
            Ok(exit_codes::OK)
        }
        VerifyOutcome::Mismatch(mismatch) => {
            println!("{mismatch}");
            Ok(exit_codes::MISMATCH)
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<AgentError>() {
        Some(AgentError::ReferenceUnavailable { .. }) => exit_codes::REFERENCE_UNAVAILABLE,
        Some(AgentError::FallbackFailed(_)) => exit_codes::FALLBACK_FAILED,
        _ => exit_codes::INVALID,
    }
}
