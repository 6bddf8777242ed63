//! Generation service abstraction.
//!
//! The [`Generator`] trait decouples the agent from the actual text
//! generation backend (by default `codex exec`). Tests use scripted
//! generators that write predetermined responses without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument, warn};

use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Parameters for one generation call.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Working directory for the generator process.
    pub workdir: PathBuf,
    /// Prompt text fed to the service.
    pub prompt: String,
    /// Path where the service must write its response.
    pub response_path: PathBuf,
    /// Path to write generator stdout/stderr log.
    pub log_path: PathBuf,
    pub timeout: Duration,
    /// Truncate generator output logs beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over text generation backends.
pub trait Generator {
    /// Produce a response for `request.prompt`. Must write it to `request.response_path`.
    fn generate(&self, request: &GenerateRequest) -> Result<()>;
}

/// Generator that spawns a configured command.
///
/// The prompt is written to stdin and every `{output}` in the argv is
/// replaced with the response path.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: Vec<String>,
}

impl CommandGenerator {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Generator for CommandGenerator {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn generate(&self, request: &GenerateRequest) -> Result<()> {
        let response = request.response_path.display().to_string();
        let args: Vec<String> = self
            .command
            .iter()
            .map(|arg| arg.replace("{output}", &response))
            .collect();
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| anyhow!("generator command is empty"))?;
        info!(program = %program, workdir = %request.workdir.display(), "starting generator");

        if let Some(parent) = request.response_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create response dir {}", parent.display()))?;
        }
        let mut cmd = Command::new(program);
        cmd.args(rest).current_dir(&request.workdir);

        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run generator {program}"))?;

        write_generator_log(&request.log_path, &output)?;

        if output.timed_out || !output.status.success() {
            let exit = output.describe_exit(request.timeout);
            warn!(exit = %exit, "generator failed");
            let stderr = output.stderr_tail(1_000);
            if stderr.is_empty() {
                bail!("generator {program} {exit}");
            }
            bail!("generator {program} {exit}: {stderr}");
        }

        debug!("generator completed successfully");
        Ok(())
    }
}

/// Run the generator and read back its response text.
#[instrument(skip_all, fields(response_path = %request.response_path.display()))]
pub fn generate_and_load<G: Generator + ?Sized>(
    generator: &G,
    request: &GenerateRequest,
) -> Result<String> {
    // A stale response from an earlier call must not be mistaken for this one.
    if request.response_path.exists() {
        fs::remove_file(&request.response_path).with_context(|| {
            format!("remove stale response {}", request.response_path.display())
        })?;
    }
    generator.generate(request)?;
    read_response(&request.response_path)
}

fn read_response(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(anyhow!("missing generator response {}", path.display()));
    }
    fs::read_to_string(path).with_context(|| format!("read generator response {}", path.display()))
}

fn write_generator_log(path: &Path, output: &CommandOutput) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create generator log dir {}", parent.display()))?;
    }
    fs::write(path, output.render_log("generator"))
        .with_context(|| format!("write generator log {}", path.display()))
}
