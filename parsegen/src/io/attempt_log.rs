//! Per-attempt artifacts under `.parsegen/attempts/<run_id>/<n>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::CandidateOrigin;

#[derive(Debug, Clone, Serialize)]
pub struct AttemptMeta {
    pub run_id: String,
    pub attempt: u32,
    pub origin: CandidateOrigin,
    /// `match` or the mismatch kind.
    pub verdict: String,
    pub budget_remaining: u32,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub candidate_path: PathBuf,
    pub diagnostic_path: PathBuf,
    pub prompt_path: PathBuf,
    pub response_path: PathBuf,
    pub generator_log_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(dir: PathBuf, unit_extension: &str) -> Self {
        Self {
            meta_path: dir.join("meta.json"),
            candidate_path: dir.join(format!("candidate.{unit_extension}")),
            diagnostic_path: dir.join("diagnostic.txt"),
            prompt_path: dir.join("prompt.md"),
            response_path: dir.join("response.md"),
            generator_log_path: dir.join("generator.log"),
            dir,
        }
    }
}

pub struct AttemptWriteRequest<'a> {
    pub paths: &'a AttemptPaths,
    pub meta: &'a AttemptMeta,
    pub candidate: &'a str,
    pub diagnostic: Option<&'a str>,
    pub prompt: Option<&'a str>,
}

pub fn write_attempt(request: &AttemptWriteRequest<'_>) -> Result<()> {
    let paths = request.paths;
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create attempt dir {}", paths.dir.display()))?;

    write_json(&paths.meta_path, request.meta)?;
    write_text(&paths.candidate_path, request.candidate)?;
    if let Some(diagnostic) = request.diagnostic {
        write_text(&paths.diagnostic_path, diagnostic)?;
    }
    if let Some(prompt) = request.prompt {
        write_text(&paths.prompt_path, prompt)?;
    }
    Ok(())
}

/// Record the planning exchange next to the attempt directories of a run.
pub fn write_plan(run_dir: &Path, prompt: &str, plan: Option<&str>) -> Result<()> {
    fs::create_dir_all(run_dir)
        .with_context(|| format!("create run dir {}", run_dir.display()))?;
    write_text(&run_dir.join("plan_prompt.md"), prompt)?;
    if let Some(plan) = plan {
        write_text(&run_dir.join("plan.md"), plan)?;
    }
    Ok(())
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
