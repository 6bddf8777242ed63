//! Test-only helpers: scripted generation, an `sh` candidate runtime and
//! on-disk fixtures.
//!
//! Candidates under the `sh` runtime are shell scripts invoked as
//! `sh <unit> <input> <output>`; they "return" a table by writing split-format
//! JSON to `$2`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::core::types::Target;
use crate::io::config::{AgentConfig, RuntimeConfig};
use crate::io::generator::{GenerateRequest, Generator};
use crate::io::paths::TargetPaths;

/// Column header shared by the bank statement fixtures.
pub const STATEMENT_HEADER: &str = "Date,Description,Debit Amt,Credit Amt,Balance";

/// Reference CSV with a single coffee-shop debit.
pub const SCENARIO_CSV: &str =
    "Date,Description,Debit Amt,Credit Amt,Balance\n02-01-2024,Coffee shop,150.0,,4850.0\n";

/// Frame identical to [`SCENARIO_CSV`].
pub const SCENARIO_FRAME: &str = r#"{"columns":["Date","Description","Debit Amt","Credit Amt","Balance"],"data":[["02-01-2024","Coffee shop",150.0,null,4850.0]]}"#;

/// Frame with the right columns but a wrong balance.
pub const WRONG_VALUE_FRAME: &str = r#"{"columns":["Date","Description","Debit Amt","Credit Amt","Balance"],"data":[["02-01-2024","Coffee shop",150.0,null,4800.0]]}"#;

/// Frame with the wrong column shape.
pub const WRONG_SHAPE_FRAME: &str =
    r#"{"columns":["Date","Description","Amount"],"data":[["02-01-2024","Coffee shop",150.0]]}"#;

/// Runtime that runs candidates as POSIX shell scripts.
pub fn sh_runtime() -> RuntimeConfig {
    RuntimeConfig {
        command: ["sh", "{unit}", "{input}", "{output}"]
            .iter()
            .map(ToString::to_string)
            .collect(),
        entry_point: "parse".to_string(),
        unit_extension: "sh".to_string(),
        timeout_secs: 10,
        output_limit_bytes: 10_000,
    }
}

/// Config using the `sh` runtime, no planning step and `attempts` budget.
pub fn sh_config(attempts: u32) -> AgentConfig {
    AgentConfig {
        attempts,
        plan: false,
        runtime: sh_runtime(),
        ..AgentConfig::default()
    }
}

/// Shell candidate that writes `frame_json` as its result.
pub fn frame_script(frame_json: &str) -> String {
    format!("cat > \"$2\" <<'FRAME'\n{frame_json}\nFRAME\n")
}

/// Shell candidate wrapped in a markdown fence, as a generation service
/// typically answers.
pub fn fenced(source: &str) -> String {
    format!("Here is the parser:\n\n```sh\n{source}```\n")
}

/// Write the input document and reference dataset for `target` under `root`.
pub fn write_fixture(root: &Path, target: &Target, reference_csv: &str) -> Result<TargetPaths> {
    let paths = TargetPaths::new(root, target, "sh");
    let data_dir = paths
        .input_path
        .parent()
        .ok_or_else(|| anyhow!("input path has no parent"))?;
    fs::create_dir_all(data_dir).with_context(|| format!("create {}", data_dir.display()))?;
    fs::write(&paths.input_path, b"%PDF-1.4 fixture\n").context("write input fixture")?;
    fs::write(&paths.reference_path, reference_csv).context("write reference fixture")?;
    Ok(paths)
}

/// Generator that replays canned responses in order and records prompts.
///
/// `Err` entries simulate a service failure. Running out of responses is
/// also an error.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: RefCell<VecDeque<Result<String, String>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(responses: impl IntoIterator<Item = Result<String, String>>) -> Self {
        Self {
            responses: RefCell::new(responses.into_iter().collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Generator that answers every call successfully with the given texts.
    pub fn replying<S: AsRef<str>>(responses: &[S]) -> Self {
        Self::new(responses.iter().map(|r| Ok(r.as_ref().to_string())))
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<()> {
        self.prompts.borrow_mut().push(request.prompt.clone());
        let next = self
            .responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted generator has no responses left"))?;
        let response = next.map_err(|msg| anyhow!(msg))?;
        if let Some(parent) = request.response_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&request.response_path, response)?;
        Ok(())
    }
}
