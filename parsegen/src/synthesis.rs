//! Synthesis driver: turns session state into prompts and prompts into
//! candidate source text.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::candidate::strip_code_fences;
use crate::core::session::Session;
use crate::core::table::Table;
use crate::core::types::Target;
use crate::error::AgentError;
use crate::io::attempt_log::AttemptPaths;
use crate::io::config::AgentConfig;
use crate::io::generator::{GenerateRequest, Generator, generate_and_load};
use crate::io::paths::TargetPaths;
use crate::io::prompt::{PromptBuilder, PromptInputs};
use crate::io::reference::table_to_csv;

/// A prompt sent to the generation service and what came back.
#[derive(Debug)]
pub struct Exchange {
    /// Rendered prompt, absent only when rendering itself failed.
    pub prompt: Option<String>,
    pub response: Result<String, AgentError>,
}

/// Builds prompts for one target and obtains responses from a generator
/// handle owned by the caller.
pub struct SynthesisDriver<'a, G: Generator + ?Sized> {
    generator: &'a G,
    prompts: PromptBuilder,
    base: PromptInputs,
    workdir: &'a Path,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl<'a, G: Generator + ?Sized> SynthesisDriver<'a, G> {
    pub fn new(
        generator: &'a G,
        target: &Target,
        config: &AgentConfig,
        paths: &'a TargetPaths,
        reference: &Table,
    ) -> Result<Self> {
        let example_csv = if config.example_rows == 0 || reference.is_empty() {
            None
        } else {
            let rows = table_to_csv(&reference.head(config.example_rows))?;
            Some(String::from_utf8_lossy(&rows).into_owned())
        };
        let base = PromptInputs {
            target: target.to_string(),
            input_path: relative_display(&paths.root, &paths.input_path),
            routine_path: relative_display(&paths.root, &paths.routine_path),
            columns: reference.columns.clone(),
            numeric_columns: config.reference.numeric_columns.clone(),
            entry_point: config.runtime.entry_point.clone(),
            unit_extension: config.runtime.unit_extension.clone(),
            example_csv,
            ..PromptInputs::default()
        };
        Ok(Self {
            generator,
            prompts: PromptBuilder::new(config.prompt_budget_bytes),
            base,
            workdir: &paths.root,
            timeout: Duration::from_secs(config.generator.timeout_secs),
            output_limit_bytes: config.generator.output_limit_bytes,
        })
    }

    /// Ask for a natural-language extraction plan.
    ///
    /// Request artifacts are written into `run_dir`.
    #[instrument(skip_all, fields(target = %self.base.target))]
    pub fn plan(&self, run_dir: &Path) -> Exchange {
        let prompt = match self.prompts.build_plan(&self.base) {
            Ok(prompt) => prompt,
            Err(err) => return render_failure(&err),
        };
        let response = self
            .request(
                &prompt,
                &run_dir.join("plan_response.md"),
                &run_dir.join("plan_generator.log"),
            )
            .map(|text| text.trim().to_string());
        Exchange {
            prompt: Some(prompt),
            response,
        }
    }

    /// Ask for a candidate routine, including the previous candidate and its
    /// failure when the session carries feedback.
    #[instrument(skip_all, fields(target = %self.base.target, attempt = session.budget.used()))]
    pub fn synthesize(&self, session: &Session, attempt: &AttemptPaths) -> Exchange {
        let mut inputs = self.base.clone();
        inputs.plan.clone_from(&session.plan);
        if let Some((previous, failure)) = session.feedback() {
            inputs.previous_candidate = Some(previous.to_string());
            inputs.failure = Some(failure.clone());
        }
        let prompt = match self.prompts.build_synthesis(&inputs) {
            Ok(prompt) => prompt,
            Err(err) => return render_failure(&err),
        };
        let response = self
            .request(&prompt, &attempt.response_path, &attempt.generator_log_path)
            .map(|text| strip_code_fences(&text));
        if let Ok(source) = &response {
            debug!(bytes = source.len(), "candidate received");
        }
        Exchange {
            prompt: Some(prompt),
            response,
        }
    }

    fn request(
        &self,
        prompt: &str,
        response_path: &Path,
        log_path: &Path,
    ) -> Result<String, AgentError> {
        let request = GenerateRequest {
            workdir: self.workdir.to_path_buf(),
            prompt: prompt.to_string(),
            response_path: response_path.to_path_buf(),
            log_path: log_path.to_path_buf(),
            timeout: self.timeout,
            output_limit_bytes: self.output_limit_bytes,
        };
        generate_and_load(self.generator, &request)
            .map_err(|err| AgentError::SynthesisUnavailable(format!("{err:#}")))
    }
}

fn render_failure(err: &anyhow::Error) -> Exchange {
    Exchange {
        prompt: None,
        response: Err(AgentError::SynthesisUnavailable(format!(
            "render prompt: {err:#}"
        ))),
    }
}

fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::core::table::Cell;
    use crate::core::types::{Mismatch, MismatchKind};
    use crate::test_support::{ScriptedGenerator, fenced, sh_config};

    fn reference() -> Table {
        Table::with_rows(
            ["Date", "Description", "Debit Amt", "Credit Amt", "Balance"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            (1..=8)
                .map(|day| {
                    vec![
                        Cell::text(&format!("{day:02}-01-2024")),
                        Cell::text("Coffee shop"),
                        Cell::Number(150.0),
                        Cell::Missing,
                        Cell::Number(5000.0 - 150.0 * f64::from(day)),
                    ]
                })
                .collect(),
        )
    }

    fn fixture(root: &Path) -> (Target, TargetPaths, Session) {
        let target = Target::parse("icici").expect("target");
        let paths = TargetPaths::new(root, &target, "sh");
        let session = Session::new(
            target.clone(),
            paths.input_path.clone(),
            paths.reference_path.clone(),
            3,
        );
        (target, paths, session)
    }

    #[test]
    fn first_prompt_carries_contract_and_example_rows() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (target, paths, session) = fixture(temp.path());
        let generator = ScriptedGenerator::replying(&[fenced("echo hi\n")]);
        let config = sh_config(3);
        let driver =
            SynthesisDriver::new(&generator, &target, &config, &paths, &reference()).expect("driver");
        let attempt = AttemptPaths::new(PathBuf::from(temp.path()).join("a/1"), "sh");

        let exchange = driver.synthesize(&session, &attempt);

        assert_eq!(exchange.response.expect("response"), "echo hi\n");
        let prompt = &generator.prompts()[0];
        assert!(prompt.contains("data/icici/icici_sample.pdf"));
        assert!(prompt.contains("05-01-2024,Coffee shop,150.0,,4250.0"));
        assert!(!prompt.contains("06-01-2024"), "only example_rows rows");
        assert!(!prompt.contains("### Failure"));
    }

    #[test]
    fn header_only_reference_omits_example_section() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (target, paths, session) = fixture(temp.path());
        let generator = ScriptedGenerator::replying(&["echo hi\n"]);
        let config = sh_config(3);
        let header_only = Table::new(reference().columns);
        let driver =
            SynthesisDriver::new(&generator, &target, &config, &paths, &header_only).expect("driver");
        let attempt = AttemptPaths::new(temp.path().join("a/1"), "sh");

        driver.synthesize(&session, &attempt).response.expect("response");

        let prompt = &generator.prompts()[0];
        assert!(!prompt.contains("### Expected Rows"));
        assert!(prompt.contains("Debit Amt"));
    }

    #[test]
    fn retry_prompt_carries_previous_candidate_and_diagnostic() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (target, paths, mut session) = fixture(temp.path());
        session.candidate = "echo previous-attempt\n".to_string();
        session.last_failure = Some(Mismatch {
            kind: MismatchKind::ColumnSequence,
            detail: "column sequence differs".to_string(),
        });
        session.plan = Some("use camelot lattice mode".to_string());
        let generator = ScriptedGenerator::replying(&["echo next\n"]);
        let config = sh_config(3);
        let driver =
            SynthesisDriver::new(&generator, &target, &config, &paths, &reference()).expect("driver");
        let attempt = AttemptPaths::new(temp.path().join("a/2"), "sh");

        driver.synthesize(&session, &attempt).response.expect("response");

        let prompt = &generator.prompts()[0];
        assert!(prompt.contains("echo previous-attempt"));
        assert!(prompt.contains("column sequence differs"));
        assert!(prompt.contains("rejected (column_sequence)"));
        assert!(prompt.contains("use camelot lattice mode"));
    }

    #[test]
    fn service_failure_is_synthesis_unavailable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (target, paths, session) = fixture(temp.path());
        let generator = ScriptedGenerator::new([Err("rate limited".to_string())]);
        let config = sh_config(3);
        let driver =
            SynthesisDriver::new(&generator, &target, &config, &paths, &reference()).expect("driver");
        let attempt = AttemptPaths::new(temp.path().join("a/1"), "sh");

        let exchange = driver.synthesize(&session, &attempt);

        assert!(exchange.prompt.is_some());
        let err = exchange.response.unwrap_err();
        assert!(matches!(err, AgentError::SynthesisUnavailable(ref d) if d.contains("rate limited")));
    }

    #[test]
    fn plan_is_trimmed_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (target, paths, _) = fixture(temp.path());
        let generator = ScriptedGenerator::replying(&["\n- read every page\n- find header\n\n"]);
        let config = sh_config(3);
        let driver =
            SynthesisDriver::new(&generator, &target, &config, &paths, &reference()).expect("driver");

        let exchange = driver.plan(temp.path());

        assert_eq!(
            exchange.response.expect("plan"),
            "- read every page\n- find header"
        );
        assert!(generator.prompts()[0].contains("### Planning Contract"));
    }
}
