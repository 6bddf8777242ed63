//! Prompt assembly for planning and synthesis requests.

use std::sync::LazyLock;

use anyhow::Result;
use minijinja::{Environment, context};
use regex::Regex;
use tracing::debug;

use crate::core::types::Mismatch;

const SYNTHESIS_TEMPLATE: &str = include_str!("prompts/synthesis.md");
const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");

/// Droppable sections, least important first.
const DROP_ORDER: [&str; 3] = ["plan", "previous", "examples"];

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").expect("section marker regex")
});

/// Everything a prompt can mention about the target.
#[derive(Debug, Clone, Default)]
pub struct PromptInputs {
    pub target: String,
    pub input_path: String,
    pub routine_path: String,
    pub columns: Vec<String>,
    pub numeric_columns: Vec<String>,
    pub entry_point: String,
    /// Routine file extension, also used as the code fence tag.
    pub unit_extension: String,
    /// Leading reference rows rendered as CSV.
    pub example_csv: Option<String>,
    pub plan: Option<String>,
    pub previous_candidate: Option<String>,
    pub failure: Option<Mismatch>,
}

impl PromptInputs {
    fn language(&self) -> &str {
        match self.unit_extension.as_str() {
            "py" => "Python",
            other => other,
        }
    }
}

struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("synthesis", SYNTHESIS_TEMPLATE)
            .expect("synthesis template should be valid");
        env.add_template("plan", PLAN_TEMPLATE)
            .expect("plan template should be valid");
        Self { env }
    }

    fn render(&self, name: &str, input: &PromptInputs) -> Result<String> {
        let template = self.env.get_template(name)?;
        let rendered = template.render(context! {
            target => input.target.as_str(),
            input_path => input.input_path.as_str(),
            routine_path => input.routine_path.as_str(),
            columns => &input.columns,
            numeric_columns => &input.numeric_columns,
            entry_point => input.entry_point.as_str(),
            language => input.language(),
            language_tag => input.unit_extension.as_str(),
            example_csv => non_blank(input.example_csv.as_deref()),
            plan => non_blank(input.plan.as_deref()),
            previous => non_blank(input.previous_candidate.as_deref()),
            failure => input.failure.as_ref().map(|f| f.detail.trim()),
            failure_kind => input.failure.as_ref().map(|f| f.kind.as_str()),
        })?;
        Ok(rendered)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
struct Section {
    key: String,
    required: bool,
    content: String,
}

/// Split rendered output on `<!-- section:KEY required|droppable -->` markers.
fn parse_sections(rendered: &str) -> Vec<Section> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());
    for (idx, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(Section {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }
    sections
}

fn total_len(sections: &[Section]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

/// Drop optional sections, then truncate the longest remaining one, until
/// the prompt fits `budget` bytes.
fn apply_budget(sections: &mut Vec<Section>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total <= budget {
        return;
    }
    let Some(longest) = sections.iter_mut().max_by_key(|s| s.content.len()) else {
        return;
    };
    let excess = total - budget;
    let notice = "\n[truncated]";
    let mut keep = longest.content.len().saturating_sub(excess + notice.len());
    while !longest.content.is_char_boundary(keep) {
        keep -= 1;
    }
    let before_len = longest.content.len();
    longest.content.truncate(keep);
    longest.content.push_str(notice);
    debug!(
        section = longest.key.as_str(),
        before_len,
        after_len = longest.content.len(),
        "truncated section for budget"
    );
}

fn render_sections(sections: &[Section]) -> String {
    let mut out = sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    out.push('\n');
    out
}

/// Builds prompts within a byte budget, dropping less critical sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// Prompt asking for a complete candidate routine.
    pub fn build_synthesis(&self, input: &PromptInputs) -> Result<String> {
        self.build("synthesis", input)
    }

    /// Prompt asking for a short extraction plan.
    pub fn build_plan(&self, input: &PromptInputs) -> Result<String> {
        self.build("plan", input)
    }

    fn build(&self, name: &str, input: &PromptInputs) -> Result<String> {
        let rendered = PromptEngine::new().render(name, input)?;
        let mut sections = parse_sections(&rendered);
        apply_budget(&mut sections, self.budget_bytes);
        Ok(render_sections(&sections))
    }
}
