//! Normalization of raw generation-service responses into candidate source.

use std::sync::LazyLock;

use regex::Regex;

static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)\r?\n?```").expect("fence regex is valid")
});

/// Strip markdown code fences and surrounding chatter from a response.
///
/// When the response contains fenced blocks the first one wins; otherwise the
/// trimmed response is returned as-is.
pub fn strip_code_fences(response: &str) -> String {
    if let Some(caps) = FENCED_BLOCK_RE.captures(response) {
        let body = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        return normalize(body);
    }
    let trimmed = response.trim();
    // An unterminated opening fence still carries a language tag line.
    if let Some(rest) = trimmed.strip_prefix("```") {
        let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        return normalize(body.trim_end_matches("```"));
    }
    normalize(trimmed)
}

/// True when the candidate has no executable content.
pub fn is_blank(source: &str) -> bool {
    source.trim().is_empty()
}

fn normalize(body: &str) -> String {
    let trimmed = body.trim_matches(|c| c == '\n' || c == '\r');
    if trimmed.trim().is_empty() {
        return String::new();
    }
    let mut out = trimmed.trim_end().to_string();
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_language_tagged_fence() {
        let raw = "Here you go:\n```python\nimport pandas as pd\n\ndef parse(p):\n    pass\n```\nDone.";
        assert_eq!(
            strip_code_fences(raw),
            "import pandas as pd\n\ndef parse(p):\n    pass\n"
        );
    }

    #[test]
    fn keeps_unfenced_source() {
        let raw = "\n\ndef parse(p):\n    return None\n\n";
        assert_eq!(strip_code_fences(raw), "def parse(p):\n    return None\n");
    }

    #[test]
    fn handles_unterminated_fence() {
        let raw = "```py\ndef parse(p):\n    return 1\n";
        assert_eq!(strip_code_fences(raw), "def parse(p):\n    return 1\n");
    }

    #[test]
    fn empty_fence_is_blank() {
        let stripped = strip_code_fences("```python\n\n```");
        assert!(is_blank(&stripped));
        assert!(is_blank("   \n\t"));
        assert!(!is_blank("x = 1"));
    }
}
