//! Pull executable code out of a raw model completion.

use std::sync::LazyLock;

use regex::Regex;

static TAGGED_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*(?:python3?|py)[ \t]*\r?\n(.*?)```").expect("tagged fence regex")
});

static ANY_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[^\n`]*\r?\n(.*?)```").expect("fence regex")
});

/// Extract code from a completion.
///
/// Preference order: a python-tagged fence, then any fence, then the raw text
/// with a dangling opening fence (truncated completion) stripped.
pub fn extract_code(raw: &str) -> String {
    if let Some(caps) = TAGGED_FENCE_RE.captures(raw) {
        return caps[1].trim().to_string();
    }
    if let Some(caps) = ANY_FENCE_RE.captures(raw) {
        return caps[1].trim().to_string();
    }

    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        return body.trim_end_matches("```").trim().to_string();
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_python_tagged_fence() {
        let raw = "Here:\n```text\nnot code\n```\n```python\nresult = 1 + 1\n```\n";
        assert_eq!(extract_code(raw), "result = 1 + 1");
    }

    #[test]
    fn falls_back_to_any_fence() {
        let raw = "```\nresult = sum([1, 2, 3])\n```";
        assert_eq!(extract_code(raw), "result = sum([1, 2, 3])");
    }

    #[test]
    fn raw_text_is_used_when_unfenced() {
        assert_eq!(extract_code("  result = 42\n"), "result = 42");
    }

    #[test]
    fn strips_unterminated_fence() {
        let raw = "```python\nresult = 'abc'\n";
        assert_eq!(extract_code(raw), "result = 'abc'");
    }
}
