//! Locate the JSON object inside raw model output.

use regex::Regex;
use std::sync::LazyLock;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```[A-Za-z0-9_-]*[ \t]*\r?\n?([\s\S]*?)```").expect("code fence pattern")
});

/// Return the slice of `raw` most likely to hold the JSON payload.
///
/// A fenced code block wins. Otherwise, text that does not already start
/// with `{` is cut to the span between the first `{` and the last `}`.
pub fn locate_json(raw: &str) -> &str {
    if let Some(inner) = CODE_FENCE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|inner| !inner.is_empty())
    {
        return inner;
    }

    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return trimmed;
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Pull one top-level string field out of text that may not parse as JSON.
pub fn string_field(raw: &str, field: &str) -> Option<String> {
    let pattern = format!(r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)""#, regex::escape(field));
    let re = Regex::new(&pattern).ok()?;
    let escaped = re.captures(raw)?.get(1)?.as_str();
    // Reuse the JSON string decoder for escapes; keep the raw text if it balks.
    let decoded = serde_json::from_str::<String>(&format!("\"{escaped}\""))
        .unwrap_or_else(|_| escaped.to_string());
    Some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_fenced_block() {
        let raw = "Sure! Here you go:\n```json\n{\"a\": 1}\n```\nAnything else? {\"b\": 2}";
        assert_eq!(locate_json(raw), "{\"a\": 1}");
    }

    #[test]
    fn fence_without_language_tag() {
        assert_eq!(locate_json("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn trims_prose_around_braces() {
        let raw = "Here is the proposal: {\"a\": {\"b\": 1}} Hope that helps.";
        assert_eq!(locate_json(raw), "{\"a\": {\"b\": 1}}");
    }

    #[test]
    fn leaves_object_text_alone() {
        assert_eq!(locate_json("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn no_braces_returns_trimmed_text() {
        assert_eq!(locate_json(" not json at all "), "not json at all");
        assert_eq!(locate_json("[1, 2]"), "[1, 2]");
    }

    #[test]
    fn unterminated_fence_falls_back_to_braces() {
        assert_eq!(locate_json("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn string_field_decodes_escapes() {
        let raw = r#"{"executiveSummary": "Line \"one\"\nLine two", "timeline": [ {"#;
        assert_eq!(
            string_field(raw, "executiveSummary"),
            Some("Line \"one\"\nLine two".to_string())
        );
        assert_eq!(string_field(raw, "closingContent"), None);
    }

    #[test]
    fn string_field_ignores_non_string_values() {
        assert_eq!(string_field(r#"{"closingContent": 12}"#, "closingContent"), None);
    }
}
