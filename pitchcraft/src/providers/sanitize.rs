//! Keep secrets and oversized payloads out of error values and logs.

/// Longest provider error body kept on an error.
pub const MAX_API_ERROR_CHARS: usize = 200;

/// Longest slice of raw model output attached to a validation error.
pub const MAX_DETAIL_CHARS: usize = 500;

const SECRET_PREFIXES: [&str; 3] = ["sk-", "xoxb-", "xoxp-"];
const REDACTED: &str = "[REDACTED]";

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

/// Replace API-key-looking tokens (`sk-...`, Slack tokens) with `[REDACTED]`.
pub fn scrub_secret_patterns(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    'scan: while !rest.is_empty() {
        for prefix in SECRET_PREFIXES {
            if let Some(tail) = rest.strip_prefix(prefix) {
                let token_len = tail
                    .char_indices()
                    .find(|(_, c)| !is_token_char(*c))
                    .map(|(i, _)| i)
                    .unwrap_or(tail.len());
                if token_len > 0 {
                    out.push_str(REDACTED);
                    rest = &tail[token_len..];
                    continue 'scan;
                }
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }

    out
}

/// Cut `input` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &input[..byte_idx]),
        None => input.to_string(),
    }
}

/// Scrub secrets from a provider error body and bound its length.
pub fn sanitize_api_error(input: &str) -> String {
    truncate(&scrub_secret_patterns(input), MAX_API_ERROR_CHARS)
}
