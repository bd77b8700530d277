//! Lenient coercion of loosely-typed model fields.
//!
//! Enum-like fields go through small keyword tables matched against the
//! lower-cased words of the raw value; the first category with a matching
//! keyword wins. Anything unrecognised falls back to the type's `Default`.

use crate::types::{Impact, IssueSource, Owner, Priority};
use serde_json::Value;

/// Ordered keyword table; earlier rows take precedence.
///
/// Keywords match whole words (`"phase 2"` matches two consecutive words).
/// A trailing `*` turns a keyword into a stem matching any word it starts.
type KeywordTable<T> = &'static [(T, &'static [&'static str])];

const IMPACT_KEYWORDS: KeywordTable<Impact> = &[
    (Impact::High, &["high", "highest", "critical", "severe", "major", "urgent"]),
    (Impact::Low, &["low", "lowest", "minor", "minimal", "small"]),
    (Impact::Medium, &["medium", "moderate", "mid"]),
];

const SOURCE_KEYWORDS: KeywordTable<IssueSource> = &[
    (
        IssueSource::Audit,
        &["audit*", "pagespeed", "lighthouse", "scan*", "measured", "crawl*", "analytics"],
    ),
    (
        IssueSource::Consultation,
        &[
            "consult*",
            "client",
            "interview*",
            "discovery",
            "stated",
            "meeting",
            "kickoff",
            "intake",
            "questionnaire",
        ],
    ),
    (IssueSource::Inferred, &["infer*", "assum*", "observ*", "estimat*"]),
];

const PRIORITY_KEYWORDS: KeywordTable<Priority> = &[
    (
        Priority::Essential,
        &["essential", "must", "required", "critical", "core", "high"],
    ),
    (
        Priority::Optional,
        &["optional", "nice", "future", "later", "low", "phase 2"],
    ),
    (Priority::Recommended, &["recommend*", "should", "medium"]),
];

const OWNER_KEYWORDS: KeywordTable<Owner> = &[
    (Owner::Both, &["both", "joint*", "together", "shared", "mutual*"]),
    (Owner::Client, &["client*", "customer*", "owner", "you", "your"]),
    (Owner::Agency, &["agency", "we", "us", "our", "team", "studio"]),
];

/// Lower-cased words of `raw`, space-separated with a space at each end.
fn words(raw: &str) -> String {
    let mut out = String::from(" ");
    for word in raw.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        out.push_str(&word.to_lowercase());
        out.push(' ');
    }
    out
}

fn matches(words: &str, keyword: &str) -> bool {
    match keyword.strip_suffix('*') {
        Some(stem) => words.contains(&format!(" {stem}")),
        None => words.contains(&format!(" {keyword} ")),
    }
}

fn lookup<T: Copy + Default>(table: KeywordTable<T>, raw: &str) -> T {
    let words = words(raw);
    table
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| matches(&words, k)))
        .map(|(category, _)| *category)
        .unwrap_or_default()
}

fn lookup_value<T: Copy + Default>(table: KeywordTable<T>, value: Option<&Value>) -> T {
    match value {
        Some(Value::String(s)) => lookup(table, s),
        _ => T::default(),
    }
}

pub fn impact(value: Option<&Value>) -> Impact {
    lookup_value(IMPACT_KEYWORDS, value)
}

pub fn source(value: Option<&Value>) -> IssueSource {
    lookup_value(SOURCE_KEYWORDS, value)
}

pub fn priority(value: Option<&Value>) -> Priority {
    lookup_value(PRIORITY_KEYWORDS, value)
}

pub fn owner(value: Option<&Value>) -> Owner {
    lookup_value(OWNER_KEYWORDS, value)
}

fn stringify(value: &Value) -> Option<String> {
    let s = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!s.is_empty()).then_some(s)
}

/// Canonicalise a free-text field to a single string. Arrays are joined.
pub fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(stringify).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Object(_) => None,
        other => stringify(other),
    }
}

/// Canonicalise a free-text field to a list. Strings are split on commas.
pub fn list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(stringify).collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}
