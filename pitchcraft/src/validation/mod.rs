//! Turn raw model output into a [`GeneratedDocument`].
//!
//! Each section is validated on its own: a malformed section is omitted
//! without affecting its siblings. Whether an omission is fatal is decided
//! afterwards from [`ParseOptions`].

pub mod extract;
pub mod items;
pub mod normalize;

use crate::error::AiServiceError;
use crate::types::{GeneratedDocument, ProposalSection};
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Return whatever validated instead of failing on omissions.
    pub allow_partial: bool,
    /// Sections that must be present when `allow_partial` is false.
    pub required_sections: Option<Vec<ProposalSection>>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            allow_partial: true,
            required_sections: None,
        }
    }
}

impl ParseOptions {
    pub fn strict(required: &[ProposalSection]) -> Self {
        Self {
            allow_partial: false,
            required_sections: Some(required.to_vec()),
        }
    }
}

/// Parse and validate raw model output.
pub fn parse_ai_response(
    raw: &str,
    options: &ParseOptions,
) -> Result<GeneratedDocument, AiServiceError> {
    if raw.trim().is_empty() {
        return Err(AiServiceError::empty_response());
    }

    let candidate = extract::locate_json(raw);
    let value: Value =
        serde_json::from_str(candidate).map_err(|e| AiServiceError::invalid_json(e, raw))?;
    let Value::Object(obj) = value else {
        return Err(AiServiceError::schema_mismatch(format!(
            "Expected a JSON object at the top level, got {}",
            json_type(&value)
        )));
    };

    let document = validate_sections(&obj);

    if !options.allow_partial {
        if let Some(required) = &options.required_sections {
            let missing: Vec<&str> = required
                .iter()
                .filter(|s| !document.contains(**s))
                .map(ProposalSection::as_str)
                .collect();
            if !missing.is_empty() {
                return Err(AiServiceError::missing_fields(&missing));
            }
        }
        if document.is_empty() {
            return Err(AiServiceError::schema_mismatch(
                "Model response contained no recognisable sections",
            ));
        }
    }

    Ok(document)
}

/// Best-effort recovery that never fails. Falls back to pulling the two
/// prose fields out with patterns when the payload does not parse.
pub fn extract_partial(raw: &str) -> GeneratedDocument {
    match parse_ai_response(raw, &ParseOptions::default()) {
        Ok(document) => document,
        Err(err) => {
            tracing::debug!(code = %err.code, "full parse failed, extracting prose fields");
            GeneratedDocument {
                executive_summary: extract::string_field(
                    raw,
                    ProposalSection::ExecutiveSummary.as_str(),
                ),
                closing_content: extract::string_field(
                    raw,
                    ProposalSection::ClosingContent.as_str(),
                ),
                ..Default::default()
            }
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn prose(obj: &Map<String, Value>, section: ProposalSection) -> Option<String> {
    obj.get(section.as_str())
        .and_then(Value::as_str)
        .map(String::from)
}

fn validate_sections(obj: &Map<String, Value>) -> GeneratedDocument {
    let field = |section: ProposalSection| obj.get(section.as_str());

    let document = GeneratedDocument {
        executive_summary: prose(obj, ProposalSection::ExecutiveSummary),
        opportunity_content: prose(obj, ProposalSection::OpportunityContent),
        closing_content: prose(obj, ProposalSection::ClosingContent),
        current_issues: field(ProposalSection::CurrentIssues)
            .and_then(|v| items::list_of(v, items::current_issue)),
        performance_standards: field(ProposalSection::PerformanceStandards)
            .and_then(|v| items::list_of(v, items::performance_standard)),
        proposed_pages: field(ProposalSection::ProposedPages)
            .and_then(|v| items::list_of(v, items::proposed_page)),
        timeline: field(ProposalSection::Timeline)
            .and_then(|v| items::list_of(v, items::timeline_phase)),
        next_steps: field(ProposalSection::NextSteps)
            .and_then(|v| items::list_of(v, items::next_step)),
        roi_analysis: field(ProposalSection::RoiAnalysis).and_then(items::roi_analysis),
    };

    for section in ProposalSection::ALL {
        if obj.contains_key(section.as_str()) && !document.contains(section) {
            tracing::warn!(section = %section, "section failed validation and was omitted");
        }
    }

    document
}
