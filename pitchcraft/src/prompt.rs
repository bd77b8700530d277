//! Request assembly. The proposal copywriting lives with the caller; this
//! module only fixes the JSON contract the validator expects back.

use crate::types::{PromptContext, ProposalSection, SectionKind};

/// Rendered prompt text for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

/// Builds the request text from caller context and the requested sections.
pub trait PromptBuilder: Send + Sync {
    fn build(&self, context: &PromptContext, sections: &[ProposalSection]) -> Prompt;
}

const DEFAULT_SYSTEM: &str = "You write website redesign proposals for a web design agency. \
Respond with a single JSON object and nothing else.";

/// Shape hint for one section inside the JSON contract.
fn shape_hint(section: ProposalSection) -> &'static str {
    match section {
        ProposalSection::CurrentIssues => {
            concat!(
                r#"[{"title": string, "description": string, "impact": "high"|"medium"|"low", "#,
                r#""source": "audit"|"consultation"|"inferred"}]"#
            )
        }
        ProposalSection::PerformanceStandards => {
            r#"[{"metric": string, "target": string, "current": string, "description": string}]"#
        }
        ProposalSection::ProposedPages => {
            concat!(
                r#"[{"name": string, "purpose": string, "features": [string], "#,
                r#""priority": "essential"|"recommended"|"optional"}]"#
            )
        }
        ProposalSection::Timeline => {
            concat!(
                r#"[{"phase": string, "duration": string, "deliverables": [string], "#,
                r#""description": string}]"#
            )
        }
        ProposalSection::NextSteps => {
            r#"[{"action": string, "owner": "agency"|"client"|"both", "timeframe": string}]"#
        }
        ProposalSection::RoiAnalysis => {
            concat!(
                r#"{"disclaimer": string, "timePeriod": string, "assumptions": [string], "#,
                r#""projections": [{"metric": string, "currentValue": number, "#,
                r#""projectedValue": number, "unit": string, "rationale": string}]}"#
            )
        }
        _ => "string",
    }
}

/// Default builder: context as JSON plus an explicit output contract.
#[derive(Debug, Clone, Default)]
pub struct JsonContractPrompt {
    /// Replaces the built-in system prompt when set.
    pub system: Option<String>,
}

impl PromptBuilder for JsonContractPrompt {
    fn build(&self, context: &PromptContext, sections: &[ProposalSection]) -> Prompt {
        let context_json = serde_json::to_string_pretty(context)
            .unwrap_or_else(|_| context.business_name.clone());

        let mut user = String::new();
        user.push_str("Client context:\n");
        user.push_str(&context_json);
        user.push_str(
            "\n\nWrite the following proposal sections. \
             Return JSON with exactly these keys:\n",
        );
        for section in sections {
            let kind = match section.kind() {
                SectionKind::Prose => "prose",
                SectionKind::List => "list",
                SectionKind::Aggregate => "object",
            };
            user.push_str(&format!("- \"{}\" ({}): {}\n", section, kind, shape_hint(*section)));
        }
        if sections.contains(&ProposalSection::RoiAnalysis) {
            user.push_str(
                "\nOnly include ROI projections you can justify from the context; \
                 numbers must be plain JSON numbers.\n",
            );
        }

        Prompt {
            system: Some(self.system.clone().unwrap_or_else(|| DEFAULT_SYSTEM.to_string())),
            user,
        }
    }
}
