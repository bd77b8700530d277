use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Prompt context (supplied by the caller, opaque beyond serialization)
// ---------------------------------------------------------------------------

/// Findings from a website-performance audit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFindings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

/// Business and audit context a proposal is written from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptContext {
    pub business_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub challenges: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditFindings>,
    /// Anything else the intake form captured.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Shape of a section's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Prose,
    List,
    Aggregate,
}

/// One independently generatable unit of proposal content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProposalSection {
    ExecutiveSummary,
    OpportunityContent,
    CurrentIssues,
    PerformanceStandards,
    ProposedPages,
    Timeline,
    RoiAnalysis,
    NextSteps,
    ClosingContent,
}

impl ProposalSection {
    /// Every section, in document order.
    pub const ALL: [ProposalSection; 9] = [
        ProposalSection::ExecutiveSummary,
        ProposalSection::OpportunityContent,
        ProposalSection::CurrentIssues,
        ProposalSection::PerformanceStandards,
        ProposalSection::ProposedPages,
        ProposalSection::Timeline,
        ProposalSection::RoiAnalysis,
        ProposalSection::NextSteps,
        ProposalSection::ClosingContent,
    ];

    /// JSON key used for this section in model output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalSection::ExecutiveSummary => "executiveSummary",
            ProposalSection::OpportunityContent => "opportunityContent",
            ProposalSection::CurrentIssues => "currentIssues",
            ProposalSection::PerformanceStandards => "performanceStandards",
            ProposalSection::ProposedPages => "proposedPages",
            ProposalSection::Timeline => "timeline",
            ProposalSection::RoiAnalysis => "roiAnalysis",
            ProposalSection::NextSteps => "nextSteps",
            ProposalSection::ClosingContent => "closingContent",
        }
    }

    pub fn kind(&self) -> SectionKind {
        match self {
            ProposalSection::ExecutiveSummary
            | ProposalSection::OpportunityContent
            | ProposalSection::ClosingContent => SectionKind::Prose,
            ProposalSection::RoiAnalysis => SectionKind::Aggregate,
            _ => SectionKind::List,
        }
    }
}

impl fmt::Display for ProposalSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown proposal section: {0}")]
pub struct UnknownSection(pub String);

impl FromStr for ProposalSection {
    type Err = UnknownSection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ProposalSection::ALL
            .into_iter()
            .find(|section| section.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownSection(wanted.to_string()))
    }
}

/// Drop repeated sections, keeping first occurrences in order.
pub fn dedup_sections(sections: &[ProposalSection]) -> Vec<ProposalSection> {
    let mut out: Vec<ProposalSection> = Vec::with_capacity(sections.len());
    for section in sections {
        if !out.contains(section) {
            out.push(*section);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Section content
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    #[default]
    Medium,
    Low,
}

/// Where an issue was learned from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSource {
    Audit,
    Consultation,
    #[default]
    Inferred,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Essential,
    #[default]
    Recommended,
    Optional,
}

/// Who is responsible for a next step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Owner {
    #[default]
    Agency,
    Client,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentIssue {
    pub title: String,
    pub description: String,
    pub impact: Impact,
    pub source: IssueSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStandard {
    pub metric: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedPage {
    pub name: String,
    pub purpose: String,
    pub features: Vec<String>,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelinePhase {
    pub phase: String,
    pub duration: String,
    pub deliverables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStep {
    pub action: String,
    pub owner: Owner,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
}

/// A single financial projection. Never normalized: values are client-facing claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoiProjection {
    pub metric: String,
    pub current_value: f64,
    pub projected_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoiAnalysis {
    pub disclaimer: String,
    pub time_period: String,
    pub assumptions: Vec<String>,
    pub projections: Vec<RoiProjection>,
}

// ---------------------------------------------------------------------------
// Generated document
// ---------------------------------------------------------------------------

/// Validated model output. A `None` section failed generation or validation;
/// it is never a stand-in for empty content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executive_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opportunity_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_issues: Option<Vec<CurrentIssue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_standards: Option<Vec<PerformanceStandard>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_pages: Option<Vec<ProposedPage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Vec<TimelinePhase>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi_analysis: Option<RoiAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_steps: Option<Vec<NextStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closing_content: Option<String>,
}

impl GeneratedDocument {
    pub fn contains(&self, section: ProposalSection) -> bool {
        match section {
            ProposalSection::ExecutiveSummary => self.executive_summary.is_some(),
            ProposalSection::OpportunityContent => self.opportunity_content.is_some(),
            ProposalSection::CurrentIssues => self.current_issues.is_some(),
            ProposalSection::PerformanceStandards => self.performance_standards.is_some(),
            ProposalSection::ProposedPages => self.proposed_pages.is_some(),
            ProposalSection::Timeline => self.timeline.is_some(),
            ProposalSection::RoiAnalysis => self.roi_analysis.is_some(),
            ProposalSection::NextSteps => self.next_steps.is_some(),
            ProposalSection::ClosingContent => self.closing_content.is_some(),
        }
    }

    /// Sections present, in document order.
    pub fn sections(&self) -> Vec<ProposalSection> {
        ProposalSection::ALL
            .into_iter()
            .filter(|s| self.contains(*s))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sections().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear a single section.
    pub fn remove(&mut self, section: ProposalSection) {
        match section {
            ProposalSection::ExecutiveSummary => self.executive_summary = None,
            ProposalSection::OpportunityContent => self.opportunity_content = None,
            ProposalSection::CurrentIssues => self.current_issues = None,
            ProposalSection::PerformanceStandards => self.performance_standards = None,
            ProposalSection::ProposedPages => self.proposed_pages = None,
            ProposalSection::Timeline => self.timeline = None,
            ProposalSection::RoiAnalysis => self.roi_analysis = None,
            ProposalSection::NextSteps => self.next_steps = None,
            ProposalSection::ClosingContent => self.closing_content = None,
        }
    }

    /// Keep only the listed sections.
    pub fn retain(&mut self, keep: &[ProposalSection]) {
        for section in ProposalSection::ALL {
            if !keep.contains(&section) {
                self.remove(section);
            }
        }
    }

    /// Copy every section present in `other` over this document.
    pub fn absorb(&mut self, other: GeneratedDocument) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            executive_summary,
            opportunity_content,
            current_issues,
            performance_standards,
            proposed_pages,
            timeline,
            roi_analysis,
            next_steps,
            closing_content
        );
    }
}

// ---------------------------------------------------------------------------
// Usage & results
// ---------------------------------------------------------------------------

/// Token counters reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Add for Usage {
    type Output = Usage;

    fn add(self, rhs: Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens.saturating_add(rhs.input_tokens),
            output_tokens: self.output_tokens.saturating_add(rhs.output_tokens),
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Usage) {
        *self = *self + rhs;
    }
}

/// Sum two optional counters, keeping `None` only when both are absent.
pub(crate) fn sum_usage(a: Option<Usage>, b: Option<Usage>) -> Option<Usage> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + b),
        (a, None) => a,
        (None, b) => b,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub content: GeneratedDocument,
    pub is_partial: bool,
    pub generated_sections: Vec<ProposalSection>,
    pub failed_sections: Vec<ProposalSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Deduplicated request order, kept so merges can restore it.
    #[serde(skip)]
    requested: Vec<ProposalSection>,
}

impl GenerationResult {
    /// Partition `requested` by what `content` holds. `content` is trimmed to
    /// the requested sections.
    pub fn from_content(
        mut content: GeneratedDocument,
        requested: &[ProposalSection],
        usage: Option<Usage>,
    ) -> Self {
        let requested = dedup_sections(requested);
        content.retain(&requested);
        let (generated_sections, failed_sections): (Vec<_>, Vec<_>) =
            requested.iter().copied().partition(|s| content.contains(*s));
        Self {
            content,
            is_partial: !failed_sections.is_empty(),
            generated_sections,
            failed_sections,
            usage,
            requested,
        }
    }

    /// Requested sections in request order. Results that were deserialized
    /// rather than built here fall back to generated-then-failed.
    fn request_order(&self) -> Vec<ProposalSection> {
        if !self.requested.is_empty() {
            return self.requested.clone();
        }
        let mut order = self.generated_sections.clone();
        order.extend(self.failed_sections.iter().copied());
        order
    }

    /// Fold a regeneration of some previously failed sections into this result.
    pub fn merge(self, other: GenerationResult) -> GenerationResult {
        let mut requested = self.request_order();
        for section in other.request_order() {
            if !requested.contains(&section) {
                requested.push(section);
            }
        }

        let mut content = self.content;
        content.absorb(other.content);
        GenerationResult::from_content(content, &requested, sum_usage(self.usage, other.usage))
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Retries after the first attempt; `None` uses the configured count.
    pub max_retries: Option<u32>,
    pub allow_partial: bool,
    /// Overrides the configured model when set.
    pub model: Option<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_retries: None,
            allow_partial: true,
            model: None,
        }
    }
}

impl GenerateOptions {
    pub fn strict() -> Self {
        Self {
            allow_partial: false,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Provider wire types
// ---------------------------------------------------------------------------

/// One completion request, already rendered to text.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u64,
    pub temperature: Option<f64>,
}

/// Per-call credentials and transport settings.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub api_key: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    #[default]
    Stop,
    Length,
    Refusal,
    Other,
}

/// What the provider returned for one call. `text` is `None` when the
/// response carried no textual content block.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: Option<String>,
    pub model: String,
    pub usage: Option<Usage>,
    pub stop_reason: StopReason,
}

/// Incremental provider output.
#[derive(Debug, Clone)]
pub enum CompletionEvent {
    TextDelta(String),
    Done(Completion),
}

// ---------------------------------------------------------------------------
// Stream events surfaced to callers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEvent {
    Chunk {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Done {
        content: GeneratedDocument,
        generated_sections: Vec<ProposalSection>,
        failed_sections: Vec<ProposalSection>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    Error {
        code: crate::error::ErrorCode,
        message: String,
    },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Chunk { .. })
    }
}
