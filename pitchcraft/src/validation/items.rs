//! Per-item validators for list sections and the ROI aggregate.
//!
//! List items are lenient: only the identifying field is mandatory, everything
//! else is normalised. ROI projections are strict because they end up as
//! financial claims in front of a client.

use super::normalize;
use crate::types::{
    CurrentIssue, NextStep, PerformanceStandard, ProposedPage, RoiAnalysis, RoiProjection,
    TimelinePhase,
};
use serde_json::{Map, Value};

/// First of `keys` holding a non-blank string.
fn identifying(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

/// First of `keys` that coerces to text.
fn any_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| normalize::text(obj.get(*k)))
}

pub fn current_issue(value: &Value) -> Option<CurrentIssue> {
    let obj = value.as_object()?;
    Some(CurrentIssue {
        title: identifying(obj, &["title"])?,
        description: any_text(obj, &["description", "details"]).unwrap_or_default(),
        impact: normalize::impact(obj.get("impact")),
        source: normalize::source(obj.get("source")),
    })
}

pub fn performance_standard(value: &Value) -> Option<PerformanceStandard> {
    let obj = value.as_object()?;
    Some(PerformanceStandard {
        metric: identifying(obj, &["metric", "name"])?,
        target: any_text(obj, &["target", "goal"]).unwrap_or_default(),
        current: any_text(obj, &["current", "currentValue"]),
        description: any_text(obj, &["description"]).unwrap_or_default(),
    })
}

pub fn proposed_page(value: &Value) -> Option<ProposedPage> {
    let obj = value.as_object()?;
    Some(ProposedPage {
        name: identifying(obj, &["name"])?,
        purpose: any_text(obj, &["purpose", "description"]).unwrap_or_default(),
        features: normalize::list(obj.get("features")),
        priority: normalize::priority(obj.get("priority")),
    })
}

pub fn timeline_phase(value: &Value) -> Option<TimelinePhase> {
    let obj = value.as_object()?;
    Some(TimelinePhase {
        phase: identifying(obj, &["phase"])?,
        duration: any_text(obj, &["duration"]).unwrap_or_default(),
        deliverables: normalize::list(obj.get("deliverables")),
        description: any_text(obj, &["description"]),
    })
}

pub fn next_step(value: &Value) -> Option<NextStep> {
    let obj = value.as_object()?;
    Some(NextStep {
        action: identifying(obj, &["action"])?,
        owner: normalize::owner(obj.get("owner")),
        timeframe: any_text(obj, &["timeframe", "deadline"]),
    })
}

/// Filter an array through `validate`. `None` when the value is not an array.
pub fn list_of<T>(value: &Value, validate: fn(&Value) -> Option<T>) -> Option<Vec<T>> {
    let items = value.as_array()?;
    let kept: Vec<T> = items.iter().filter_map(validate).collect();
    if kept.len() < items.len() {
        tracing::debug!(
            dropped = items.len() - kept.len(),
            kept = kept.len(),
            "dropped list items missing their identifying field"
        );
    }
    Some(kept)
}

/// Optional string field: absent or null is fine, any other type is not.
fn optional_string(obj: &Map<String, Value>, key: &str) -> Result<Option<String>, ()> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(()),
    }
}

pub fn roi_projection(value: &Value) -> Option<RoiProjection> {
    let obj = value.as_object()?;
    let metric = obj.get("metric")?.as_str()?.to_string();
    let current_value = obj.get("currentValue").filter(|v| v.is_number())?.as_f64()?;
    let projected_value = obj.get("projectedValue").filter(|v| v.is_number())?.as_f64()?;
    Some(RoiProjection {
        metric,
        current_value,
        projected_value,
        unit: optional_string(obj, "unit").ok()?,
        rationale: optional_string(obj, "rationale").ok()?,
    })
}

/// The ROI section is all-or-nothing on its top-level fields.
pub fn roi_analysis(value: &Value) -> Option<RoiAnalysis> {
    let obj = value.as_object()?;
    let disclaimer = obj.get("disclaimer")?.as_str()?.to_string();
    let time_period = obj.get("timePeriod")?.as_str()?.to_string();
    let assumptions = obj
        .get("assumptions")?
        .as_array()?
        .iter()
        .map(|a| a.as_str().map(String::from))
        .collect::<Option<Vec<String>>>()?;
    let raw_projections = obj.get("projections")?.as_array()?;
    let projections: Vec<RoiProjection> =
        raw_projections.iter().filter_map(roi_projection).collect();
    if projections.len() < raw_projections.len() {
        tracing::debug!(
            dropped = raw_projections.len() - projections.len(),
            "dropped malformed ROI projections"
        );
    }

    Some(RoiAnalysis {
        disclaimer,
        time_period,
        assumptions,
        projections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Impact, IssueSource, Owner, Priority};
    use serde_json::json;

    #[test]
    fn issue_without_title_is_dropped() {
        assert!(current_issue(&json!({"description": "slow", "impact": "high"})).is_none());
        assert!(current_issue(&json!({"title": 5})).is_none());
        assert!(current_issue(&json!({"title": "   "})).is_none());
        assert!(current_issue(&json!("just a string")).is_none());
    }

    #[test]
    fn issue_fields_are_normalised() {
        let issue = current_issue(&json!({
            "title": "Slow mobile load",
            "description": ["LCP 6.1s", "no caching"],
            "impact": "CRITICAL",
            "source": "Lighthouse audit"
        }))
        .unwrap();
        assert_eq!(issue.title, "Slow mobile load");
        assert_eq!(issue.description, "LCP 6.1s, no caching");
        assert_eq!(issue.impact, Impact::High);
        assert_eq!(issue.source, IssueSource::Audit);
    }

    #[test]
    fn standard_accepts_name_in_place_of_metric() {
        let std = performance_standard(&json!({"name": "LCP", "target": "< 2.5s"})).unwrap();
        assert_eq!(std.metric, "LCP");
        assert_eq!(std.target, "< 2.5s");
        assert_eq!(std.current, None);
        assert!(performance_standard(&json!({"target": "< 2.5s"})).is_none());
    }

    #[test]
    fn page_features_split_from_string() {
        let page = proposed_page(&json!({
            "name": "Services",
            "purpose": "Explain offerings",
            "features": "pricing table, FAQ",
            "priority": "nice-to-have"
        }))
        .unwrap();
        assert_eq!(page.features, vec!["pricing table", "FAQ"]);
        assert_eq!(page.priority, Priority::Optional);
    }

    #[test]
    fn timeline_and_next_step_defaults() {
        let phase = timeline_phase(&json!({"phase": "Discovery"})).unwrap();
        assert_eq!(phase.duration, "");
        assert!(phase.deliverables.is_empty());

        let step = next_step(&json!({"action": "Sign proposal", "owner": 7})).unwrap();
        assert_eq!(step.owner, Owner::Agency);
        assert!(next_step(&json!({"owner": "client"})).is_none());
    }

    #[test]
    fn list_of_rejects_non_arrays() {
        assert!(list_of(&json!({"title": "x"}), current_issue).is_none());
        let kept = list_of(&json!([{"title": "a"}, {"nope": 1}, {"title": "b"}]), current_issue);
        assert_eq!(kept.map(|v| v.len()), Some(2));
    }

    #[test]
    fn projections_are_type_guarded_not_coerced() {
        let leads = |current: Value, projected: Value| {
            json!({"metric": "Leads", "currentValue": current, "projectedValue": projected})
        };
        assert!(roi_projection(&leads(json!(10), json!(25))).is_some());
        assert!(roi_projection(&leads(json!("10"), json!(25))).is_none());
        assert!(roi_projection(&json!({"metric": "Leads", "currentValue": 10})).is_none());
        let mut bad_unit = leads(json!(10), json!(25));
        bad_unit["unit"] = json!(5);
        assert!(roi_projection(&bad_unit).is_none());
        let p = roi_projection(&json!({
            "metric": "Revenue",
            "currentValue": 1.5,
            "projectedValue": 2.25,
            "unit": "USD",
            "rationale": null
        }))
        .unwrap();
        assert_eq!(p.unit.as_deref(), Some("USD"));
        assert_eq!(p.rationale, None);
    }

    #[test]
    fn roi_requires_every_top_level_field() {
        let full = json!({
            "disclaimer": "Estimates only",
            "timePeriod": "12 months",
            "assumptions": ["2% conversion"],
            "projections": [
                {"metric": "Leads", "currentValue": 10, "projectedValue": 25},
                {"metric": "Revenue", "currentValue": "lots", "projectedValue": 5}
            ]
        });
        let roi = roi_analysis(&full).unwrap();
        assert_eq!(roi.projections.len(), 1);

        for key in ["disclaimer", "timePeriod", "assumptions", "projections"] {
            let mut partial = full.clone();
            partial.as_object_mut().unwrap().remove(key);
            assert!(roi_analysis(&partial).is_none(), "missing {key}");
        }

        let mut bad_assumptions = full.clone();
        bad_assumptions["assumptions"] = json!(["ok", 3]);
        assert!(roi_analysis(&bad_assumptions).is_none());
    }
}
