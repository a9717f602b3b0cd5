//! Declarative element selectors.
//!
//! A selector is an ordered path of filter steps: each step narrows the
//! search under the element the previous step resolved. Selectors travel as
//! JSON and are shared with external protocol clients, so field names are
//! part of the wire contract.

use serde::{Deserialize, Serialize};

/// Search scope for one selector step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchScope {
    /// All descendants of the current anchor. More robust, but slower and
    /// more likely to match several elements.
    #[default]
    Descendants,
    /// Direct children of the current anchor only.
    Children,
}

/// One hop of a selector path.
///
/// At least one filter field must be set; a filterless step is a structural
/// error, not a runtime miss.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectorStep {
    pub search: SearchScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation_id_contains: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_contains: Option<String>,
    /// Collapse whitespace runs to single spaces and trim before comparing.
    /// Applies to the name filters only.
    pub normalize_whitespace: bool,
    /// Case-insensitive comparison for all string filters.
    pub ignore_case: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name_contains: Option<String>,
    /// Control-type name, resolved against the static table in
    /// [`crate::controls`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_type: Option<String>,
    /// 0-based pick when several candidates survive filtering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

/// Ordered, non-empty sequence of steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementSelector {
    pub path: Vec<SelectorStep>,
}

impl ElementSelector {
    pub fn new(path: Vec<SelectorStep>) -> Self {
        Self { path }
    }

    /// Summarize which fields will match exact rather than contains, for
    /// step-log evidence. Returns `None` when no field sets both variants.
    pub fn describe_match_rules(&self) -> Option<String> {
        let mut rules = Vec::new();
        for (i, step) in self.path.iter().enumerate() {
            if is_set(&step.automation_id) && is_set(&step.automation_id_contains) {
                rules.push(format!("step{i}.AutomationId=exact"));
            }
            if is_set(&step.name) && is_set(&step.name_contains) {
                rules.push(format!("step{i}.Name=exact"));
            }
            if is_set(&step.class_name) && is_set(&step.class_name_contains) {
                rules.push(format!("step{i}.ClassName=exact"));
            }
        }
        if rules.is_empty() {
            None
        } else {
            Some(rules.join(";"))
        }
    }
}

impl SelectorStep {
    /// True when any filter field is configured. `control_type` counts even
    /// before table resolution; an unknown name is reported separately.
    pub fn has_any_filter(&self) -> bool {
        is_set(&self.automation_id)
            || is_set(&self.automation_id_contains)
            || is_set(&self.name)
            || is_set(&self.name_contains)
            || is_set(&self.class_name)
            || is_set(&self.class_name_contains)
            || is_set(&self.control_type)
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// Field matching shared by the resolution engine: exact match takes
/// precedence over contains when both are configured.
pub(crate) fn matches_text(
    actual: &str,
    exact: Option<&str>,
    contains: Option<&str>,
    ignore_case: bool,
    normalize_whitespace: bool,
) -> bool {
    let norm = |s: &str| -> String {
        if normalize_whitespace {
            collapse_whitespace(s)
        } else {
            s.to_string()
        }
    };
    let fold = |s: String| -> String {
        if ignore_case {
            s.to_lowercase()
        } else {
            s
        }
    };

    let actual = fold(norm(actual));

    if let Some(exact) = exact.filter(|s| !s.trim().is_empty()) {
        return actual == fold(norm(exact));
    }
    if let Some(contains) = contains.filter(|s| !s.trim().is_empty()) {
        return actual.contains(&fold(norm(contains)));
    }
    true
}

/// Whitespace runs become single spaces; leading/trailing whitespace is
/// dropped.
pub(crate) fn collapse_whitespace(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_whitespace = false;
    for c in value.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push(' ');
                in_whitespace = true;
            }
        } else {
            out.push(c);
            in_whitespace = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_wins_over_contains() {
        // Both configured: contains would match, exact does not.
        assert!(!matches_text(
            "Save As",
            Some("Save"),
            Some("Save"),
            false,
            false
        ));
        assert!(matches_text("Save", Some("Save"), Some("nope"), false, false));
    }

    #[test]
    fn contains_applies_when_no_exact() {
        assert!(matches_text("Save As", None, Some("ve A"), false, false));
        assert!(!matches_text("Save As", None, Some("open"), false, false));
    }

    #[test]
    fn blank_filters_match_everything() {
        assert!(matches_text("anything", None, None, false, false));
        assert!(matches_text("anything", Some("  "), Some(""), false, false));
    }

    #[test]
    fn ignore_case_folds_both_sides() {
        assert!(matches_text("OK", Some("ok"), None, true, false));
        assert!(!matches_text("OK", Some("ok"), None, false, false));
        assert!(matches_text("Cancel All", None, Some("cancel"), true, false));
    }

    #[test]
    fn whitespace_normalization_collapses_runs() {
        assert!(matches_text(
            "  Import \t Variables ",
            Some("Import Variables"),
            None,
            false,
            true
        ));
        assert_eq!(collapse_whitespace(" a \n b\t\tc "), "a b c");
    }

    #[test]
    fn filterless_step_is_detected() {
        let mut step = SelectorStep::default();
        assert!(!step.has_any_filter());
        step.name_contains = Some("OK".into());
        assert!(step.has_any_filter());

        let blank = SelectorStep {
            name: Some("   ".into()),
            ..Default::default()
        };
        assert!(!blank.has_any_filter());
    }

    #[test]
    fn match_rules_only_reported_when_both_variants_set() {
        let selector = ElementSelector::new(vec![
            SelectorStep {
                name: Some("OK".into()),
                ..Default::default()
            },
            SelectorStep {
                name: Some("OK".into()),
                name_contains: Some("O".into()),
                class_name: Some("Button".into()),
                class_name_contains: Some("But".into()),
                ..Default::default()
            },
        ]);
        assert_eq!(
            selector.describe_match_rules().unwrap(),
            "step1.Name=exact;step1.ClassName=exact"
        );
        assert!(ElementSelector::default().describe_match_rules().is_none());
    }

    #[test]
    fn wire_shape_round_trips() {
        let json = serde_json::json!({
            "path": [{
                "search": "Children",
                "controlType": "Button",
                "name": "7",
                "index": 0
            }]
        });
        let selector: ElementSelector = serde_json::from_value(json).unwrap();
        assert_eq!(selector.path[0].search, SearchScope::Children);
        assert_eq!(selector.path[0].control_type.as_deref(), Some("Button"));
        assert_eq!(selector.path[0].index, Some(0));
    }
}
