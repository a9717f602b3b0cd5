//! Selector resolution engine.
//!
//! Walks a selector path step by step from an anchor element, classifying
//! every miss: structural problems (`InvalidSelector`, `InvalidControlType`)
//! are caught before any tree traversal, runtime outcomes are classified as
//! zero (`NotFound`), many-without-index (`Ambiguous`) or bad index
//! (`IndexOutOfRange`).

use std::collections::BTreeMap;

use crate::controls::ControlType;
use crate::errors::{ErrorKind, RpcError};
use crate::provider::ElementHandle;
use crate::selector::{matches_text, ElementSelector, SearchScope, SelectorStep};

/// Classified resolution failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindFailureKind {
    InvalidSelector,
    InvalidControlType,
    NotFound,
    Ambiguous,
    IndexOutOfRange,
}

impl FindFailureKind {
    pub fn name(&self) -> &'static str {
        match self {
            FindFailureKind::InvalidSelector => "InvalidSelector",
            FindFailureKind::InvalidControlType => "InvalidControlType",
            FindFailureKind::NotFound => "NotFound",
            FindFailureKind::Ambiguous => "Ambiguous",
            FindFailureKind::IndexOutOfRange => "IndexOutOfRange",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindFailure {
    pub kind: FindFailureKind,
    pub details: BTreeMap<String, String>,
}

impl FindFailure {
    fn new(kind: FindFailureKind) -> Self {
        Self {
            kind,
            details: BTreeMap::new(),
        }
    }

    fn detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// A provider-level miss (e.g. the main window itself is gone) counts as
    /// `NotFound` for classification purposes.
    pub fn provider_miss(error: &crate::errors::ProviderError) -> Self {
        Self::new(FindFailureKind::NotFound).detail("providerError", error.to_string())
    }

    /// Map into the RPC taxonomy. Structural failures are the caller's fault
    /// (`InvalidArgument`); runtime misses are `FindError`. The original
    /// finder kind is preserved in `details.failureKind`.
    pub fn into_rpc_error(self) -> RpcError {
        let mut details = self.details;
        details.insert("failureKind".to_string(), self.kind.name().to_string());
        match self.kind {
            FindFailureKind::InvalidSelector => {
                RpcError::with_details(ErrorKind::InvalidArgument, "Invalid selector", details)
            }
            FindFailureKind::InvalidControlType => {
                RpcError::with_details(ErrorKind::InvalidArgument, "Invalid control type", details)
            }
            FindFailureKind::IndexOutOfRange => RpcError::with_details(
                ErrorKind::InvalidArgument,
                "Selector index out of range",
                details,
            ),
            FindFailureKind::Ambiguous => RpcError::with_details(
                ErrorKind::FindError,
                "Selector matched multiple elements",
                details,
            ),
            FindFailureKind::NotFound => {
                RpcError::with_details(ErrorKind::FindError, "Element not found", details)
            }
        }
    }
}

/// Structural validation of a whole selector, run once before any tree
/// query. Returns the first problem in path order.
pub fn validate(selector: &ElementSelector) -> Result<(), FindFailure> {
    if selector.path.is_empty() {
        return Err(FindFailure::new(FindFailureKind::InvalidSelector)
            .detail("reason", "selector path must contain at least 1 step"));
    }

    for (i, step) in selector.path.iter().enumerate() {
        if !step.has_any_filter() {
            return Err(FindFailure::new(FindFailureKind::InvalidSelector)
                .detail("stepIndex", i.to_string())
                .detail(
                    "reason",
                    "each selector step must specify at least one filter \
                     (automationId/name/className/controlType)",
                ));
        }
        if let Some(name) = step.control_type.as_deref().filter(|s| !s.trim().is_empty()) {
            if ControlType::from_name(name).is_none() {
                return Err(FindFailure::new(FindFailureKind::InvalidControlType)
                    .detail("stepIndex", i.to_string())
                    .detail("controlType", name));
            }
        }
    }

    Ok(())
}

/// Resolve a selector under `anchor`. Single attempt, no waiting; the poll
/// primitive wraps this where a timeout applies.
pub fn resolve(
    anchor: &dyn ElementHandle,
    selector: &ElementSelector,
) -> Result<Box<dyn ElementHandle>, FindFailure> {
    validate(selector)?;

    let mut current: Option<Box<dyn ElementHandle>> = None;
    for (i, step) in selector.path.iter().enumerate() {
        let anchor_ref: &dyn ElementHandle = match &current {
            Some(element) => element.as_ref(),
            None => anchor,
        };
        let selected = resolve_step(anchor_ref, step, i)?;
        current = Some(selected);
    }

    // validate() rejected the empty path, so a step always ran.
    Ok(current.expect("selector path is non-empty"))
}

fn resolve_step(
    anchor: &dyn ElementHandle,
    step: &SelectorStep,
    step_index: usize,
) -> Result<Box<dyn ElementHandle>, FindFailure> {
    let control_type = step
        .control_type
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .and_then(ControlType::from_name);

    let candidates = match step.search {
        SearchScope::Children => anchor.children(),
        SearchScope::Descendants => anchor.descendants(),
    }
    .map_err(|e| {
        FindFailure::new(FindFailureKind::NotFound)
            .detail("stepIndex", step_index.to_string())
            .detail("providerError", e.to_string())
    })?;

    let matches: Vec<Box<dyn ElementHandle>> = candidates
        .into_iter()
        .filter(|candidate| matches_step(candidate.as_ref(), step, control_type))
        .collect();

    if matches.is_empty() {
        return Err(FindFailure::new(FindFailureKind::NotFound)
            .detail("stepIndex", step_index.to_string()));
    }

    match step.index {
        Some(index) => {
            if index >= matches.len() {
                return Err(FindFailure::new(FindFailureKind::IndexOutOfRange)
                    .detail("stepIndex", step_index.to_string())
                    .detail("index", index.to_string())
                    .detail("matches", matches.len().to_string()));
            }
            // Deterministic pick in provider enumeration order.
            Ok(matches.into_iter().nth(index).expect("index checked"))
        }
        None => {
            if matches.len() != 1 {
                return Err(FindFailure::new(FindFailureKind::Ambiguous)
                    .detail("stepIndex", step_index.to_string())
                    .detail("matches", matches.len().to_string())
                    .detail(
                        "hint",
                        "specify step.index to select one element deterministically",
                    ));
            }
            Ok(matches.into_iter().next().expect("exactly one match"))
        }
    }
}

fn matches_step(
    element: &dyn ElementHandle,
    step: &SelectorStep,
    control_type: Option<ControlType>,
) -> bool {
    if !matches_text(
        &element.automation_id(),
        step.automation_id.as_deref(),
        step.automation_id_contains.as_deref(),
        step.ignore_case,
        false,
    ) {
        return false;
    }

    if !matches_text(
        &element.name(),
        step.name.as_deref(),
        step.name_contains.as_deref(),
        step.ignore_case,
        step.normalize_whitespace,
    ) {
        return false;
    }

    if !matches_text(
        &element.class_name(),
        step.class_name.as_deref(),
        step.class_name_contains.as_deref(),
        step.ignore_case,
        false,
    ) {
        return false;
    }

    if let Some(expected) = control_type {
        if element.control_type() != Some(expected) {
            return false;
        }
    }

    true
}
