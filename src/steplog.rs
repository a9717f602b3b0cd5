//! Ordered, timestamped evidence trail attached to every RPC result.
//!
//! Entries are only ever appended on the scheduler's owning thread, so the
//! log needs no internal synchronization and is strictly ordered within one
//! call.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::RpcError;
use crate::selector::ElementSelector;

/// Outcome of a single recorded step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Success,
    /// The step failed but its parent call carried on (best-effort actions).
    Warning,
    Fail,
}

/// One observable sub-action taken while servicing an RPC call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLogEntry {
    pub step_id: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<ElementSelector>,
    pub started_at_utc: DateTime<Utc>,
    pub finished_at_utc: DateTime<Utc>,
    pub duration_ms: i64,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// Evidence trail for one RPC call, in execution order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLog {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub steps: Vec<StepLogEntry>,
}

/// Handle to an in-flight step; finish it with exactly one of the mark
/// methods on [`StepLog`].
#[derive(Debug, Clone, Copy)]
pub struct StepHandle(usize);

impl StepLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a step. A step left unfinished keeps `Outcome::Fail`, which is the
    /// conservative default when an operation body returns early.
    pub fn start(
        &mut self,
        step_id: &str,
        action: &str,
        selector: Option<&ElementSelector>,
        mut parameters: Option<BTreeMap<String, String>>,
    ) -> StepHandle {
        if let Some(sel) = selector {
            if let Some(rule) = sel.describe_match_rules() {
                parameters
                    .get_or_insert_with(BTreeMap::new)
                    .insert("matchRule".to_string(), rule);
            }
        }

        let now = Utc::now();
        self.steps.push(StepLogEntry {
            step_id: step_id.to_string(),
            action: action.to_string(),
            parameters,
            selector: selector.cloned(),
            started_at_utc: now,
            finished_at_utc: now,
            duration_ms: 0,
            outcome: StepOutcome::Fail,
            error: None,
        });
        StepHandle(self.steps.len() - 1)
    }

    pub fn success(&mut self, step: StepHandle) {
        self.finish(step, StepOutcome::Success, None);
    }

    pub fn warning(&mut self, step: StepHandle, error: RpcError) {
        self.finish(step, StepOutcome::Warning, Some(error));
    }

    pub fn failure(&mut self, step: StepHandle, error: RpcError) {
        self.finish(step, StepOutcome::Fail, Some(error));
    }

    /// Append an already-failed step in one shot (zero duration).
    pub fn append_failure(&mut self, step_id: &str, action: &str, error: RpcError) {
        let handle = self.start(step_id, action, None, None);
        self.failure(handle, error);
    }

    /// Add or overwrite a parameter on an open step.
    pub fn set_parameter(&mut self, step: StepHandle, key: &str, value: impl Into<String>) {
        if let Some(entry) = self.steps.get_mut(step.0) {
            entry
                .parameters
                .get_or_insert_with(BTreeMap::new)
                .insert(key.to_string(), value.into());
        }
    }

    fn finish(&mut self, step: StepHandle, outcome: StepOutcome, error: Option<RpcError>) {
        if let Some(entry) = self.steps.get_mut(step.0) {
            entry.finished_at_utc = Utc::now();
            entry.duration_ms = (entry.finished_at_utc - entry.started_at_utc).num_milliseconds();
            entry.outcome = outcome;
            entry.error = error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn steps_keep_append_order() {
        let mut log = StepLog::new();
        let a = log.start("ValidateRequest", "Validate request", None, None);
        log.success(a);
        let b = log.start("FindElement", "FindElement", None, None);
        log.failure(b, RpcError::new(ErrorKind::FindError, "Element not found"));

        assert_eq!(log.steps.len(), 2);
        assert_eq!(log.steps[0].step_id, "ValidateRequest");
        assert_eq!(log.steps[0].outcome, StepOutcome::Success);
        assert_eq!(log.steps[1].outcome, StepOutcome::Fail);
        assert_eq!(
            log.steps[1].error.as_ref().unwrap().kind,
            ErrorKind::FindError
        );
    }

    #[test]
    fn unfinished_step_stays_failed() {
        let mut log = StepLog::new();
        let _ = log.start("Click", "Click", None, None);
        assert_eq!(log.steps[0].outcome, StepOutcome::Fail);
    }

    #[test]
    fn wire_shape_is_camel_case() {
        let mut log = StepLog::new();
        let s = log.start("Ping", "Ping", None, None);
        log.success(s);
        let json = serde_json::to_value(&log).unwrap();
        let step = &json["steps"][0];
        assert!(step.get("stepId").is_some());
        assert!(step.get("startedAtUtc").is_some());
        assert!(step.get("durationMs").is_some());
        assert_eq!(step["outcome"], "Success");
    }
}
