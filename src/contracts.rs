//! Wire contracts for every exposed operation.
//!
//! All payloads serialize with camelCase field names; method names themselves
//! are PascalCase and live in the dispatcher. Optional response fields are
//! omitted rather than sent as null.

use serde::{Deserialize, Serialize};

use crate::errors::RpcError;
use crate::selector::ElementSelector;
use crate::steplog::StepLog;

pub const DEFAULT_OPEN_SESSION_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_FIND_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_FLOW_TIMEOUT_MS: u64 = 30_000;

/// Uniform result envelope. `ok` and `error` are mutually consistent by
/// construction; the step log is present on success too.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResult<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub step_log: StepLog,
}

impl<T> RpcResult<T> {
    pub fn success(value: T, step_log: StepLog) -> Self {
        Self {
            ok: true,
            value: Some(value),
            error: None,
            step_log,
        }
    }

    pub fn failure(error: RpcError, step_log: StepLog) -> Self {
        Self {
            ok: false,
            value: None,
            error: Some(error),
            step_log,
        }
    }

    /// Fold a plain result and the accumulated evidence into the envelope.
    pub fn from_outcome(outcome: Result<T, RpcError>, step_log: StepLog) -> Self {
        match outcome {
            Ok(value) => Self::success(value, step_log),
            Err(error) => Self::failure(error, step_log),
        }
    }
}

/// Re-resolvable pointer to an element. Never a live handle; the selector is
/// re-walked from the session main window on every use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementReference {
    pub session_id: String,
    pub selector: ElementSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_runtime_id: Option<Vec<i32>>,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenSessionRequest {
    pub process_id: Option<u32>,
    /// Process name without extension.
    pub process_name: Option<String>,
    pub title_contains: Option<String>,
    pub timeout_ms: Option<u64>,
    pub bring_to_foreground: Option<bool>,
}

impl OpenSessionRequest {
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(DEFAULT_OPEN_SESSION_TIMEOUT_MS)
    }

    pub fn bring_to_foreground(&self) -> bool {
        self.bring_to_foreground.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSessionResponse {
    pub session_id: String,
    pub process_id: u32,
    pub main_window_title: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloseSessionRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindElementRequest {
    pub session_id: Option<String>,
    pub selector: Option<ElementSelector>,
    pub timeout_ms: Option<u64>,
}

impl FindElementRequest {
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(DEFAULT_FIND_TIMEOUT_MS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindElementResponse {
    pub element: ElementReference,
}

/// Shared request shape for Click / DoubleClick / RightClick.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementActionRequest {
    pub element: Option<ElementReference>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetTextMode {
    #[default]
    Replace,
    Append,
    CtrlAReplace,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetTextRequest {
    pub element: Option<ElementReference>,
    pub text: Option<String>,
    pub mode: SetTextMode,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendKeysRequest {
    pub session_id: Option<String>,
    pub keys: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitConditionKind {
    ElementExists,
    ElementNotExists,
    ElementEnabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitCondition {
    pub kind: WaitConditionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<ElementSelector>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitUntilRequest {
    pub session_id: Option<String>,
    pub timeout_ms: Option<u64>,
    pub condition: Option<WaitCondition>,
}

impl WaitUntilRequest {
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunFlowRequest {
    pub session_id: Option<String>,
    pub flow_name: Option<String>,
    pub args: Option<serde_json::Value>,
    pub timeout_ms: Option<u64>,
}

impl RunFlowRequest {
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(DEFAULT_FLOW_TIMEOUT_MS)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFlowResponse {
    /// Flow-specific output values, keyed by stable names.
    #[serde(default)]
    pub data: std::collections::BTreeMap<String, String>,
}

/// Resolved workspace descriptor handed to flows by the outer tooling. The
/// agent treats it as opaque input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowInputs {
    pub variables_file_path: Option<String>,
    pub program_text_path: Option<String>,
    pub output_dir: Option<String>,
    pub project_name: Option<String>,
}
