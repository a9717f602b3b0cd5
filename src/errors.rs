//! Stable failure taxonomy shared by every RPC operation.
//!
//! Callers branch on [`ErrorKind`] to decide whether to retry, re-resolve or
//! escalate, so the set of kinds is part of the wire contract and must not
//! grow casually.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Classified failure kinds carried by [`RpcError::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Environment/session/process mismatch (unknown session, attach failed,
    /// main window missing).
    ConfigError,
    /// Element not located on a fresh lookup.
    FindError,
    /// An observable condition was not met within the deadline.
    TimeoutError,
    /// The action itself failed (click/type/paste).
    ActionError,
    /// Unanticipated UI structure, e.g. an unhandled interruption dialog.
    #[serde(rename = "UnexpectedUIState")]
    UnexpectedUiState,
    /// A previously valid element reference no longer resolves.
    StaleElement,
    /// Caller-supplied request is structurally or semantically wrong.
    InvalidArgument,
    /// A recognized capability exists but has no implementation yet.
    NotImplemented,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::FindError => "FindError",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::ActionError => "ActionError",
            ErrorKind::UnexpectedUiState => "UnexpectedUIState",
            ErrorKind::StaleElement => "StaleElement",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::NotImplemented => "NotImplemented",
        };
        f.write_str(s)
    }
}

/// Structured error returned inside the [`RpcResult`](crate::contracts::RpcResult)
/// envelope. Never thrown across the RPC boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, String>>,
}

impl RpcError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        kind: ErrorKind,
        message: impl Into<String>,
        details: BTreeMap<String, String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Some(details),
        }
    }

    /// Translate a provider failure into the taxonomy, preserving the original
    /// error's type name and message in `details` (`exceptionType` /
    /// `exceptionMessage` keys, kept from the original wire contract).
    pub fn from_provider(kind: ErrorKind, message: impl Into<String>, err: &ProviderError) -> Self {
        let mut details = BTreeMap::new();
        details.insert("exceptionType".to_string(), err.type_name().to_string());
        details.insert("exceptionMessage".to_string(), err.to_string());
        Self::with_details(kind, message, details)
    }

    pub fn detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.into());
        self
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for RpcError {}

/// Internal error type for the provider seam.
///
/// Provider failures are translated into an [`RpcError`] exactly once, at the
/// outermost handler of the operation that triggered them.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("process not found: {0}")]
    ProcessNotFound(String),

    #[error("main window not found")]
    MainWindowNotFound,

    #[error("element is no longer available")]
    ElementNotAvailable,

    #[error("element does not support {0}")]
    UnsupportedAction(String),

    #[error("clipboard unavailable: {0}")]
    ClipboardUnavailable(String),

    #[error("current platform has no automation provider; run with --provider sim")]
    UnsupportedPlatform,

    #[error("{0}")]
    Platform(String),
}

impl ProviderError {
    /// Stable name of the variant, recorded as `exceptionType` in error
    /// details.
    pub fn type_name(&self) -> &'static str {
        match self {
            ProviderError::ProcessNotFound(_) => "ProcessNotFound",
            ProviderError::MainWindowNotFound => "MainWindowNotFound",
            ProviderError::ElementNotAvailable => "ElementNotAvailable",
            ProviderError::UnsupportedAction(_) => "UnsupportedAction",
            ProviderError::ClipboardUnavailable(_) => "ClipboardUnavailable",
            ProviderError::UnsupportedPlatform => "UnsupportedPlatform",
            ProviderError::Platform(_) => "Platform",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_serializes_to_stable_names() {
        let json = serde_json::to_string(&ErrorKind::UnexpectedUiState).unwrap();
        assert_eq!(json, "\"UnexpectedUIState\"");
        let json = serde_json::to_string(&ErrorKind::StaleElement).unwrap();
        assert_eq!(json, "\"StaleElement\"");
    }

    #[test]
    fn provider_error_translation_keeps_type_and_message() {
        let err = ProviderError::ProcessNotFound("calc".into());
        let rpc = RpcError::from_provider(ErrorKind::ConfigError, "OpenSession failed", &err);
        let details = rpc.details.unwrap();
        assert_eq!(details["exceptionType"], "ProcessNotFound");
        assert_eq!(details["exceptionMessage"], "process not found: calc");
    }

    #[test]
    fn details_are_omitted_when_absent() {
        let err = RpcError::new(ErrorKind::TimeoutError, "WaitUntil timed out");
        let json = serde_json::to_value(&err).unwrap();
        assert!(json.get("details").is_none());
    }
}
