//! Interruption (popup) handling.
//!
//! Flows call [`try_handle`] around steps that are known to trigger
//! confirmation dialogs. Everything here is best-effort: absence of a popup
//! is success, and every detection and dismissal attempt leaves its own step
//! entry so non-fatal interruptions stay auditable.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{ErrorKind, RpcError};
use crate::finder;
use crate::flows::FlowContext;
use crate::poll::poll_until;
use crate::provider::ElementHandle;
use crate::selector::ElementSelector;

const DETECT_POLL_INTERVAL: Duration = Duration::from_millis(200);
const DEFAULT_DETECT_TIMEOUT_MS: u64 = 1_500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchRoot {
    #[default]
    Desktop,
    MainWindow,
}

/// Pluggable dismissal policy. Disabled by default to avoid stray clicks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PopupPolicy {
    pub enabled: bool,
    pub search_root: SearchRoot,
    pub timeout_ms: Option<u64>,
    /// Clicking an OK/confirm button can commit unintended changes, so it
    /// requires explicit opt-in; cancel is always preferred.
    pub allow_ok: bool,
    pub dialog_selector: Option<ElementSelector>,
    pub ok_button_selector: Option<ElementSelector>,
    pub cancel_button_selector: Option<ElementSelector>,
}

impl PopupPolicy {
    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_DETECT_TIMEOUT_MS))
    }
}

/// Detect and dismiss a popup per policy. `step_tag` distinguishes sweeps at
/// different points of the same flow in the evidence trail.
pub fn try_handle(
    context: &mut FlowContext<'_>,
    main_window: &dyn ElementHandle,
    policy: Option<&PopupPolicy>,
    step_tag: &str,
) {
    let Some(policy) = policy else { return };
    if !policy.enabled {
        return;
    }

    let detect_id = format!("PopupDetected.{step_tag}");
    let dialog_selector = match &policy.dialog_selector {
        Some(selector) if finder::validate(selector).is_ok() => selector.clone(),
        _ => {
            let step = context
                .log
                .start(&detect_id, "Detect popup (invalid selector)", None, None);
            context.log.warning(
                step,
                RpcError::new(
                    ErrorKind::InvalidArgument,
                    "Popup dialog selector is missing or invalid",
                ),
            );
            return;
        }
    };

    let (root, root_kind): (Option<Box<dyn ElementHandle>>, &str) = match policy.search_root {
        SearchRoot::Desktop => (context.session().connection().desktop().ok(), "desktop"),
        SearchRoot::MainWindow => (None, "mainWindow"),
    };
    let root_ref: &dyn ElementHandle = match &root {
        Some(root) => root.as_ref(),
        None => main_window,
    };

    let mut params = BTreeMap::new();
    params.insert(
        "timeoutMs".to_string(),
        policy.timeout().as_millis().to_string(),
    );
    params.insert("root".to_string(), root_kind.to_string());
    let detect = context
        .log
        .start(&detect_id, "Detect popup", Some(&dialog_selector), Some(params));

    let mut dialog: Option<Box<dyn ElementHandle>> = None;
    let mut last_failure: Option<String> = None;
    let found = poll_until(
        || match finder::resolve(root_ref, &dialog_selector) {
            Ok(element) => {
                dialog = Some(element);
                true
            }
            Err(failure) => {
                last_failure = Some(failure.kind.name().to_string());
                false
            }
        },
        policy.timeout(),
        DETECT_POLL_INTERVAL,
    );

    let Some(dialog) = dialog.filter(|_| found) else {
        // No popup within the window; most calls land here.
        context.log.set_parameter(detect, "found", "false");
        if let Some(kind) = last_failure {
            context.log.set_parameter(detect, "failureKind", kind);
        }
        context.log.success(detect);
        return;
    };

    let title = dialog.name();
    context.log.set_parameter(detect, "found", "true");
    context.log.set_parameter(detect, "title", title.clone());
    context.log.success(detect);

    let mut button: Option<Box<dyn ElementHandle>> = None;
    let mut button_selector: Option<&ElementSelector> = None;
    let mut button_kind = "cancel";

    if let Some(selector) = valid_selector(&policy.cancel_button_selector) {
        if let Ok(candidate) = finder::resolve(dialog.as_ref(), selector) {
            button = Some(candidate);
            button_selector = Some(selector);
        }
    }
    if button.is_none() && policy.allow_ok {
        if let Some(selector) = valid_selector(&policy.ok_button_selector) {
            if let Ok(candidate) = finder::resolve(dialog.as_ref(), selector) {
                button = Some(candidate);
                button_selector = Some(selector);
                button_kind = "ok";
            }
        }
    }

    let mut params = BTreeMap::new();
    params.insert("root".to_string(), root_kind.to_string());
    params.insert("button".to_string(), button_kind.to_string());
    params.insert("title".to_string(), title);
    let dismiss_id = format!("PopupDismissed.{step_tag}");
    let dismiss = context
        .log
        .start(&dismiss_id, "Dismiss popup", button_selector, Some(params));

    let Some(button) = button else {
        context.log.warning(
            dismiss,
            RpcError::new(ErrorKind::FindError, "Popup button not found"),
        );
        return;
    };

    match button.click() {
        Ok(()) => context.log.success(dismiss),
        Err(e) => context.log.warning(
            dismiss,
            RpcError::from_provider(ErrorKind::ActionError, "Popup dismiss failed", &e),
        ),
    }
}

fn valid_selector(selector: &Option<ElementSelector>) -> Option<&ElementSelector> {
    selector
        .as_ref()
        .filter(|s| finder::validate(s).is_ok())
}
