//! Flow dispatch rules, the attach flow, popup handling and the clipboard
//! helper.

use std::time::Duration;

use uia_agent::contracts::RunFlowRequest;
use uia_agent::controls::ControlType;
use uia_agent::flows::{names, FlowContext, FlowDispatcher};
use uia_agent::provider::sim::{demo_desktop, NodeSpec, SimProvider, SimTree};
use uia_agent::provider::{AttachTarget, UiaProvider};
use uia_agent::service::AgentService;
use uia_agent::sessions::SessionRegistry;
use uia_agent::steplog::{StepLog, StepOutcome};
use uia_agent::ErrorKind;

fn service_with(tree: SimTree) -> AgentService {
    AgentService::new(Box::new(SimProvider::with_desktop(tree)))
}

fn open(service: &mut AgentService) -> String {
    let result = service.open_session(uia_agent::contracts::OpenSessionRequest {
        process_name: Some("workbench".to_string()),
        timeout_ms: Some(500),
        ..Default::default()
    });
    assert!(result.ok);
    result.value.unwrap().session_id
}

fn run_flow(
    service: &mut AgentService,
    session_id: &str,
    flow_name: Option<&str>,
    args: Option<serde_json::Value>,
) -> uia_agent::RpcResult<uia_agent::contracts::RunFlowResponse> {
    service.run_flow(RunFlowRequest {
        session_id: Some(session_id.to_string()),
        flow_name: flow_name.map(str::to_string),
        args,
        timeout_ms: Some(1_000),
    })
}

#[test]
fn attach_flow_reports_window_facts() {
    let tree = demo_desktop();
    let mut service = service_with(tree.clone());
    let session_id = open(&mut service);

    let result = run_flow(&mut service, &session_id, Some(names::ATTACH), None);
    assert!(result.ok, "attach flow failed: {:?}", result.error);
    let data = result.value.unwrap().data;
    assert_eq!(data["processId"], "4242");
    assert_eq!(data["mainWindowTitle"], "Workbench Studio");

    let ids: Vec<_> = result
        .step_log
        .steps
        .iter()
        .map(|s| s.step_id.as_str())
        .collect();
    assert_eq!(ids, ["GetMainWindow", "BringToForeground"]);
}

#[test]
fn unknown_flow_name_is_an_invalid_argument_with_the_known_list() {
    let tree = demo_desktop();
    let mut service = service_with(tree);
    let session_id = open(&mut service);

    let result = run_flow(&mut service, &session_id, Some("no.such.flow"), None);
    assert!(!result.ok);
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::InvalidArgument);
    let details = error.details.unwrap();
    assert_eq!(details["flowName"], "no.such.flow");
    for name in names::ALL {
        assert!(details["availableFlows"].contains(name));
    }
}

#[test]
fn recognized_but_stubbed_flow_is_not_implemented() {
    let tree = demo_desktop();
    let mut service = service_with(tree);
    let session_id = open(&mut service);

    let result = run_flow(&mut service, &session_id, Some(names::BUILD), None);
    assert!(!result.ok);
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::NotImplemented);
    assert_eq!(error.details.unwrap()["flowName"], names::BUILD);
}

#[test]
fn recognized_but_unregistered_flow_is_not_implemented_too() {
    // An empty registry still distinguishes known names from typos.
    let tree = demo_desktop();
    let provider = SimProvider::with_desktop(tree.clone());
    let connection = provider
        .attach(
            &AttachTarget {
                process_name: Some("workbench".to_string()),
                ..Default::default()
            },
            Duration::from_millis(100),
        )
        .unwrap();
    let mut registry = SessionRegistry::new();
    let session = registry.create(connection);

    let dispatcher = FlowDispatcher::new();
    let mut context = FlowContext::new(session, Duration::from_millis(100), StepLog::new());
    let error = dispatcher
        .dispatch(&mut context, Some(names::IMPORT_VARIABLES), None)
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::NotImplemented);

    let mut context = FlowContext::new(session, Duration::from_millis(100), StepLog::new());
    let error = dispatcher.dispatch(&mut context, Some(""), None).unwrap_err();
    assert_eq!(error.kind, ErrorKind::InvalidArgument);
}

#[test]
fn missing_flow_name_is_an_invalid_argument() {
    let tree = demo_desktop();
    let mut service = service_with(tree);
    let session_id = open(&mut service);

    let result = run_flow(&mut service, &session_id, None, None);
    assert!(!result.ok);
    assert_eq!(result.error.unwrap().kind, ErrorKind::InvalidArgument);
}

#[test]
fn attach_flow_dismisses_a_popup_when_policy_allows() {
    let tree = demo_desktop();
    // A modal confirmation sitting on the desktop, outside the main window.
    let dialog = tree.add(
        tree.desktop_id(),
        NodeSpec::new()
            .automation_id("dlgConfirm")
            .name("Confirm")
            .control(ControlType::Window),
    );
    let cancel = tree.add(
        dialog,
        NodeSpec::new()
            .automation_id("btnDlgCancel")
            .name("Cancel")
            .control(ControlType::Button),
    );

    let mut service = service_with(tree.clone());
    let session_id = open(&mut service);
    let args = serde_json::json!({
        "popup": {
            "enabled": true,
            "searchRoot": "desktop",
            "timeoutMs": 0,
            "dialogSelector": {"path": [{"automationId": "dlgConfirm"}]},
            "cancelButtonSelector": {"path": [{"automationId": "btnDlgCancel"}]}
        }
    });

    let result = run_flow(&mut service, &session_id, Some(names::ATTACH), Some(args));
    assert!(result.ok, "attach flow failed: {:?}", result.error);
    assert_eq!(tree.clicks(cancel), 1);

    let detect = result
        .step_log
        .steps
        .iter()
        .find(|s| s.step_id == "PopupDetected.attach")
        .unwrap();
    assert_eq!(detect.outcome, StepOutcome::Success);
    assert_eq!(detect.parameters.as_ref().unwrap()["found"], "true");
    let dismiss = result
        .step_log
        .steps
        .iter()
        .find(|s| s.step_id == "PopupDismissed.attach")
        .unwrap();
    assert_eq!(dismiss.outcome, StepOutcome::Success);
    assert_eq!(dismiss.parameters.as_ref().unwrap()["button"], "cancel");
}

#[test]
fn popup_absence_is_recorded_as_success() {
    let tree = demo_desktop();
    let mut service = service_with(tree);
    let session_id = open(&mut service);
    let args = serde_json::json!({
        "popup": {
            "enabled": true,
            "timeoutMs": 0,
            "dialogSelector": {"path": [{"automationId": "dlgNever"}]},
            "cancelButtonSelector": {"path": [{"automationId": "btnNever"}]}
        }
    });

    let result = run_flow(&mut service, &session_id, Some(names::ATTACH), Some(args));
    assert!(result.ok);
    let detect = result
        .step_log
        .steps
        .iter()
        .find(|s| s.step_id == "PopupDetected.attach")
        .unwrap();
    assert_eq!(detect.outcome, StepOutcome::Success);
    assert_eq!(detect.parameters.as_ref().unwrap()["found"], "false");
}

#[test]
fn popup_with_missing_dialog_selector_degrades_to_a_warning() {
    let tree = demo_desktop();
    let mut service = service_with(tree);
    let session_id = open(&mut service);
    let args = serde_json::json!({ "popup": { "enabled": true } });

    let result = run_flow(&mut service, &session_id, Some(names::ATTACH), Some(args));
    assert!(result.ok);
    let detect = result
        .step_log
        .steps
        .iter()
        .find(|s| s.step_id == "PopupDetected.attach")
        .unwrap();
    assert_eq!(detect.outcome, StepOutcome::Warning);
}

#[test]
fn ok_button_requires_explicit_opt_in() {
    let tree = demo_desktop();
    let dialog = tree.add(
        tree.desktop_id(),
        NodeSpec::new()
            .automation_id("dlgSave")
            .name("Save changes?")
            .control(ControlType::Window),
    );
    let ok_button = tree.add(
        dialog,
        NodeSpec::new()
            .automation_id("btnDlgOk")
            .name("OK")
            .control(ControlType::Button),
    );

    let mut service = service_with(tree.clone());
    let session_id = open(&mut service);
    let popup = |allow_ok: bool| {
        serde_json::json!({
            "popup": {
                "enabled": true,
                "searchRoot": "desktop",
                "timeoutMs": 0,
                "allowOk": allow_ok,
                "dialogSelector": {"path": [{"automationId": "dlgSave"}]},
                "okButtonSelector": {"path": [{"automationId": "btnDlgOk"}]}
            }
        })
    };

    // Without opt-in the OK button must not be clicked; the dismiss step is
    // a warning instead.
    let result = run_flow(
        &mut service,
        &session_id,
        Some(names::ATTACH),
        Some(popup(false)),
    );
    assert!(result.ok);
    assert_eq!(tree.clicks(ok_button), 0);
    let dismiss = result
        .step_log
        .steps
        .iter()
        .find(|s| s.step_id == "PopupDismissed.attach")
        .unwrap();
    assert_eq!(dismiss.outcome, StepOutcome::Warning);

    let result = run_flow(
        &mut service,
        &session_id,
        Some(names::ATTACH),
        Some(popup(true)),
    );
    assert!(result.ok);
    assert_eq!(tree.clicks(ok_button), 1);
}

#[test]
fn clipboard_helper_retries_transient_failures() {
    let tree = demo_desktop();
    let provider = SimProvider::with_desktop(tree.clone());
    let connection = provider
        .attach(
            &AttachTarget {
                process_name: Some("workbench".to_string()),
                ..Default::default()
            },
            Duration::from_millis(100),
        )
        .unwrap();
    let mut registry = SessionRegistry::new();
    let session = registry.create(connection);

    tree.fail_clipboard_writes(2);
    let mut context = FlowContext::new(session, Duration::from_secs(1), StepLog::new());
    assert!(context.try_set_clipboard_text("payload"));
    assert_eq!(tree.clipboard().as_deref(), Some("payload"));

    let log = context.into_log();
    let step = log
        .steps
        .iter()
        .find(|s| s.step_id == "SetClipboardText")
        .unwrap();
    assert_eq!(step.outcome, StepOutcome::Success);
}
