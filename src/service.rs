//! Operation bodies for every exposed RPC method.
//!
//! One `AgentService` exists per process. It owns the provider and the
//! session registry and is installed into a thread local on the scheduler's
//! worker thread; the transport submits closures that borrow it through
//! [`AgentService::with`]. None of this type is `Send`, which is the point.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::contracts::{
    CloseSessionRequest, ElementActionRequest, ElementReference, FindElementRequest,
    FindElementResponse, OpenSessionRequest, OpenSessionResponse, RpcResult, RunFlowRequest,
    RunFlowResponse, SendKeysRequest, SetTextMode, SetTextRequest, WaitConditionKind,
    WaitUntilRequest,
};
use crate::errors::{ErrorKind, RpcError};
use crate::finder::{self, FindFailure, FindFailureKind};
use crate::flows::{FlowContext, FlowDispatcher};
use crate::keys::{parse_keys, ParsedKeys};
use crate::poll::poll_until;
use crate::provider::{AttachTarget, ElementHandle, UiaProvider};
use crate::selector::ElementSelector;
use crate::sessions::{Session, SessionRegistry};
use crate::steplog::StepLog;

/// Sleep between poll attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Budget for the fresh main-window lookup at the start of every resolution.
pub const MAIN_WINDOW_TIMEOUT: Duration = Duration::from_millis(2_000);

thread_local! {
    static INSTANCE: RefCell<Option<AgentService>> = const { RefCell::new(None) };
}

pub struct AgentService {
    provider: Box<dyn UiaProvider>,
    registry: SessionRegistry,
    flows: FlowDispatcher,
}

impl AgentService {
    pub fn new(provider: Box<dyn UiaProvider>) -> Self {
        Self {
            provider,
            registry: SessionRegistry::new(),
            flows: FlowDispatcher::standard(),
        }
    }

    pub fn with_flows(provider: Box<dyn UiaProvider>, flows: FlowDispatcher) -> Self {
        Self {
            provider,
            registry: SessionRegistry::new(),
            flows,
        }
    }

    /// Install the service on the current thread. Called once, on the
    /// scheduler's worker thread, before the pump starts.
    pub fn install(service: AgentService) {
        INSTANCE.with(|cell| {
            let mut slot = cell.borrow_mut();
            assert!(slot.is_none(), "agent service installed twice");
            *slot = Some(service);
        });
    }

    /// Borrow the installed service. Panics when called off the worker
    /// thread, which would be a wiring bug, not a runtime condition.
    pub fn with<R>(f: impl FnOnce(&mut AgentService) -> R) -> R {
        INSTANCE.with(|cell| {
            let mut slot = cell.borrow_mut();
            let service = slot
                .as_mut()
                .expect("agent service not installed on this thread");
            f(service)
        })
    }

    // ---- operations ----

    pub fn ping(&self) -> String {
        "pong".to_string()
    }

    pub fn open_session(&mut self, request: OpenSessionRequest) -> RpcResult<OpenSessionResponse> {
        let mut log = StepLog::new();

        if request.process_id.is_none()
            && request
                .process_name
                .as_deref()
                .map_or(true, |n| n.trim().is_empty())
        {
            let error = RpcError::new(
                ErrorKind::InvalidArgument,
                "processId or processName is required",
            );
            log.append_failure("ValidateRequest", "Validate OpenSession request", error.clone());
            return RpcResult::failure(error, log);
        }

        let target = AttachTarget {
            process_id: request.process_id,
            process_name: request.process_name.clone(),
            title_contains: request.title_contains.clone(),
        };
        let timeout = Duration::from_millis(request.timeout_ms());

        let mut params = BTreeMap::new();
        params.insert("timeoutMs".to_string(), request.timeout_ms().to_string());
        params.insert(
            "bringToForeground".to_string(),
            request.bring_to_foreground().to_string(),
        );
        if let Some(pid) = request.process_id {
            params.insert("processId".to_string(), pid.to_string());
        }
        if let Some(name) = &request.process_name {
            params.insert("processName".to_string(), name.clone());
        }
        let attach = log.start("Attach", "Attach to target process", None, Some(params));

        let connection = match self.provider.attach(&target, timeout) {
            Ok(connection) => connection,
            Err(e) => {
                let error = RpcError::from_provider(ErrorKind::ConfigError, "Attach failed", &e);
                log.failure(attach, error.clone());
                return RpcResult::failure(error, log);
            }
        };
        log.success(attach);

        if request.bring_to_foreground() {
            let step = log.start("BringToForeground", "Bring main window to foreground", None, None);
            match connection.bring_to_foreground() {
                Ok(()) => log.success(step),
                Err(e) => {
                    warn!(error = %e, "bring-to-foreground failed");
                    log.warning(
                        step,
                        RpcError::from_provider(
                            ErrorKind::ActionError,
                            "Bring to foreground failed",
                            &e,
                        ),
                    );
                }
            }
        }

        let title_step = log.start("ResolveMainWindow", "Resolve main window title", None, None);
        let main_window_title = match connection.main_window(MAIN_WINDOW_TIMEOUT) {
            Ok(window) => {
                log.success(title_step);
                window.name()
            }
            Err(e) => {
                log.warning(
                    title_step,
                    RpcError::from_provider(ErrorKind::FindError, "Main window not resolved", &e),
                );
                String::new()
            }
        };

        let process_id = connection.process_id();
        let session = self.registry.create(connection);
        info!(session_id = %session.id(), process_id, "session opened");
        RpcResult::success(
            OpenSessionResponse {
                session_id: session.id().to_string(),
                process_id,
                main_window_title,
            },
            log,
        )
    }

    pub fn close_session(&mut self, request: CloseSessionRequest) -> RpcResult<bool> {
        let mut log = StepLog::new();
        let session_id = match required_str(&request.session_id, "sessionId", &mut log) {
            Ok(id) => id,
            Err(error) => return RpcResult::failure(error, log),
        };

        let step = log.start("CloseSession", "Close session", None, None);
        match self.registry.try_remove(&session_id) {
            Some(session) => {
                info!(session_id = %session.id(), "session closed");
                log.success(step);
                RpcResult::success(true, log)
            }
            None => {
                let error = unknown_session(&session_id);
                log.failure(step, error.clone());
                RpcResult::failure(error, log)
            }
        }
    }

    pub fn find_element(&mut self, request: FindElementRequest) -> RpcResult<FindElementResponse> {
        let mut log = StepLog::new();
        let session_id = match required_str(&request.session_id, "sessionId", &mut log) {
            Ok(id) => id,
            Err(error) => return RpcResult::failure(error, log),
        };
        let selector = match &request.selector {
            Some(selector) => selector.clone(),
            None => {
                let error = missing_field("selector");
                log.append_failure("ValidateRequest", "Validate FindElement request", error.clone());
                return RpcResult::failure(error, log);
            }
        };
        let session = match self.registry.try_get(&session_id) {
            Some(session) => session,
            None => {
                let error = unknown_session(&session_id);
                log.append_failure("ResolveSession", "Resolve session", error.clone());
                return RpcResult::failure(error, log);
            }
        };

        let timeout = Duration::from_millis(request.timeout_ms());
        let step = log.start("FindElement", "Resolve selector", Some(&selector), None);
        match resolve_with_timeout(session, &selector, timeout) {
            Ok(element) => {
                log.success(step);
                let reference = ElementReference {
                    session_id: session_id.clone(),
                    selector,
                    captured_runtime_id: element.runtime_id(),
                    captured_at: chrono::Utc::now(),
                };
                RpcResult::success(FindElementResponse { element: reference }, log)
            }
            Err(failure) => {
                let error = failure.into_rpc_error();
                log.failure(step, error.clone());
                RpcResult::failure(error, log)
            }
        }
    }

    pub fn click(&mut self, request: ElementActionRequest) -> RpcResult<bool> {
        self.element_action(request, "Click", |element| element.click())
    }

    pub fn double_click(&mut self, request: ElementActionRequest) -> RpcResult<bool> {
        self.element_action(request, "DoubleClick", |element| element.double_click())
    }

    pub fn right_click(&mut self, request: ElementActionRequest) -> RpcResult<bool> {
        self.element_action(request, "RightClick", |element| element.right_click())
    }

    fn element_action(
        &mut self,
        request: ElementActionRequest,
        action: &str,
        perform: impl FnOnce(&dyn ElementHandle) -> Result<(), crate::errors::ProviderError>,
    ) -> RpcResult<bool> {
        let mut log = StepLog::new();
        let reference = match &request.element {
            Some(reference) => reference,
            None => {
                let error = missing_field("element");
                log.append_failure("ValidateRequest", "Validate element action request", error.clone());
                return RpcResult::failure(error, log);
            }
        };

        let element = match self.resolve_reference(reference, &mut log) {
            Ok(element) => element,
            Err(error) => return RpcResult::failure(error, log),
        };

        let step = log.start(action, action, Some(&reference.selector), None);
        match perform(element.as_ref()) {
            Ok(()) => {
                log.success(step);
                RpcResult::success(true, log)
            }
            Err(e) => {
                let error =
                    RpcError::from_provider(ErrorKind::ActionError, format!("{action} failed"), &e);
                log.failure(step, error.clone());
                RpcResult::failure(error, log)
            }
        }
    }

    pub fn set_text(&mut self, request: SetTextRequest) -> RpcResult<bool> {
        let mut log = StepLog::new();
        let reference = match &request.element {
            Some(reference) => reference.clone(),
            None => {
                let error = missing_field("element");
                log.append_failure("ValidateRequest", "Validate SetText request", error.clone());
                return RpcResult::failure(error, log);
            }
        };
        // Missing or whitespace-only text means "clear the field".
        let text = match &request.text {
            Some(text) if !text.trim().is_empty() => text.clone(),
            _ => String::new(),
        };

        let element = match self.resolve_reference(&reference, &mut log) {
            Ok(element) => element,
            Err(error) => return RpcResult::failure(error, log),
        };
        let session = match self.registry.try_get(&reference.session_id) {
            Some(session) => session,
            None => {
                let error = unknown_session(&reference.session_id);
                log.append_failure("ResolveSession", "Resolve session", error.clone());
                return RpcResult::failure(error, log);
            }
        };

        let step = log.start("SetText", "Set element text", Some(&reference.selector), None);
        log.set_parameter(step, "mode", format!("{:?}", request.mode));

        // Replace prefers the element's own value facility; the keyboard
        // path is the fallback and the only path for the other modes.
        if request.mode == SetTextMode::Replace {
            match element.try_set_value(&text) {
                Ok(true) => {
                    log.set_parameter(step, "method", "valuePattern");
                    log.success(step);
                    return RpcResult::success(true, log);
                }
                Ok(false) => {}
                Err(e) => {
                    let error =
                        RpcError::from_provider(ErrorKind::ActionError, "SetText failed", &e);
                    log.failure(step, error.clone());
                    return RpcResult::failure(error, log);
                }
            }
        }

        log.set_parameter(step, "method", "keyboard");
        let outcome = (|| -> Result<(), crate::errors::ProviderError> {
            element.focus()?;
            if request.mode != SetTextMode::Append {
                session
                    .connection()
                    .press_chord(&[crate::keys::Modifier::Ctrl], crate::keys::Key::Char('A'))?;
            }
            session.connection().type_text(&text)
        })();

        match outcome {
            Ok(()) => {
                log.success(step);
                RpcResult::success(true, log)
            }
            Err(e) => {
                let error = RpcError::from_provider(ErrorKind::ActionError, "SetText failed", &e);
                log.failure(step, error.clone());
                RpcResult::failure(error, log)
            }
        }
    }

    pub fn send_keys(&mut self, request: SendKeysRequest) -> RpcResult<bool> {
        let mut log = StepLog::new();
        let session_id = match required_str(&request.session_id, "sessionId", &mut log) {
            Ok(id) => id,
            Err(error) => return RpcResult::failure(error, log),
        };
        let keys = match &request.keys {
            Some(keys) if !keys.trim().is_empty() => keys.clone(),
            _ => {
                let error = missing_field("keys");
                log.append_failure("ValidateRequest", "Validate SendKeys request", error.clone());
                return RpcResult::failure(error, log);
            }
        };
        let session = match self.registry.try_get(&session_id) {
            Some(session) => session,
            None => {
                let error = unknown_session(&session_id);
                log.append_failure("ResolveSession", "Resolve session", error.clone());
                return RpcResult::failure(error, log);
            }
        };

        let parsed = match parse_keys(&keys) {
            Ok(parsed) => parsed,
            Err(reason) => {
                let error = RpcError::new(ErrorKind::InvalidArgument, "Invalid keys string")
                    .detail("reason", reason)
                    .detail("keys", keys.clone());
                log.append_failure("ParseKeys", "Parse keys string", error.clone());
                return RpcResult::failure(error, log);
            }
        };

        // Best-effort: make sure the target window has keyboard focus before
        // anything is typed.
        if let Ok(window) = session.main_window(MAIN_WINDOW_TIMEOUT) {
            let _ = window.focus();
        }

        let mut params = BTreeMap::new();
        params.insert("keys".to_string(), keys);
        let step = log.start("SendKeys", "Send keyboard input", None, Some(params));
        let outcome = match parsed {
            ParsedKeys::Text(text) => session.connection().type_text(&text),
            ParsedKeys::Key(key) => session.connection().press_key(key),
            ParsedKeys::Chord { modifiers, key } => {
                session.connection().press_chord(&modifiers, key)
            }
        };
        match outcome {
            Ok(()) => {
                log.success(step);
                RpcResult::success(true, log)
            }
            Err(e) => {
                let error = RpcError::from_provider(ErrorKind::ActionError, "SendKeys failed", &e);
                log.failure(step, error.clone());
                RpcResult::failure(error, log)
            }
        }
    }

    pub fn wait_until(&mut self, request: WaitUntilRequest) -> RpcResult<bool> {
        let mut log = StepLog::new();
        let session_id = match required_str(&request.session_id, "sessionId", &mut log) {
            Ok(id) => id,
            Err(error) => return RpcResult::failure(error, log),
        };
        let condition = match &request.condition {
            Some(condition) => condition.clone(),
            None => {
                let error = missing_field("condition");
                log.append_failure("ValidateRequest", "Validate WaitUntil request", error.clone());
                return RpcResult::failure(error, log);
            }
        };
        let session = match self.registry.try_get(&session_id) {
            Some(session) => session,
            None => {
                let error = unknown_session(&session_id);
                log.append_failure("ResolveSession", "Resolve session", error.clone());
                return RpcResult::failure(error, log);
            }
        };

        if let Some(selector) = &condition.selector {
            if let Err(failure) = finder::validate(selector) {
                let error = failure.into_rpc_error();
                log.append_failure("ValidateSelector", "Validate condition selector", error.clone());
                return RpcResult::failure(error, log);
            }
        }

        let timeout = Duration::from_millis(request.timeout_ms());
        let mut params = BTreeMap::new();
        params.insert("kind".to_string(), format!("{:?}", condition.kind));
        params.insert("timeoutMs".to_string(), request.timeout_ms().to_string());
        let step = log.start(
            "WaitUntil",
            "Wait for condition",
            condition.selector.as_ref(),
            Some(params),
        );

        let satisfied = match (&condition.selector, condition.kind) {
            // Absence of nothing holds trivially; presence of nothing never.
            (None, WaitConditionKind::ElementNotExists) => true,
            (None, _) => false,
            (Some(selector), kind) => {
                poll_until(
                    || evaluate_condition(session, selector, kind),
                    timeout,
                    POLL_INTERVAL,
                )
            }
        };

        if satisfied {
            log.success(step);
            RpcResult::success(true, log)
        } else {
            let error = RpcError::new(ErrorKind::TimeoutError, "Condition not met within timeout")
                .detail("kind", format!("{:?}", condition.kind))
                .detail("timeoutMs", request.timeout_ms().to_string());
            log.failure(step, error.clone());
            RpcResult::failure(error, log)
        }
    }

    pub fn run_flow(&mut self, request: RunFlowRequest) -> RpcResult<RunFlowResponse> {
        let mut log = StepLog::new();
        let session_id = match required_str(&request.session_id, "sessionId", &mut log) {
            Ok(id) => id,
            Err(error) => return RpcResult::failure(error, log),
        };
        let session = match self.registry.try_get(&session_id) {
            Some(session) => session,
            None => {
                let error = unknown_session(&session_id);
                log.append_failure("ResolveSession", "Resolve session", error.clone());
                return RpcResult::failure(error, log);
            }
        };

        let timeout = Duration::from_millis(request.timeout_ms());
        let mut context = FlowContext::new(session, timeout, log);
        let outcome = self.flows.dispatch(
            &mut context,
            request.flow_name.as_deref(),
            request.args.as_ref(),
        );
        RpcResult::from_outcome(outcome, context.into_log())
    }

    /// Re-resolve an element reference from the session's main window. A
    /// fresh walk on every call; `NotFound` becomes `StaleElement` because
    /// the caller previously held a valid reference.
    fn resolve_reference(
        &self,
        reference: &ElementReference,
        log: &mut StepLog,
    ) -> Result<Box<dyn ElementHandle>, RpcError> {
        let session = self.registry.try_get(&reference.session_id).ok_or_else(|| {
            let error = unknown_session(&reference.session_id);
            log.append_failure("ResolveSession", "Resolve session", error.clone());
            error
        })?;

        let step = log.start(
            "ResolveElement",
            "Re-resolve element reference",
            Some(&reference.selector),
            None,
        );
        // A missing main window is a session/process problem, not a selector
        // miss.
        let window = session.main_window(MAIN_WINDOW_TIMEOUT).map_err(|e| {
            let error =
                RpcError::from_provider(ErrorKind::ConfigError, "Failed to get main window", &e);
            log.failure(step, error.clone());
            error
        })?;

        match finder::resolve(window.as_ref(), &reference.selector) {
            Ok(element) => {
                log.success(step);
                Ok(element)
            }
            Err(failure) => {
                let error = if failure.kind == FindFailureKind::NotFound {
                    RpcError::with_details(
                        ErrorKind::StaleElement,
                        "Element reference no longer resolves",
                        failure.details,
                    )
                } else {
                    failure.into_rpc_error()
                };
                log.failure(step, error.clone());
                Err(error)
            }
        }
    }

    // ---- dispatch ----

    /// Route one decoded request by its PascalCase method name. Returns the
    /// serialized result payload, or `None` for an unknown method so the
    /// transport can answer with a protocol-level error.
    pub fn dispatch(&mut self, method: &str, params: Value) -> Option<Value> {
        debug!(method, "dispatching request");
        let value = match method {
            "Ping" => Value::String(self.ping()),
            "OpenSession" => run(params, |r| self.open_session(r)),
            "CloseSession" => run(params, |r| self.close_session(r)),
            "FindElement" => run(params, |r| self.find_element(r)),
            "Click" => run(params, |r| self.click(r)),
            "DoubleClick" => run(params, |r| self.double_click(r)),
            "RightClick" => run(params, |r| self.right_click(r)),
            "SetText" => run(params, |r| self.set_text(r)),
            "SendKeys" => run(params, |r| self.send_keys(r)),
            "WaitUntil" => run(params, |r| self.wait_until(r)),
            "RunFlow" => run(params, |r| self.run_flow(r)),
            _ => return None,
        };
        Some(value)
    }
}

fn evaluate_condition(
    session: &Session,
    selector: &ElementSelector,
    kind: WaitConditionKind,
) -> bool {
    let window = match session.main_window(MAIN_WINDOW_TIMEOUT) {
        Ok(window) => window,
        Err(_) => return kind == WaitConditionKind::ElementNotExists,
    };
    let resolved = finder::resolve(window.as_ref(), selector);
    match kind {
        WaitConditionKind::ElementExists => resolved.is_ok(),
        WaitConditionKind::ElementNotExists => resolved.is_err(),
        WaitConditionKind::ElementEnabled => {
            resolved.map(|element| element.is_enabled()).unwrap_or(false)
        }
    }
}

/// Poll selector resolution against a fresh main window until it succeeds or
/// the budget runs out; the last classified failure is the reported one.
fn resolve_with_timeout(
    session: &Session,
    selector: &ElementSelector,
    timeout: Duration,
) -> Result<Box<dyn ElementHandle>, FindFailure> {
    finder::validate(selector)?;

    let mut found: Option<Box<dyn ElementHandle>> = None;
    let mut last: Option<FindFailure> = None;
    let resolved = poll_until(
        || {
            let window = match session.main_window(MAIN_WINDOW_TIMEOUT) {
                Ok(window) => window,
                Err(e) => {
                    last = Some(FindFailure::provider_miss(&e));
                    return false;
                }
            };
            match finder::resolve(window.as_ref(), selector) {
                Ok(element) => {
                    found = Some(element);
                    true
                }
                Err(failure) => {
                    last = Some(failure);
                    false
                }
            }
        },
        timeout,
        POLL_INTERVAL,
    );

    if resolved {
        Ok(found.expect("predicate stored the element"))
    } else {
        Err(last.expect("predicate ran at least once"))
    }
}

fn run<Req, Resp>(params: Value, body: impl FnOnce(Req) -> RpcResult<Resp>) -> Value
where
    Req: DeserializeOwned + Default,
    Resp: serde::Serialize,
{
    let request: Result<Req, _> = match params {
        Value::Null => Ok(Req::default()),
        // Positional parameter lists carry the request object first.
        Value::Array(mut items) if !items.is_empty() => {
            serde_json::from_value(items.remove(0))
        }
        Value::Array(_) => Ok(Req::default()),
        other => serde_json::from_value(other),
    };
    let result = match request {
        Ok(request) => body(request),
        Err(e) => {
            let mut log = StepLog::new();
            let error = RpcError::new(ErrorKind::InvalidArgument, "Malformed request payload")
                .detail("exceptionMessage", e.to_string());
            log.append_failure("DecodeRequest", "Decode request payload", error.clone());
            RpcResult::<Resp>::failure(error, log)
        }
    };
    serde_json::to_value(result).unwrap_or(Value::Null)
}

fn required_str(
    value: &Option<String>,
    field: &str,
    log: &mut StepLog,
) -> Result<String, RpcError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => {
            let error = missing_field(field);
            log.append_failure("ValidateRequest", "Validate request", error.clone());
            Err(error)
        }
    }
}

fn missing_field(field: &str) -> RpcError {
    RpcError::new(ErrorKind::InvalidArgument, format!("{field} is required"))
        .detail("field", field)
}

fn unknown_session(session_id: &str) -> RpcError {
    RpcError::new(ErrorKind::ConfigError, "Unknown sessionId")
        .detail("sessionId", session_id)
}
