//! Named multi-step procedures executed against a session.
//!
//! The set of valid flow names is fixed and known in advance, separate from
//! which flows are actually implemented; the dispatcher uses that split to
//! tell a caller typo apart from a recognized-but-unbuilt capability.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::contracts::{FlowInputs, RunFlowResponse};
use crate::errors::{ErrorKind, RpcError};
use crate::poll::poll_until;
use crate::sessions::Session;
use crate::steplog::StepLog;

mod attach;
pub mod popup;

pub use popup::PopupPolicy;

/// Stable flow name constants, the single source of truth for the wire
/// contract. Case-sensitive.
pub mod names {
    pub const ATTACH: &str = "workbench.attach";
    pub const IMPORT_VARIABLES: &str = "workbench.importVariables";
    pub const IMPORT_PROGRAM_TEXT_PASTE: &str = "workbench.importProgram.textPaste";
    pub const BUILD: &str = "workbench.build";

    pub const ALL: [&str; 4] = [ATTACH, IMPORT_VARIABLES, IMPORT_PROGRAM_TEXT_PASTE, BUILD];

    pub fn is_known(name: &str) -> bool {
        ALL.contains(&name)
    }
}

/// Per-flow argument payloads, decoded once at the dispatch boundary.
#[derive(Debug, Clone)]
pub enum FlowArgs {
    Attach(attach::AttachArgs),
    ImportVariables(FlowInputs),
    ImportProgramTextPaste(FlowInputs),
    Build(FlowInputs),
}

impl FlowArgs {
    /// Decode the raw args value for a known flow name. Missing args decode
    /// as each flow's defaults; a malformed payload is the caller's fault.
    pub fn decode(flow_name: &str, raw: Option<&Value>) -> Result<Self, RpcError> {
        fn parse<T: serde::de::DeserializeOwned + Default>(
            raw: Option<&Value>,
        ) -> Result<T, RpcError> {
            match raw {
                None | Some(Value::Null) => Ok(T::default()),
                Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                    RpcError::new(ErrorKind::InvalidArgument, "Malformed flow args")
                        .detail("exceptionMessage", e.to_string())
                }),
            }
        }

        match flow_name {
            names::ATTACH => Ok(FlowArgs::Attach(parse(raw)?)),
            names::IMPORT_VARIABLES => Ok(FlowArgs::ImportVariables(parse(raw)?)),
            names::IMPORT_PROGRAM_TEXT_PASTE => Ok(FlowArgs::ImportProgramTextPaste(parse(raw)?)),
            names::BUILD => Ok(FlowArgs::Build(parse(raw)?)),
            other => Err(
                RpcError::new(ErrorKind::InvalidArgument, "Unknown flowName")
                    .detail("flowName", other),
            ),
        }
    }
}

/// One named procedure. `implemented` is queried before args are decoded, so
/// a stub never sees a payload.
pub trait Flow {
    fn name(&self) -> &'static str;

    fn implemented(&self) -> bool {
        true
    }

    fn run(
        &self,
        context: &mut FlowContext<'_>,
        args: &FlowArgs,
    ) -> Result<RunFlowResponse, RpcError>;
}

/// Execution context handed to every flow: the session, the timeout budget,
/// the shared evidence log and a couple of composable helpers, so flows never
/// re-derive logging or clipboard logic.
pub struct FlowContext<'a> {
    session: &'a Session,
    timeout: Duration,
    pub log: StepLog,
}

const CLIPBOARD_RETRY_TIMEOUT: Duration = Duration::from_millis(2_000);
const CLIPBOARD_RETRY_INTERVAL: Duration = Duration::from_millis(50);

impl<'a> FlowContext<'a> {
    pub fn new(session: &'a Session, timeout: Duration, log: StepLog) -> Self {
        Self {
            session,
            timeout,
            log,
        }
    }

    pub fn session(&self) -> &'a Session {
        self.session
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn into_log(self) -> StepLog {
        self.log
    }

    /// Best-effort clipboard write with verification and bounded retry. A
    /// failure degrades to a warning step; the caller decides whether to fall
    /// back to keystroke input.
    pub fn try_set_clipboard_text(&mut self, text: &str) -> bool {
        let mut params = BTreeMap::new();
        params.insert(
            "timeoutMs".to_string(),
            CLIPBOARD_RETRY_TIMEOUT.as_millis().to_string(),
        );
        params.insert("textLength".to_string(), text.len().to_string());
        let step = self
            .log
            .start("SetClipboardText", "SetClipboardText", None, Some(params));

        let connection = self.session.connection();
        let mut last_error: Option<String> = None;
        let written = poll_until(
            || {
                if let Err(e) = connection.set_clipboard_text(text) {
                    last_error = Some(e.to_string());
                    return false;
                }
                match connection.clipboard_text() {
                    Ok(Some(current)) if current == text => true,
                    Ok(_) => {
                        last_error = Some("clipboard read-back mismatch".to_string());
                        false
                    }
                    Err(e) => {
                        last_error = Some(e.to_string());
                        false
                    }
                }
            },
            CLIPBOARD_RETRY_TIMEOUT,
            CLIPBOARD_RETRY_INTERVAL,
        );

        if written {
            self.log.success(step);
            true
        } else {
            let mut error = RpcError::new(ErrorKind::ActionError, "Clipboard write failed");
            if let Some(reason) = last_error {
                error = error.detail("exceptionMessage", reason);
            }
            self.log.warning(step, error);
            false
        }
    }
}

/// Registry of flow implementations keyed by name.
#[derive(Default)]
pub struct FlowDispatcher {
    flows: BTreeMap<&'static str, Box<dyn Flow>>,
}

impl FlowDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The production set: attach is implemented, the remaining known flows
    /// are registered as explicit stubs.
    pub fn standard() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(Box::new(attach::AttachFlow));
        dispatcher.register(Box::new(StubFlow {
            name: names::IMPORT_VARIABLES,
        }));
        dispatcher.register(Box::new(StubFlow {
            name: names::IMPORT_PROGRAM_TEXT_PASTE,
        }));
        dispatcher.register(Box::new(StubFlow { name: names::BUILD }));
        dispatcher
    }

    pub fn register(&mut self, flow: Box<dyn Flow>) {
        self.flows.insert(flow.name(), flow);
    }

    /// Route one RunFlow request. Check order: missing name, then registry
    /// lookup, then the fixed known-name set to separate "not yet wired up"
    /// from a caller mistake.
    pub fn dispatch(
        &self,
        context: &mut FlowContext<'_>,
        flow_name: Option<&str>,
        args: Option<&Value>,
    ) -> Result<RunFlowResponse, RpcError> {
        let name = match flow_name.map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => {
                let error = RpcError::new(ErrorKind::InvalidArgument, "flowName is required");
                context
                    .log
                    .append_failure("DispatchFlow", "Dispatch flow", error.clone());
                return Err(error);
            }
        };
        debug!(flow = name, "dispatching flow");

        match self.flows.get(name) {
            Some(flow) if flow.implemented() => {
                let args = FlowArgs::decode(name, args).map_err(|error| {
                    context
                        .log
                        .append_failure("DecodeFlowArgs", "Decode flow args", error.clone());
                    error
                })?;
                flow.run(context, &args)
            }
            Some(_) => {
                let error = not_implemented(name);
                context
                    .log
                    .append_failure("DispatchFlow", "Dispatch flow", error.clone());
                Err(error)
            }
            None if names::is_known(name) => {
                let error = not_implemented(name);
                context
                    .log
                    .append_failure("DispatchFlow", "Dispatch flow", error.clone());
                Err(error)
            }
            None => {
                let error = RpcError::new(ErrorKind::InvalidArgument, "Unknown flowName")
                    .detail("flowName", name)
                    .detail("availableFlows", names::ALL.join(","));
                context
                    .log
                    .append_failure("DispatchFlow", "Dispatch flow", error.clone());
                Err(error)
            }
        }
    }
}

fn not_implemented(name: &str) -> RpcError {
    RpcError::new(ErrorKind::NotImplemented, "Flow is not implemented")
        .detail("flowName", name)
}

/// Placeholder for a recognized flow that has no implementation yet.
struct StubFlow {
    name: &'static str,
}

impl Flow for StubFlow {
    fn name(&self) -> &'static str {
        self.name
    }

    fn implemented(&self) -> bool {
        false
    }

    fn run(&self, _: &mut FlowContext<'_>, _: &FlowArgs) -> Result<RunFlowResponse, RpcError> {
        Err(not_implemented(self.name))
    }
}
