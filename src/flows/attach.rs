//! The attach flow: confirm the session's main window is reachable, bring it
//! forward, and report basic process/window facts. No business operations.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::contracts::RunFlowResponse;
use crate::errors::{ErrorKind, RpcError};
use crate::flows::popup::{self, PopupPolicy};
use crate::flows::{names, Flow, FlowArgs, FlowContext};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachArgs {
    /// Optional interruption sweep before the foreground step.
    pub popup: Option<PopupPolicy>,
}

pub struct AttachFlow;

impl Flow for AttachFlow {
    fn name(&self) -> &'static str {
        names::ATTACH
    }

    fn run(
        &self,
        context: &mut FlowContext<'_>,
        args: &FlowArgs,
    ) -> Result<RunFlowResponse, RpcError> {
        let FlowArgs::Attach(args) = args else {
            return Err(RpcError::new(
                ErrorKind::InvalidArgument,
                "Wrong args payload for flow",
            ));
        };

        let step = context
            .log
            .start("GetMainWindow", "Get main window", None, None);
        let window = match context.session().main_window(context.timeout()) {
            Ok(window) => {
                context.log.success(step);
                window
            }
            Err(e) => {
                let error =
                    RpcError::from_provider(ErrorKind::ConfigError, "Failed to get main window", &e);
                context.log.failure(step, error.clone());
                return Err(error);
            }
        };

        popup::try_handle(context, window.as_ref(), args.popup.as_ref(), "attach");

        let focus = context.log.start(
            "BringToForeground",
            "Bring main window to foreground",
            None,
            None,
        );
        match window.focus() {
            Ok(()) => context.log.success(focus),
            Err(e) => {
                // Non-fatal.
                context.log.warning(
                    focus,
                    RpcError::from_provider(
                        ErrorKind::ActionError,
                        "Failed to bring window to foreground",
                        &e,
                    ),
                );
            }
        }

        let mut data = BTreeMap::new();
        data.insert(
            "processId".to_string(),
            context.session().process_id().to_string(),
        );
        data.insert("mainWindowTitle".to_string(), window.name());
        Ok(RunFlowResponse { data })
    }
}
