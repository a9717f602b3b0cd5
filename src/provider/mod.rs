//! The automation-provider seam.
//!
//! Everything above this module is platform-neutral: the resolution engine,
//! the session registry and the operation bodies only ever see these traits.
//! None of the connection/element traits are `Send` — provider state is
//! created on the scheduler's owning thread and must never leave it, and the
//! compiler enforces that here rather than a runtime check.

use std::time::Duration;

use crate::controls::ControlType;
use crate::errors::ProviderError;
use crate::keys::{Key, Modifier};

pub mod sim;
#[cfg(target_os = "windows")]
pub mod windows;

/// How an attach request identifies its target process.
#[derive(Debug, Clone, Default)]
pub struct AttachTarget {
    pub process_id: Option<u32>,
    /// Process name without extension.
    pub process_name: Option<String>,
    /// Preferred main-window title fragment when several processes share a
    /// name (case-insensitive).
    pub title_contains: Option<String>,
}

/// Factory for provider connections. Constructed on the owning thread by
/// [`create`]; one connection is made per session.
pub trait UiaProvider {
    fn attach(
        &self,
        target: &AttachTarget,
        timeout: Duration,
    ) -> Result<Box<dyn ProviderConnection>, ProviderError>;
}

/// A live binding to one attached target process.
pub trait ProviderConnection {
    fn process_id(&self) -> u32;

    /// Fresh main-window lookup on every call; the returned handle is as
    /// perishable as any other element handle.
    fn main_window(&self, timeout: Duration) -> Result<Box<dyn ElementHandle>, ProviderError>;

    /// Root of the whole desktop tree, for interruption sweeps that search
    /// outside the target's main window.
    fn desktop(&self) -> Result<Box<dyn ElementHandle>, ProviderError>;

    /// Best-effort activation of the target's main window. Failures degrade
    /// to a warning step, never to a failed call.
    fn bring_to_foreground(&self) -> Result<(), ProviderError>;

    /// Type literal text at the current keyboard focus.
    fn type_text(&self, text: &str) -> Result<(), ProviderError>;

    /// Press and release a single named key.
    fn press_key(&self, key: Key) -> Result<(), ProviderError>;

    /// Hold the modifiers, tap the key, release the modifiers in reverse
    /// order.
    fn press_chord(&self, modifiers: &[Modifier], key: Key) -> Result<(), ProviderError>;

    /// Single clipboard write attempt; retry policy lives above the seam.
    fn set_clipboard_text(&self, text: &str) -> Result<(), ProviderError>;

    /// Read the clipboard back, used to verify writes.
    fn clipboard_text(&self) -> Result<Option<String>, ProviderError>;
}

/// Handle to one element of the live UI tree.
///
/// Handles are only ever held for the duration of one operation; cross-call
/// references travel as selectors and are re-resolved at point of use.
pub trait ElementHandle {
    fn automation_id(&self) -> String;
    fn name(&self) -> String;
    fn class_name(&self) -> String;
    fn control_type(&self) -> Option<ControlType>;
    fn runtime_id(&self) -> Option<Vec<i32>>;
    fn is_enabled(&self) -> bool;

    /// Direct children in provider enumeration order.
    fn children(&self) -> Result<Vec<Box<dyn ElementHandle>>, ProviderError>;

    /// Full descendant set in provider enumeration order (depth-first).
    fn descendants(&self) -> Result<Vec<Box<dyn ElementHandle>>, ProviderError>;

    fn click(&self) -> Result<(), ProviderError>;
    fn double_click(&self) -> Result<(), ProviderError>;
    fn right_click(&self) -> Result<(), ProviderError>;
    fn focus(&self) -> Result<(), ProviderError>;

    /// Direct value assignment where the element supports it. `Ok(false)`
    /// means the element has no value facility and the caller should fall
    /// back to keyboard input.
    fn try_set_value(&self, text: &str) -> Result<bool, ProviderError>;

    /// Current textual value, where the element has one.
    fn value(&self) -> Option<String>;
}

/// Which provider backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderKind {
    /// Platform provider where one exists, otherwise an error.
    Auto,
    /// In-memory simulated desktop, for tests and protocol smoke runs.
    Sim,
}

/// Build the provider for this process. Must be called on the scheduler's
/// owning thread; the result is not `Send`.
pub fn create(kind: ProviderKind) -> Result<Box<dyn UiaProvider>, ProviderError> {
    match kind {
        ProviderKind::Sim => Ok(Box::new(sim::SimProvider::with_desktop(
            sim::demo_desktop(),
        ))),
        ProviderKind::Auto => {
            #[cfg(target_os = "windows")]
            {
                Ok(Box::new(windows::WindowsProvider::new()?))
            }
            #[cfg(not(target_os = "windows"))]
            {
                Err(ProviderError::UnsupportedPlatform)
            }
        }
    }
}
