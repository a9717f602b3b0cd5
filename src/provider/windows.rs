//! Windows automation backend on top of the `uiautomation` crate.
//!
//! The whole module is confined to the scheduler's worker thread: COM is
//! initialized there and none of these types are `Send`. Conversions between
//! the platform control-type enum and ours go through the same static name
//! table the selector engine uses.

use std::time::Duration;

use sysinfo::{ProcessesToUpdate, System};
use tracing::debug;
use uiautomation::clipboard::Clipboard;
use uiautomation::controls::ControlType as UiaControlType;
use uiautomation::inputs::Keyboard;
use uiautomation::types::TreeScope;
use uiautomation::{UIAutomation, UIElement};

use crate::controls::ControlType;
use crate::errors::ProviderError;
use crate::keys::{Key, Modifier};
use crate::poll::poll_until;
use crate::provider::{
    AttachTarget, ElementHandle, ProviderConnection, UiaProvider,
};

const KEY_INTERVAL_MS: u64 = 10;
const WINDOW_POLL_INTERVAL: Duration = Duration::from_millis(200);

fn platform(e: uiautomation::Error) -> ProviderError {
    ProviderError::Platform(e.to_string())
}

pub struct WindowsProvider {
    automation: UIAutomation,
}

impl WindowsProvider {
    pub fn new() -> Result<Self, ProviderError> {
        let automation = UIAutomation::new().map_err(platform)?;
        Ok(Self { automation })
    }

    /// Resolve the target process id: directly, or by scanning running
    /// processes for a name match (extension ignored). When several share
    /// the name, the title fragment picks the one whose main window matches.
    fn resolve_process_id(
        &self,
        target: &AttachTarget,
        timeout: Duration,
    ) -> Result<u32, ProviderError> {
        if let Some(pid) = target.process_id {
            return Ok(pid);
        }
        let wanted = target
            .process_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::ProcessNotFound(String::new()))?;

        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        let candidates: Vec<u32> = system
            .processes()
            .iter()
            .filter(|(_, process)| {
                let name = process.name().to_string_lossy();
                let base = name
                    .strip_suffix(".exe")
                    .unwrap_or(&name);
                base.eq_ignore_ascii_case(wanted)
            })
            .map(|(pid, _)| pid.as_u32())
            .collect();
        debug!(process = wanted, candidates = candidates.len(), "process scan");

        if candidates.is_empty() {
            return Err(ProviderError::ProcessNotFound(wanted.to_string()));
        }

        match target
            .title_contains
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            None => Ok(candidates[0]),
            Some(fragment) => {
                let fragment = fragment.to_lowercase();
                for pid in &candidates {
                    if let Ok(window) = find_main_window(&self.automation, *pid, timeout) {
                        let title = window.get_name().unwrap_or_default();
                        if title.to_lowercase().contains(&fragment) {
                            return Ok(*pid);
                        }
                    }
                }
                Err(ProviderError::ProcessNotFound(format!(
                    "{wanted} (no window title containing '{fragment}')"
                )))
            }
        }
    }
}

impl UiaProvider for WindowsProvider {
    fn attach(
        &self,
        target: &AttachTarget,
        timeout: Duration,
    ) -> Result<Box<dyn ProviderConnection>, ProviderError> {
        let process_id = self.resolve_process_id(target, timeout)?;
        // Attach is only real once the main window is reachable.
        find_main_window(&self.automation, process_id, timeout)?;
        Ok(Box::new(WindowsConnection {
            automation: self.automation.clone(),
            process_id,
        }))
    }
}

/// Top-level window lookup by owning process, polled until the deadline.
fn find_main_window(
    automation: &UIAutomation,
    process_id: u32,
    timeout: Duration,
) -> Result<UIElement, ProviderError> {
    let mut found: Option<UIElement> = None;
    let located = poll_until(
        || {
            let root = match automation.get_root_element() {
                Ok(root) => root,
                Err(_) => return false,
            };
            let condition = match automation.create_true_condition() {
                Ok(condition) => condition,
                Err(_) => return false,
            };
            let windows = match root.find_all(TreeScope::Children, &condition) {
                Ok(windows) => windows,
                Err(_) => return false,
            };
            for window in windows {
                if window.get_process_id().ok() == Some(process_id as i32) {
                    found = Some(window);
                    return true;
                }
            }
            false
        },
        timeout,
        WINDOW_POLL_INTERVAL,
    );
    if located {
        found.ok_or(ProviderError::MainWindowNotFound)
    } else {
        Err(ProviderError::MainWindowNotFound)
    }
}

struct WindowsConnection {
    automation: UIAutomation,
    process_id: u32,
}

impl ProviderConnection for WindowsConnection {
    fn process_id(&self) -> u32 {
        self.process_id
    }

    fn main_window(&self, timeout: Duration) -> Result<Box<dyn ElementHandle>, ProviderError> {
        let window = find_main_window(&self.automation, self.process_id, timeout)?;
        Ok(Box::new(WindowsElement {
            automation: self.automation.clone(),
            element: window,
        }))
    }

    fn desktop(&self) -> Result<Box<dyn ElementHandle>, ProviderError> {
        let root = self.automation.get_root_element().map_err(platform)?;
        Ok(Box::new(WindowsElement {
            automation: self.automation.clone(),
            element: root,
        }))
    }

    fn bring_to_foreground(&self) -> Result<(), ProviderError> {
        let window = find_main_window(&self.automation, self.process_id, WINDOW_POLL_INTERVAL)?;
        window.set_focus().map_err(platform)
    }

    fn type_text(&self, text: &str) -> Result<(), ProviderError> {
        Keyboard::new()
            .interval(KEY_INTERVAL_MS as u32)
            .send_text(text)
            .map_err(platform)
    }

    fn press_key(&self, key: Key) -> Result<(), ProviderError> {
        Keyboard::new()
            .interval(KEY_INTERVAL_MS as u32)
            .send_keys(&key_token(key))
            .map_err(platform)
    }

    fn press_chord(&self, modifiers: &[Modifier], key: Key) -> Result<(), ProviderError> {
        let mut sequence = String::new();
        for modifier in modifiers {
            sequence.push_str(modifier_prefix(*modifier));
        }
        sequence.push_str(&key_token(key));
        Keyboard::new()
            .interval(KEY_INTERVAL_MS as u32)
            .send_keys(&sequence)
            .map_err(platform)
    }

    fn set_clipboard_text(&self, text: &str) -> Result<(), ProviderError> {
        Clipboard::set_text(text).map_err(|e| ProviderError::ClipboardUnavailable(e.to_string()))
    }

    fn clipboard_text(&self) -> Result<Option<String>, ProviderError> {
        match Clipboard::get_text() {
            Ok(text) => Ok(Some(text)),
            Err(e) => Err(ProviderError::ClipboardUnavailable(e.to_string())),
        }
    }
}

/// SendKeys-style syntax used by the `uiautomation` input layer.
fn modifier_prefix(modifier: Modifier) -> &'static str {
    match modifier {
        Modifier::Ctrl => "^",
        Modifier::Shift => "+",
        Modifier::Alt => "%",
        Modifier::Meta => "{Win}",
    }
}

fn key_token(key: Key) -> String {
    match key {
        Key::Char(c) => c.to_ascii_lowercase().to_string(),
        Key::Enter => "{Enter}".to_string(),
        Key::Tab => "{Tab}".to_string(),
        Key::Escape => "{Esc}".to_string(),
        Key::Backspace => "{Backspace}".to_string(),
        Key::Delete => "{Delete}".to_string(),
        Key::Space => " ".to_string(),
        Key::Up => "{Up}".to_string(),
        Key::Down => "{Down}".to_string(),
        Key::Left => "{Left}".to_string(),
        Key::Right => "{Right}".to_string(),
        Key::Function(n) => format!("{{F{n}}}"),
    }
}

struct WindowsElement {
    automation: UIAutomation,
    element: UIElement,
}

impl WindowsElement {
    fn wrap(&self, element: UIElement) -> Box<dyn ElementHandle> {
        Box::new(WindowsElement {
            automation: self.automation.clone(),
            element,
        })
    }

    fn find(&self, scope: TreeScope) -> Result<Vec<Box<dyn ElementHandle>>, ProviderError> {
        let condition = self.automation.create_true_condition().map_err(platform)?;
        let elements = self
            .element
            .find_all(scope, &condition)
            .map_err(platform)?;
        Ok(elements.into_iter().map(|e| self.wrap(e)).collect())
    }
}

impl ElementHandle for WindowsElement {
    fn automation_id(&self) -> String {
        self.element.get_automation_id().unwrap_or_default()
    }

    fn name(&self) -> String {
        self.element.get_name().unwrap_or_default()
    }

    fn class_name(&self) -> String {
        self.element.get_classname().unwrap_or_default()
    }

    fn control_type(&self) -> Option<ControlType> {
        let platform_type = self.element.get_control_type().ok()?;
        ControlType::from_name(control_type_name(platform_type))
    }

    fn runtime_id(&self) -> Option<Vec<i32>> {
        self.element.get_runtime_id().ok()
    }

    fn is_enabled(&self) -> bool {
        self.element.is_enabled().unwrap_or(false)
    }

    fn children(&self) -> Result<Vec<Box<dyn ElementHandle>>, ProviderError> {
        self.find(TreeScope::Children)
    }

    fn descendants(&self) -> Result<Vec<Box<dyn ElementHandle>>, ProviderError> {
        self.find(TreeScope::Descendants)
    }

    fn click(&self) -> Result<(), ProviderError> {
        self.element.click().map_err(platform)
    }

    fn double_click(&self) -> Result<(), ProviderError> {
        self.element.double_click().map_err(platform)
    }

    fn right_click(&self) -> Result<(), ProviderError> {
        self.element.right_click().map_err(platform)
    }

    fn focus(&self) -> Result<(), ProviderError> {
        self.element.set_focus().map_err(platform)
    }

    fn try_set_value(&self, text: &str) -> Result<bool, ProviderError> {
        match self
            .element
            .get_pattern::<uiautomation::patterns::UIValuePattern>()
        {
            Ok(pattern) => {
                pattern.set_value(text).map_err(platform)?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    fn value(&self) -> Option<String> {
        self.element
            .get_pattern::<uiautomation::patterns::UIValuePattern>()
            .ok()
            .and_then(|pattern| pattern.get_value().ok())
    }
}

fn control_type_name(control_type: UiaControlType) -> &'static str {
    match control_type {
        UiaControlType::AppBar => "AppBar",
        UiaControlType::Button => "Button",
        UiaControlType::Calendar => "Calendar",
        UiaControlType::CheckBox => "CheckBox",
        UiaControlType::ComboBox => "ComboBox",
        UiaControlType::Custom => "Custom",
        UiaControlType::DataGrid => "DataGrid",
        UiaControlType::DataItem => "DataItem",
        UiaControlType::Document => "Document",
        UiaControlType::Edit => "Edit",
        UiaControlType::Group => "Group",
        UiaControlType::Header => "Header",
        UiaControlType::HeaderItem => "HeaderItem",
        UiaControlType::Hyperlink => "Hyperlink",
        UiaControlType::Image => "Image",
        UiaControlType::List => "List",
        UiaControlType::ListItem => "ListItem",
        UiaControlType::Menu => "Menu",
        UiaControlType::MenuBar => "MenuBar",
        UiaControlType::MenuItem => "MenuItem",
        UiaControlType::Pane => "Pane",
        UiaControlType::ProgressBar => "ProgressBar",
        UiaControlType::RadioButton => "RadioButton",
        UiaControlType::ScrollBar => "ScrollBar",
        UiaControlType::SemanticZoom => "SemanticZoom",
        UiaControlType::Separator => "Separator",
        UiaControlType::Slider => "Slider",
        UiaControlType::Spinner => "Spinner",
        UiaControlType::SplitButton => "SplitButton",
        UiaControlType::StatusBar => "StatusBar",
        UiaControlType::Tab => "Tab",
        UiaControlType::TabItem => "TabItem",
        UiaControlType::Table => "Table",
        UiaControlType::Text => "Text",
        UiaControlType::Thumb => "Thumb",
        UiaControlType::TitleBar => "TitleBar",
        UiaControlType::ToolBar => "ToolBar",
        UiaControlType::ToolTip => "ToolTip",
        UiaControlType::Tree => "Tree",
        UiaControlType::TreeItem => "TreeItem",
        UiaControlType::Window => "Window",
    }
}
