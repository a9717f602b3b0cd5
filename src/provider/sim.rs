//! In-memory simulated desktop.
//!
//! Backs `--provider sim` and the integration tests: a small mutable UI tree
//! plus enough input state (focus, clipboard, typed text) to exercise every
//! operation body without a real automation stack. Handles address nodes by
//! id and re-look them up on every call, so removing a node makes existing
//! handles fail the same way a torn-down native element would.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use crate::controls::ControlType;
use crate::errors::ProviderError;
use crate::keys::{Key, Modifier};
use crate::provider::{
    AttachTarget, ElementHandle, ProviderConnection, UiaProvider,
};

#[derive(Debug, Clone)]
struct NodeData {
    automation_id: String,
    name: String,
    class_name: String,
    control_type: Option<ControlType>,
    enabled: bool,
    /// Whether the node exposes direct value assignment.
    supports_value: bool,
    value: String,
    children: Vec<u64>,
    clicks: u32,
    double_clicks: u32,
    right_clicks: u32,
}

impl NodeData {
    fn blank() -> Self {
        Self {
            automation_id: String::new(),
            name: String::new(),
            class_name: String::new(),
            control_type: None,
            enabled: true,
            supports_value: false,
            value: String::new(),
            children: Vec::new(),
            clicks: 0,
            double_clicks: 0,
            right_clicks: 0,
        }
    }
}

#[derive(Debug, Default)]
struct InputState {
    focused: Option<u64>,
    /// Set by a Ctrl+A chord; the next typed text replaces instead of
    /// appending.
    select_all_pending: bool,
    clipboard: Option<String>,
    clipboard_failures_remaining: u32,
    pressed_keys: Vec<String>,
    foregrounded: bool,
}

struct TreeState {
    next_id: u64,
    nodes: HashMap<u64, NodeData>,
    desktop_id: u64,
    main_window_id: Option<u64>,
    input: InputState,
}

/// Shared handle to one simulated desktop. Cloning shares the underlying
/// tree, letting a test keep mutating it after the provider took ownership.
#[derive(Clone)]
pub struct SimTree {
    state: Rc<RefCell<TreeState>>,
}

/// Declarative node description for [`SimTree::add`].
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    automation_id: Option<String>,
    name: Option<String>,
    class_name: Option<String>,
    control_type: Option<ControlType>,
    enabled: Option<bool>,
    supports_value: bool,
    value: Option<String>,
}

impl NodeSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn automation_id(mut self, id: impl Into<String>) -> Self {
        self.automation_id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn class_name(mut self, class: impl Into<String>) -> Self {
        self.class_name = Some(class.into());
        self
    }

    pub fn control(mut self, control_type: ControlType) -> Self {
        self.control_type = Some(control_type);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = Some(false);
        self
    }

    /// Expose direct value assignment (the fast SetText path).
    pub fn with_value_pattern(mut self) -> Self {
        self.supports_value = true;
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl SimTree {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        let desktop = NodeData {
            name: "Desktop".to_string(),
            control_type: Some(ControlType::Pane),
            ..NodeData::blank()
        };
        nodes.insert(0, desktop);
        Self {
            state: Rc::new(RefCell::new(TreeState {
                next_id: 1,
                nodes,
                desktop_id: 0,
                main_window_id: None,
                input: InputState::default(),
            })),
        }
    }

    pub fn desktop_id(&self) -> u64 {
        self.state.borrow().desktop_id
    }

    /// Add a node under `parent` and return its id.
    pub fn add(&self, parent: u64, spec: NodeSpec) -> u64 {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        let node = NodeData {
            automation_id: spec.automation_id.unwrap_or_default(),
            name: spec.name.unwrap_or_default(),
            class_name: spec.class_name.unwrap_or_default(),
            control_type: spec.control_type,
            enabled: spec.enabled.unwrap_or(true),
            supports_value: spec.supports_value,
            value: spec.value.unwrap_or_default(),
            ..NodeData::blank()
        };
        state.nodes.insert(id, node);
        if let Some(parent) = state.nodes.get_mut(&parent) {
            parent.children.push(id);
        }
        id
    }

    /// Add a top-level window and mark it the attach target's main window.
    pub fn add_main_window(&self, spec: NodeSpec) -> u64 {
        let desktop = self.desktop_id();
        let id = self.add(desktop, spec);
        self.state.borrow_mut().main_window_id = Some(id);
        id
    }

    /// Remove a node (and its subtree) from the tree; live handles to it
    /// start failing.
    pub fn remove(&self, id: u64) {
        let mut state = self.state.borrow_mut();
        let mut doomed = vec![id];
        while let Some(current) = doomed.pop() {
            if let Some(node) = state.nodes.remove(&current) {
                doomed.extend(node.children);
            }
        }
        for node in state.nodes.values_mut() {
            node.children.retain(|child| *child != id);
        }
        if state.main_window_id == Some(id) {
            state.main_window_id = None;
        }
    }

    pub fn set_name(&self, id: u64, name: impl Into<String>) {
        if let Some(node) = self.state.borrow_mut().nodes.get_mut(&id) {
            node.name = name.into();
        }
    }

    pub fn set_enabled(&self, id: u64, enabled: bool) {
        if let Some(node) = self.state.borrow_mut().nodes.get_mut(&id) {
            node.enabled = enabled;
        }
    }

    // ---- test inspection ----

    pub fn value_of(&self, id: u64) -> Option<String> {
        self.state.borrow().nodes.get(&id).map(|n| n.value.clone())
    }

    pub fn clicks(&self, id: u64) -> u32 {
        self.state.borrow().nodes.get(&id).map_or(0, |n| n.clicks)
    }

    pub fn double_clicks(&self, id: u64) -> u32 {
        self.state
            .borrow()
            .nodes
            .get(&id)
            .map_or(0, |n| n.double_clicks)
    }

    pub fn right_clicks(&self, id: u64) -> u32 {
        self.state
            .borrow()
            .nodes
            .get(&id)
            .map_or(0, |n| n.right_clicks)
    }

    pub fn clipboard(&self) -> Option<String> {
        self.state.borrow().input.clipboard.clone()
    }

    /// Make the next `count` clipboard writes fail, to exercise the bounded
    /// retry.
    pub fn fail_clipboard_writes(&self, count: u32) {
        self.state.borrow_mut().input.clipboard_failures_remaining = count;
    }

    pub fn focused(&self) -> Option<u64> {
        self.state.borrow().input.focused
    }

    pub fn pressed_keys(&self) -> Vec<String> {
        self.state.borrow().input.pressed_keys.clone()
    }

    pub fn was_foregrounded(&self) -> bool {
        self.state.borrow().input.foregrounded
    }

    pub fn find_by_automation_id(&self, automation_id: &str) -> Option<u64> {
        let state = self.state.borrow();
        state
            .nodes
            .iter()
            .find(|(_, node)| node.automation_id == automation_id)
            .map(|(id, _)| *id)
    }
}

impl Default for SimTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Demo tree used by `--provider sim` smoke runs: one main window with a few
/// interactable controls.
pub fn demo_desktop() -> SimTree {
    let tree = SimTree::new();
    let window = tree.add_main_window(
        NodeSpec::new()
            .automation_id("MainWindow")
            .name("Workbench Studio")
            .class_name("WorkbenchWindow")
            .control(ControlType::Window),
    );
    tree.add(
        window,
        NodeSpec::new()
            .automation_id("btnOk")
            .name("OK")
            .control(ControlType::Button),
    );
    tree.add(
        window,
        NodeSpec::new()
            .automation_id("btnCancel")
            .name("Cancel")
            .control(ControlType::Button),
    );
    tree.add(
        window,
        NodeSpec::new()
            .automation_id("txtName")
            .control(ControlType::Edit)
            .with_value_pattern(),
    );
    tree.add(
        window,
        NodeSpec::new()
            .automation_id("txtNotes")
            .control(ControlType::Edit),
    );
    tree.add(
        window,
        NodeSpec::new()
            .automation_id("lblStatus")
            .name("Ready")
            .control(ControlType::Text),
    );
    tree
}

pub struct SimProvider {
    tree: SimTree,
    process_id: u32,
    process_name: String,
}

impl SimProvider {
    pub fn with_desktop(tree: SimTree) -> Self {
        Self {
            tree,
            process_id: 4242,
            process_name: "workbench".to_string(),
        }
    }

    pub fn named(tree: SimTree, process_id: u32, process_name: impl Into<String>) -> Self {
        Self {
            tree,
            process_id,
            process_name: process_name.into(),
        }
    }

    pub fn tree(&self) -> SimTree {
        self.tree.clone()
    }
}

impl UiaProvider for SimProvider {
    fn attach(
        &self,
        target: &AttachTarget,
        _timeout: Duration,
    ) -> Result<Box<dyn ProviderConnection>, ProviderError> {
        let pid_match = target.process_id.map_or(false, |pid| pid == self.process_id);
        let name_match = target
            .process_name
            .as_deref()
            .map_or(false, |name| name.eq_ignore_ascii_case(&self.process_name));
        if !pid_match && !name_match {
            return Err(ProviderError::ProcessNotFound(
                target
                    .process_name
                    .clone()
                    .or_else(|| target.process_id.map(|pid| pid.to_string()))
                    .unwrap_or_default(),
            ));
        }

        if let Some(fragment) = target
            .title_contains
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            let state = self.tree.state.borrow();
            let title = state
                .main_window_id
                .and_then(|id| state.nodes.get(&id))
                .map(|node| node.name.clone())
                .ok_or(ProviderError::MainWindowNotFound)?;
            if !title.to_lowercase().contains(&fragment.to_lowercase()) {
                return Err(ProviderError::ProcessNotFound(format!(
                    "no window title containing '{fragment}'"
                )));
            }
        }

        Ok(Box::new(SimConnection {
            tree: self.tree.clone(),
            process_id: self.process_id,
        }))
    }
}

struct SimConnection {
    tree: SimTree,
    process_id: u32,
}

impl SimConnection {
    fn handle(&self, id: u64) -> Box<dyn ElementHandle> {
        Box::new(SimHandle {
            tree: self.tree.clone(),
            id,
        })
    }
}

impl ProviderConnection for SimConnection {
    fn process_id(&self) -> u32 {
        self.process_id
    }

    fn main_window(&self, _timeout: Duration) -> Result<Box<dyn ElementHandle>, ProviderError> {
        let id = self
            .tree
            .state
            .borrow()
            .main_window_id
            .ok_or(ProviderError::MainWindowNotFound)?;
        if !self.tree.state.borrow().nodes.contains_key(&id) {
            return Err(ProviderError::MainWindowNotFound);
        }
        Ok(self.handle(id))
    }

    fn desktop(&self) -> Result<Box<dyn ElementHandle>, ProviderError> {
        let id = self.tree.state.borrow().desktop_id;
        Ok(self.handle(id))
    }

    fn bring_to_foreground(&self) -> Result<(), ProviderError> {
        self.tree.state.borrow_mut().input.foregrounded = true;
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), ProviderError> {
        let mut state = self.tree.state.borrow_mut();
        let replace = state.input.select_all_pending;
        state.input.select_all_pending = false;
        state.input.pressed_keys.push(format!("text:{text}"));
        if let Some(focused) = state.input.focused {
            if let Some(node) = state.nodes.get_mut(&focused) {
                if replace {
                    node.value.clear();
                }
                node.value.push_str(text);
            }
        }
        Ok(())
    }

    fn press_key(&self, key: Key) -> Result<(), ProviderError> {
        self.tree
            .state
            .borrow_mut()
            .input
            .pressed_keys
            .push(format!("key:{key:?}"));
        Ok(())
    }

    fn press_chord(&self, modifiers: &[Modifier], key: Key) -> Result<(), ProviderError> {
        let mut state = self.tree.state.borrow_mut();
        state
            .input
            .pressed_keys
            .push(format!("chord:{modifiers:?}+{key:?}"));
        if modifiers.len() == 1 && modifiers[0] == Modifier::Ctrl && key == Key::Char('A') {
            state.input.select_all_pending = true;
        }
        Ok(())
    }

    fn set_clipboard_text(&self, text: &str) -> Result<(), ProviderError> {
        let mut state = self.tree.state.borrow_mut();
        if state.input.clipboard_failures_remaining > 0 {
            state.input.clipboard_failures_remaining -= 1;
            return Err(ProviderError::ClipboardUnavailable(
                "clipboard is busy".to_string(),
            ));
        }
        state.input.clipboard = Some(text.to_string());
        Ok(())
    }

    fn clipboard_text(&self) -> Result<Option<String>, ProviderError> {
        Ok(self.tree.state.borrow().input.clipboard.clone())
    }
}

struct SimHandle {
    tree: SimTree,
    id: u64,
}

impl SimHandle {
    fn read<R>(&self, f: impl FnOnce(&NodeData) -> R) -> Option<R> {
        self.tree.state.borrow().nodes.get(&self.id).map(f)
    }

    fn write<R>(
        &self,
        f: impl FnOnce(&mut NodeData) -> R,
    ) -> Result<R, ProviderError> {
        self.tree
            .state
            .borrow_mut()
            .nodes
            .get_mut(&self.id)
            .map(f)
            .ok_or(ProviderError::ElementNotAvailable)
    }

    fn collect_descendants(state: &TreeState, id: u64, out: &mut Vec<u64>) {
        if let Some(node) = state.nodes.get(&id) {
            for child in &node.children {
                out.push(*child);
                Self::collect_descendants(state, *child, out);
            }
        }
    }
}

impl ElementHandle for SimHandle {
    fn automation_id(&self) -> String {
        self.read(|n| n.automation_id.clone()).unwrap_or_default()
    }

    fn name(&self) -> String {
        self.read(|n| n.name.clone()).unwrap_or_default()
    }

    fn class_name(&self) -> String {
        self.read(|n| n.class_name.clone()).unwrap_or_default()
    }

    fn control_type(&self) -> Option<ControlType> {
        self.read(|n| n.control_type).flatten()
    }

    fn runtime_id(&self) -> Option<Vec<i32>> {
        Some(vec![self.id as i32])
    }

    fn is_enabled(&self) -> bool {
        self.read(|n| n.enabled).unwrap_or(false)
    }

    fn children(&self) -> Result<Vec<Box<dyn ElementHandle>>, ProviderError> {
        let state = self.tree.state.borrow();
        let node = state
            .nodes
            .get(&self.id)
            .ok_or(ProviderError::ElementNotAvailable)?;
        Ok(node
            .children
            .iter()
            .map(|id| {
                Box::new(SimHandle {
                    tree: self.tree.clone(),
                    id: *id,
                }) as Box<dyn ElementHandle>
            })
            .collect())
    }

    fn descendants(&self) -> Result<Vec<Box<dyn ElementHandle>>, ProviderError> {
        let state = self.tree.state.borrow();
        if !state.nodes.contains_key(&self.id) {
            return Err(ProviderError::ElementNotAvailable);
        }
        let mut ids = Vec::new();
        Self::collect_descendants(&state, self.id, &mut ids);
        Ok(ids
            .into_iter()
            .map(|id| {
                Box::new(SimHandle {
                    tree: self.tree.clone(),
                    id,
                }) as Box<dyn ElementHandle>
            })
            .collect())
    }

    fn click(&self) -> Result<(), ProviderError> {
        self.write(|n| n.clicks += 1)
    }

    fn double_click(&self) -> Result<(), ProviderError> {
        self.write(|n| n.double_clicks += 1)
    }

    fn right_click(&self) -> Result<(), ProviderError> {
        self.write(|n| n.right_clicks += 1)
    }

    fn focus(&self) -> Result<(), ProviderError> {
        if !self.tree.state.borrow().nodes.contains_key(&self.id) {
            return Err(ProviderError::ElementNotAvailable);
        }
        self.tree.state.borrow_mut().input.focused = Some(self.id);
        Ok(())
    }

    fn try_set_value(&self, text: &str) -> Result<bool, ProviderError> {
        self.write(|n| {
            if n.supports_value {
                n.value = text.to_string();
                true
            } else {
                false
            }
        })
    }

    fn value(&self) -> Option<String> {
        self.read(|n| {
            if n.supports_value || !n.value.is_empty() {
                Some(n.value.clone())
            } else {
                None
            }
        })
        .flatten()
    }
}
