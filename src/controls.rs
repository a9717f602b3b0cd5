//! Static control-type name table.
//!
//! The lookup is case-insensitive and covers the standard UI Automation
//! control types; an unknown name is rejected before any tree traversal.

use serde::{Deserialize, Serialize};

/// Platform-neutral control types, mirroring the UI Automation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlType {
    AppBar,
    Button,
    Calendar,
    CheckBox,
    ComboBox,
    Custom,
    DataGrid,
    DataItem,
    Document,
    Edit,
    Group,
    Header,
    HeaderItem,
    Hyperlink,
    Image,
    List,
    ListItem,
    Menu,
    MenuBar,
    MenuItem,
    Pane,
    ProgressBar,
    RadioButton,
    ScrollBar,
    SemanticZoom,
    Separator,
    Slider,
    Spinner,
    SplitButton,
    StatusBar,
    Tab,
    TabItem,
    Table,
    Text,
    Thumb,
    TitleBar,
    ToolBar,
    ToolTip,
    Tree,
    TreeItem,
    Window,
}

impl ControlType {
    /// Resolve a control-type name, ignoring case and surrounding whitespace.
    pub fn from_name(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lower = trimmed.to_lowercase();
        let ct = match lower.as_str() {
            "appbar" => ControlType::AppBar,
            "button" => ControlType::Button,
            "calendar" => ControlType::Calendar,
            "checkbox" => ControlType::CheckBox,
            "combobox" => ControlType::ComboBox,
            "custom" => ControlType::Custom,
            "datagrid" => ControlType::DataGrid,
            "dataitem" => ControlType::DataItem,
            "document" => ControlType::Document,
            "edit" => ControlType::Edit,
            "group" => ControlType::Group,
            "header" => ControlType::Header,
            "headeritem" => ControlType::HeaderItem,
            "hyperlink" => ControlType::Hyperlink,
            "image" => ControlType::Image,
            "list" => ControlType::List,
            "listitem" => ControlType::ListItem,
            "menu" => ControlType::Menu,
            "menubar" => ControlType::MenuBar,
            "menuitem" => ControlType::MenuItem,
            "pane" => ControlType::Pane,
            "progressbar" => ControlType::ProgressBar,
            "radiobutton" => ControlType::RadioButton,
            "scrollbar" => ControlType::ScrollBar,
            "semanticzoom" => ControlType::SemanticZoom,
            "separator" => ControlType::Separator,
            "slider" => ControlType::Slider,
            "spinner" => ControlType::Spinner,
            "splitbutton" => ControlType::SplitButton,
            "statusbar" => ControlType::StatusBar,
            "tab" => ControlType::Tab,
            "tabitem" => ControlType::TabItem,
            "table" => ControlType::Table,
            "text" => ControlType::Text,
            "thumb" => ControlType::Thumb,
            "titlebar" => ControlType::TitleBar,
            "toolbar" => ControlType::ToolBar,
            "tooltip" => ControlType::ToolTip,
            "tree" => ControlType::Tree,
            "treeitem" => ControlType::TreeItem,
            "window" => ControlType::Window,
            _ => return None,
        };
        Some(ct)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControlType::AppBar => "AppBar",
            ControlType::Button => "Button",
            ControlType::Calendar => "Calendar",
            ControlType::CheckBox => "CheckBox",
            ControlType::ComboBox => "ComboBox",
            ControlType::Custom => "Custom",
            ControlType::DataGrid => "DataGrid",
            ControlType::DataItem => "DataItem",
            ControlType::Document => "Document",
            ControlType::Edit => "Edit",
            ControlType::Group => "Group",
            ControlType::Header => "Header",
            ControlType::HeaderItem => "HeaderItem",
            ControlType::Hyperlink => "Hyperlink",
            ControlType::Image => "Image",
            ControlType::List => "List",
            ControlType::ListItem => "ListItem",
            ControlType::Menu => "Menu",
            ControlType::MenuBar => "MenuBar",
            ControlType::MenuItem => "MenuItem",
            ControlType::Pane => "Pane",
            ControlType::ProgressBar => "ProgressBar",
            ControlType::RadioButton => "RadioButton",
            ControlType::ScrollBar => "ScrollBar",
            ControlType::SemanticZoom => "SemanticZoom",
            ControlType::Separator => "Separator",
            ControlType::Slider => "Slider",
            ControlType::Spinner => "Spinner",
            ControlType::SplitButton => "SplitButton",
            ControlType::StatusBar => "StatusBar",
            ControlType::Tab => "Tab",
            ControlType::TabItem => "TabItem",
            ControlType::Table => "Table",
            ControlType::Text => "Text",
            ControlType::Thumb => "Thumb",
            ControlType::TitleBar => "TitleBar",
            ControlType::ToolBar => "ToolBar",
            ControlType::ToolTip => "ToolTip",
            ControlType::Tree => "Tree",
            ControlType::TreeItem => "TreeItem",
            ControlType::Window => "Window",
        }
    }
}

impl std::fmt::Display for ControlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(ControlType::from_name("button"), Some(ControlType::Button));
        assert_eq!(ControlType::from_name("BUTTON"), Some(ControlType::Button));
        assert_eq!(
            ControlType::from_name("  DataGrid "),
            Some(ControlType::DataGrid)
        );
    }

    #[test]
    fn unknown_or_blank_names_are_rejected() {
        assert_eq!(ControlType::from_name("Buton"), None);
        assert_eq!(ControlType::from_name(""), None);
        assert_eq!(ControlType::from_name("   "), None);
    }

    #[test]
    fn names_round_trip_through_the_table() {
        for ct in [
            ControlType::Edit,
            ControlType::TreeItem,
            ControlType::Window,
            ControlType::SplitButton,
        ] {
            assert_eq!(ControlType::from_name(ct.name()), Some(ct));
        }
    }
}
