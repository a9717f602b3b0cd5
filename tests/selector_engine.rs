//! Resolution-engine behavior against a simulated UI tree: structural
//! validation, the zero/one/many classification, and the matching rules.

use std::time::Duration;

use uia_agent::controls::ControlType;
use uia_agent::finder::{self, FindFailureKind};
use uia_agent::provider::sim::{NodeSpec, SimProvider, SimTree};
use uia_agent::provider::{AttachTarget, ElementHandle, UiaProvider};
use uia_agent::selector::{ElementSelector, SelectorStep};

fn window_with_buttons() -> (SimTree, Box<dyn ElementHandle>) {
    let tree = SimTree::new();
    let window = tree.add_main_window(
        NodeSpec::new()
            .automation_id("MainWindow")
            .name("Fixture")
            .control(ControlType::Window),
    );
    tree.add(
        window,
        NodeSpec::new()
            .automation_id("btnSave")
            .name("Save")
            .class_name("PushButton")
            .control(ControlType::Button),
    );
    tree.add(
        window,
        NodeSpec::new()
            .automation_id("btnSaveAll")
            .name("Save All")
            .class_name("PushButton")
            .control(ControlType::Button),
    );
    let group = tree.add(
        window,
        NodeSpec::new()
            .automation_id("grpDetails")
            .control(ControlType::Group),
    );
    tree.add(
        group,
        NodeSpec::new()
            .automation_id("txtTitle")
            .name("  Import \t Variables ")
            .control(ControlType::Edit),
    );

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
    let anchor = connection.main_window(Duration::from_millis(100)).unwrap();
    (tree, anchor)
}

fn step(configure: impl FnOnce(&mut SelectorStep)) -> SelectorStep {
    let mut step = SelectorStep::default();
    configure(&mut step);
    step
}

/// Resolve a selector that is expected to miss and hand back the failure.
fn resolve_err(anchor: &dyn ElementHandle, selector: &ElementSelector) -> finder::FindFailure {
    match finder::resolve(anchor, selector) {
        Ok(element) => panic!("selector unexpectedly resolved {}", element.automation_id()),
        Err(failure) => failure,
    }
}

#[test]
fn empty_path_is_a_structural_error() {
    let (_tree, anchor) = window_with_buttons();
    let failure = resolve_err(anchor.as_ref(), &ElementSelector::default());
    assert_eq!(failure.kind, FindFailureKind::InvalidSelector);
}

#[test]
fn filterless_step_is_rejected_before_traversal() {
    let selector = ElementSelector::new(vec![SelectorStep::default()]);
    let failure = finder::validate(&selector).unwrap_err();
    assert_eq!(failure.kind, FindFailureKind::InvalidSelector);
    assert_eq!(failure.details["stepIndex"], "0");
}

#[test]
fn unknown_control_type_is_rejected_before_traversal() {
    let selector = ElementSelector::new(vec![step(|s| {
        s.control_type = Some("Buton".to_string());
    })]);
    let failure = finder::validate(&selector).unwrap_err();
    assert_eq!(failure.kind, FindFailureKind::InvalidControlType);
    assert_eq!(failure.details["controlType"], "Buton");
}

#[test]
fn zero_matches_classify_as_not_found() {
    let (_tree, anchor) = window_with_buttons();
    let selector = ElementSelector::new(vec![step(|s| {
        s.automation_id = Some("btnMissing".to_string());
    })]);
    let failure = resolve_err(anchor.as_ref(), &selector);
    assert_eq!(failure.kind, FindFailureKind::NotFound);
}

#[test]
fn multiple_matches_without_index_are_ambiguous() {
    let (_tree, anchor) = window_with_buttons();
    let selector = ElementSelector::new(vec![step(|s| {
        s.control_type = Some("Button".to_string());
    })]);
    let failure = resolve_err(anchor.as_ref(), &selector);
    assert_eq!(failure.kind, FindFailureKind::Ambiguous);
    assert_eq!(failure.details["matches"], "2");
    assert!(failure.details.contains_key("hint"));
}

#[test]
fn index_selects_deterministically_and_is_bounds_checked() {
    let (_tree, anchor) = window_with_buttons();
    let by_index = |i: usize| {
        ElementSelector::new(vec![step(|s| {
            s.control_type = Some("Button".to_string());
            s.index = Some(i);
        })])
    };

    let first = finder::resolve(anchor.as_ref(), &by_index(0)).unwrap();
    assert_eq!(first.automation_id(), "btnSave");
    let second = finder::resolve(anchor.as_ref(), &by_index(1)).unwrap();
    assert_eq!(second.automation_id(), "btnSaveAll");

    let failure = resolve_err(anchor.as_ref(), &by_index(2));
    assert_eq!(failure.kind, FindFailureKind::IndexOutOfRange);
    assert_eq!(failure.details["index"], "2");
    assert_eq!(failure.details["matches"], "2");
}

#[test]
fn exact_name_wins_over_contains() {
    let (_tree, anchor) = window_with_buttons();
    // "Save" as contains would hit both buttons; as exact it hits one.
    let selector = ElementSelector::new(vec![step(|s| {
        s.name = Some("Save".to_string());
        s.name_contains = Some("Save".to_string());
    })]);
    let found = finder::resolve(anchor.as_ref(), &selector).unwrap();
    assert_eq!(found.automation_id(), "btnSave");
}

#[test]
fn children_scope_does_not_see_grandchildren() {
    let (_tree, anchor) = window_with_buttons();
    let descendants = ElementSelector::new(vec![step(|s| {
        s.automation_id = Some("txtTitle".to_string());
    })]);
    assert!(finder::resolve(anchor.as_ref(), &descendants).is_ok());

    let children_only = ElementSelector::new(vec![step(|s| {
        s.search = uia_agent::selector::SearchScope::Children;
        s.automation_id = Some("txtTitle".to_string());
    })]);
    let failure = resolve_err(anchor.as_ref(), &children_only);
    assert_eq!(failure.kind, FindFailureKind::NotFound);
}

#[test]
fn multi_step_path_walks_through_intermediate_anchors() {
    let (_tree, anchor) = window_with_buttons();
    let selector = ElementSelector::new(vec![
        step(|s| s.automation_id = Some("grpDetails".to_string())),
        step(|s| s.automation_id = Some("txtTitle".to_string())),
    ]);
    let found = finder::resolve(anchor.as_ref(), &selector).unwrap();
    assert_eq!(found.control_type(), Some(ControlType::Edit));
}

#[test]
fn case_and_whitespace_flags_apply_to_name_matching() {
    let (_tree, anchor) = window_with_buttons();
    let selector = ElementSelector::new(vec![step(|s| {
        s.name = Some("import variables".to_string());
        s.ignore_case = true;
        s.normalize_whitespace = true;
    })]);
    assert!(finder::resolve(anchor.as_ref(), &selector).is_ok());

    let strict = ElementSelector::new(vec![step(|s| {
        s.name = Some("import variables".to_string());
    })]);
    let failure = resolve_err(anchor.as_ref(), &strict);
    assert_eq!(failure.kind, FindFailureKind::NotFound);
}

#[test]
fn failures_map_into_the_rpc_taxonomy() {
    use uia_agent::ErrorKind;

    let (_tree, anchor) = window_with_buttons();
    let ambiguous = resolve_err(
        anchor.as_ref(),
        &ElementSelector::new(vec![step(|s| {
            s.control_type = Some("Button".to_string());
        })]),
    )
    .into_rpc_error();
    assert_eq!(ambiguous.kind, ErrorKind::FindError);
    assert_eq!(ambiguous.message, "Selector matched multiple elements");
    assert_eq!(ambiguous.details.as_ref().unwrap()["failureKind"], "Ambiguous");

    let invalid = finder::validate(&ElementSelector::default())
        .unwrap_err()
        .into_rpc_error();
    assert_eq!(invalid.kind, ErrorKind::InvalidArgument);
}
