use std::collections::BTreeSet;

use mikado::layers::{base, persistent};
use mikado::{all_layers, Command, EdgeType, Goals, Graph, ViewStack};
use pretty_assertions::assert_eq;

fn new_stack() -> ViewStack {
    all_layers(Goals::new("Root", None))
}

fn edge(stack: &ViewStack, lower: i64, upper: i64) -> Option<EdgeType> {
    base(persistent(stack)).edge(lower, upper)
}

#[test]
fn test_adding_a_subgoal_blocks_the_root() {
    let mut stack = new_stack();
    stack.accept(Command::add("A", 1));

    let result = stack.q();
    let root = result.by_id(1).unwrap();
    assert_eq!(root.edges, vec![(2, EdgeType::Parent)]);
    assert!(!root.is_switchable);
    let goal = result.by_id(2).unwrap();
    assert_eq!(goal.name, "A");
    assert!(goal.is_switchable);
    stack.verify().unwrap();
}

#[test]
fn test_root_closes_after_its_subgoal() {
    let mut stack = new_stack();
    stack.accept(Command::add("A", 1));
    stack.accept(Command::toggle_close(2));
    assert!(!stack.q().by_id(2).unwrap().is_open);

    stack.accept(Command::toggle_close(1));
    let result = stack.q();
    assert!(!result.by_id(1).unwrap().is_open);
    stack.verify().unwrap();
}

#[test]
fn test_toggling_a_blocker_twice_removes_it() {
    let mut stack = new_stack();
    stack.accept(Command::add("A", 1));
    stack.accept(Command::add("B", 1));
    stack.accept(Command::toggle_link(2, 3, EdgeType::Blocker));
    assert_eq!(edge(&stack, 2, 3), Some(EdgeType::Blocker));

    stack.accept(Command::toggle_link(2, 3, EdgeType::Blocker));
    assert_eq!(edge(&stack, 2, 3), None);
    assert!(stack.q().by_id(2).unwrap().edges.is_empty());
    stack.verify().unwrap();
}

#[test]
fn test_insert_splices_into_parent_edge() {
    let mut stack = new_stack();
    stack.accept(Command::add("A", 1));
    stack.accept(Command::insert("X", 1, 2));

    assert_eq!(edge(&stack, 1, 2), None);
    assert_eq!(edge(&stack, 1, 3), Some(EdgeType::Parent));
    assert_eq!(edge(&stack, 3, 2), Some(EdgeType::Parent));
    assert_eq!(stack.q().by_id(3).unwrap().name, "X");
    stack.verify().unwrap();
}

#[test]
fn test_delete_tombstones_subtree_and_relinks() {
    let mut stack = new_stack();
    stack.accept(Command::add("A", 1)); // 2
    stack.accept(Command::add("B", 2)); // 3
    stack.accept(Command::add("C", 1)); // 4
    stack.accept(Command::add("D", 4)); // 5
    stack.accept(Command::toggle_link(3, 5, EdgeType::Blocker));
    stack.accept(Command::toggle_link(2, 4, EdgeType::Relation));

    stack.accept(Command::delete(2));
    let result = stack.q();
    assert_eq!(result.ids(), BTreeSet::from([1, 4, 5]));
    assert_eq!(edge(&stack, 1, 5), Some(EdgeType::Blocker));
    assert_eq!(edge(&stack, 1, 4), Some(EdgeType::Parent));
    assert_eq!(result.selection(), Some(1));
    stack.verify().unwrap();
}

#[test]
fn test_autolink_relates_new_goals() {
    let mut stack = new_stack();
    stack.accept(Command::add("Owner", 1));
    stack.accept(Command::toggle_autolink("foo", 2));
    stack.accept(Command::add("has foo in it", 1));

    assert_eq!(edge(&stack, 2, 3), Some(EdgeType::Relation));
    let owner = stack.q();
    assert_eq!(
        owner.by_id(2).unwrap().attrs.get("Autolink").map(String::as_str),
        Some("foo")
    );
    stack.verify().unwrap();
}

#[test]
fn test_cycle_is_rejected_without_log_growth() {
    let mut stack = new_stack();
    stack.accept(Command::add("A", 1));
    stack.accept(Command::add("B", 2));
    let before = stack.events().len();
    let result = stack.q();

    stack.accept(Command::toggle_link(3, 1, EdgeType::Blocker));
    assert_eq!(stack.events().len(), before);
    assert_eq!(stack.q(), result);
}

#[test]
fn test_views_compose() {
    let mut stack = new_stack();
    stack.accept(Command::add("Write parser", 1)); // 2
    stack.accept(Command::add("Write lexer", 1)); // 3
    stack.accept(Command::add("Docs", 1)); // 4
    stack.accept(Command::toggle_close(3));
    stack.accept(Command::select(1));

    stack.accept(Command::ToggleOpenView);
    stack.accept(Command::filter_by("write"));
    let result = stack.q();
    // the closed lexer is hidden, docs don't match, the selected root stays
    assert_eq!(result.ids(), BTreeSet::from([1, 2]));

    // progress is counted before filtering, over every goal once closed ones are shown again
    stack.accept(Command::ToggleOpenView);
    stack.accept(Command::ToggleProgress);
    let result = stack.q();
    assert_eq!(result.ids(), BTreeSet::from([1, 2, 3]));
    assert_eq!(
        result.by_id(1).unwrap().attrs.get("Progress").map(String::as_str),
        Some("1/4")
    );
}
