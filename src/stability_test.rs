//! Tests for `StabilityTracker`.

use std::collections::BTreeSet;

use crate::order::Shuffler;
use crate::stability::StabilityTracker;

fn in_order() -> Shuffler {
  Shuffler::new(false, None)
}

fn names(items: &[&str]) -> BTreeSet<String> {
  items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn schedule_and_pop_never_ran() {
  let mut t = StabilityTracker::new();
  t.schedule("a");
  assert_eq!(t.pop_never_ran(&mut in_order()).as_deref(), Some("a"));
  assert_eq!(t.pop_never_ran(&mut in_order()), None);
  t.schedule("a");
  assert_eq!(
    t.pop_never_ran(&mut in_order()),
    None,
    "a node that ran is never rescheduled"
  );
  assert_eq!(t.ran_nodes(), &names(&["a"]));
}

#[test]
fn record_dependency_expands_graph_lazily() {
  let mut t = StabilityTracker::new();
  t.schedule("b");
  t.pop_never_ran(&mut in_order());
  t.record_dependency("a", "b");
  assert_eq!(t.pop_never_ran(&mut in_order()).as_deref(), Some("a"));
  assert_eq!(t.dependents("a"), Some(&names(&["b"])));
  assert_eq!(t.node_count(), 2);
}

#[test]
fn change_triggers_dependents() {
  let mut t = StabilityTracker::new();
  t.mark_reactor_result("b", "gw", false, &names(&["a"]));
  assert_eq!(t.pop_triggered(&mut in_order()), None);
  t.mark_reactor_result("a", "ip", true, &BTreeSet::new());
  assert_eq!(t.pop_triggered(&mut in_order()).as_deref(), Some("b"));
  assert_eq!(t.pop_triggered(&mut in_order()), None);
}

#[test]
fn has_deps_classification_only_grows() {
  let mut t = StabilityTracker::new();
  t.mark_reactor_result("b", "gw", false, &names(&["a"]));
  assert!(t.has_deps("b", "gw"));
  t.mark_reactor_result("b", "gw", true, &BTreeSet::new());
  assert!(t.has_deps("b", "gw"));
  assert!(!t.has_deps("b", "other"));
}

#[test]
fn stability_rules() {
  let mut t = StabilityTracker::new();
  t.update_stability("n", true, true, true);
  assert!(!t.node_is_stable("n"));
  t.update_stability("n", false, true, false);
  assert!(t.node_is_stable("n"));
  t.update_stability("n", true, false, false);
  assert!(t.node_is_stable("n"), "unchanged deps run keeps stability");
  t.update_stability("n", true, false, true);
  assert!(!t.node_is_stable("n"));
  t.update_stability("n", false, true, true);
  assert!(!t.node_is_stable("n"));
  assert_eq!(t.unstable_nodes(), vec!["n".to_string()]);
  assert_eq!(t.known_nodes(), vec!["n".to_string()]);
}

#[test]
fn unknown_node_is_not_stable() {
  let t = StabilityTracker::new();
  assert!(!t.node_is_stable("ghost"));
}

#[test]
fn never_ran_nodes_are_picked_in_shuffled_order() {
  let expected: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
  let mut orders = BTreeSet::new();
  for seed in 0..16 {
    let mut t = StabilityTracker::new();
    for node in &expected {
      t.schedule(node);
    }
    let mut order = Shuffler::new(true, Some(seed));
    let popped: Vec<String> = std::iter::from_fn(|| t.pop_never_ran(&mut order)).collect();
    let mut sorted = popped.clone();
    sorted.sort();
    assert_eq!(sorted, expected);
    orders.insert(popped);
  }
  assert!(orders.len() > 1, "every seed popped the same order");
}

#[test]
fn triggered_nodes_are_picked_in_shuffled_order() {
  let mut firsts = BTreeSet::new();
  for seed in 0..16 {
    let mut t = StabilityTracker::new();
    for dependent in ["w", "x", "y", "z"] {
      t.record_dependency("p", dependent);
    }
    t.trigger_dependents("p");
    let mut order = Shuffler::new(true, Some(seed));
    firsts.extend(t.pop_triggered(&mut order));
  }
  assert!(firsts.len() > 1, "always started with {firsts:?}");
}
