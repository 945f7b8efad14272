//! Which nodes still need work during a resolution, and why.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::order::Shuffler;

/// Per-resolution bookkeeping of node state and dependency edges.
#[derive(Debug, Default)]
pub struct StabilityTracker {
  /// Nodes referenced somewhere but not run yet.
  never_ran: BTreeSet<String>,
  /// Nodes that had their initial run.
  ran_at_least_once: BTreeSet<String>,
  /// Nodes that must rerun because a node they read changed.
  triggered: BTreeSet<String>,
  /// A node is stable when its reactors without deps stopped changing.
  stable: BTreeMap<String, bool>,
  /// Reactors per node that were seen reading other nodes. Only ever grows.
  reactors_with_deps: BTreeMap<String, BTreeSet<String>>,
  /// Provider node mapped to the nodes that read it.
  dependents: BTreeMap<String, BTreeSet<String>>,
}

impl StabilityTracker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Schedules `node` for an initial run unless it already had one.
  pub fn schedule(&mut self, node: &str) {
    if !self.ran_at_least_once.contains(node) {
      self.never_ran.insert(node.to_string());
    }
  }

  /// Takes a node awaiting its initial run, picked by `order`, and marks it
  /// as ran.
  pub fn pop_never_ran(&mut self, order: &mut Shuffler) -> Option<String> {
    let node = order.choose(&self.never_ran)?.clone();
    self.never_ran.remove(&node);
    self.ran_at_least_once.insert(node.clone());
    self.reactors_with_deps.entry(node.clone()).or_default();
    Some(node)
  }

  pub fn pop_triggered(&mut self, order: &mut Shuffler) -> Option<String> {
    let node = order.choose(&self.triggered)?.clone();
    self.triggered.remove(&node);
    Some(node)
  }

  /// Records that `dependent` read `provider`.
  ///
  /// An unseen provider is scheduled for its initial run.
  pub fn record_dependency(&mut self, provider: &str, dependent: &str) {
    self.schedule(provider);
    self
      .dependents
      .entry(provider.to_string())
      .or_default()
      .insert(dependent.to_string());
  }

  /// Applies the result of one reactor run on `node`.
  pub fn mark_reactor_result<'a>(
    &mut self,
    node: &str,
    reactor: &str,
    changed: bool,
    accessed: impl IntoIterator<Item = &'a String>,
  ) {
    let mut has_deps = false;
    for provider in accessed {
      has_deps = true;
      self.record_dependency(provider, node);
    }
    if has_deps {
      self
        .reactors_with_deps
        .entry(node.to_string())
        .or_default()
        .insert(reactor.to_string());
    }
    if changed {
      self.trigger_dependents(node);
    }
  }

  /// Marks every node that reads `node` for a rerun.
  pub fn trigger_dependents(&mut self, node: &str) {
    if let Some(dependents) = self.dependents.get(node) {
      for dependent in dependents {
        debug!(node, dependent = %dependent, "triggering metadata rerun");
        self.triggered.insert(dependent.clone());
      }
    }
  }

  pub fn has_deps(&self, node: &str, reactor: &str) -> bool {
    self
      .reactors_with_deps
      .get(node)
      .is_some_and(|r| r.contains(reactor))
  }

  pub fn dependents(&self, provider: &str) -> Option<&BTreeSet<String>> {
    self.dependents.get(provider)
  }

  /// Stability after running `node`'s reactors in the given phases.
  ///
  /// A change during a with-deps run always leaves the node unstable; a
  /// without-deps run makes it stable iff nothing changed.
  pub fn update_stability(&mut self, node: &str, with_deps: bool, without_deps: bool, changed: bool) {
    if with_deps && changed {
      self.set_stable(node, false);
    } else if without_deps {
      self.set_stable(node, !changed);
    }
  }

  pub fn set_stable(&mut self, node: &str, stable: bool) {
    self.stable.insert(node.to_string(), stable);
  }

  pub fn node_is_stable(&self, node: &str) -> bool {
    self.stable.get(node).copied().unwrap_or(false)
  }

  /// Nodes with a stability entry that are currently unstable.
  pub fn unstable_nodes(&self) -> Vec<String> {
    self
      .stable
      .iter()
      .filter(|(_, stable)| !**stable)
      .map(|(node, _)| node.clone())
      .collect()
  }

  /// Nodes with a stability entry.
  pub fn known_nodes(&self) -> Vec<String> {
    self.stable.keys().cloned().collect()
  }

  pub fn ran_nodes(&self) -> &BTreeSet<String> {
    &self.ran_at_least_once
  }

  /// Number of nodes that ran or are waiting for their first run.
  pub fn node_count(&self) -> usize {
    self.never_ran.len() + self.ran_at_least_once.len()
  }
}
