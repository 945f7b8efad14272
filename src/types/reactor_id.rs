//! Identity of one reactor on one node, and its change counter.

use std::fmt;

use serde::Serialize;

/// A reactor attached to a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ReactorId {
  pub node: String,
  pub reactor: String,
}

impl ReactorId {
  pub fn new(node: impl Into<String>, reactor: impl Into<String>) -> Self {
    Self {
      node: node.into(),
      reactor: reactor.into(),
    }
  }
}

impl fmt::Display for ReactorId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.node, self.reactor)
  }
}

/// How often a reactor changed its output during one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactorChangeCount {
  pub node: String,
  pub reactor: String,
  pub count: u64,
}

impl ReactorChangeCount {
  /// Sorts by count descending, then by node and reactor name.
  pub fn rank(counts: &mut [ReactorChangeCount]) {
    counts.sort_by(|a, b| {
      b.count
        .cmp(&a.count)
        .then_with(|| a.node.cmp(&b.node))
        .then_with(|| a.reactor.cmp(&b.reactor))
    });
  }
}

impl fmt::Display for ReactorChangeCount {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}\t{}\t{}", self.count, self.node, self.reactor)
  }
}
