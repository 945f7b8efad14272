//! Errors raised while resolving metadata.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{MissingKeyRecord, ReactorChangeCount};

/// Errors that can occur while resolving metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
  /// The outer loop exceeded its iteration budget.
  #[error("{}", divergence_message(.max_iterations, .top_changers))]
  Divergence {
    max_iterations: usize,
    /// Most frequently changing reactors, highest count first.
    top_changers: Vec<ReactorChangeCount>,
  },

  /// Reactors still failed on missing keys after everything else settled.
  #[error("{}", persistent_key_message(.failures))]
  PersistentKeyErrors { failures: Vec<MissingKeyRecord> },

  /// A reactor failed with an error other than a missing key.
  #[error("exception while executing metadata reactor {reactor} for node {node}: {source}")]
  Reactor {
    node: String,
    reactor: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// A reactor returned something that cannot be stored as a layer.
  #[error("invalid output from metadata reactor {reactor} for node {node}: {reason}")]
  InvalidReactorOutput {
    node: String,
    reactor: String,
    reason: String,
  },

  #[error("no such node: {0}")]
  UnknownNode(String),

  #[error("no such group: {0}")]
  UnknownGroup(String),

  #[error("inconsistent subgroup hierarchy involving: {}", .0.join(", "))]
  InconsistentGroupHierarchy(Vec<String>),

  /// Resolution was cancelled before reaching a fixpoint; nothing was cached.
  #[error("metadata resolution for {node} was cancelled")]
  Cancelled { node: String },

  /// A repository file could not be read or parsed.
  #[error("failed to load repository {}: {reason}", .path.display())]
  Load { path: PathBuf, reason: String },
}

fn divergence_message(max_iterations: &usize, top_changers: &[ReactorChangeCount]) -> String {
  let mut msg = format!(
    "max metadata iterations ({max_iterations}) exceeded, likely an infinite loop between \
     flip-flopping metadata reactors.\nThese are the reactors that changed most often:\n\n"
  );
  for changer in top_changers {
    msg.push_str(&format!("  {changer}\n"));
  }
  msg
}

fn persistent_key_message(failures: &[MissingKeyRecord]) -> String {
  let mut msg = String::from(
    "These metadata reactors raised a missing-key error even after all other reactors were done:",
  );
  for failure in failures {
    msg.push_str(&format!(
      "\n\n  {} {}\n\n    missing key: {}\n    {}",
      failure.node, failure.reactor, failure.path, failure.message
    ));
  }
  msg
}
