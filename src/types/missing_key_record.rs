//! A missing-key failure that outlived the fixpoint.

use std::fmt;

use serde::Serialize;

/// Deferred missing-key failure of one reactor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingKeyRecord {
  pub node: String,
  pub reactor: String,
  /// Key path the reactor could not find.
  pub path: String,
  /// Display form of the reactor's error.
  pub message: String,
}

impl fmt::Display for MissingKeyRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} {}: missing '{}' ({})",
      self.node, self.reactor, self.path, self.message
    )
  }
}
