//! What a caller wants back from a resolution.

use crate::metadata::Metadata;
use crate::metastack::Metastack;

use super::Blame;

/// Shape of the result requested from [crate::MetadataGenerator::resolve].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveMode {
  /// Flattened metadata; served from the completed-results cache when possible.
  #[default]
  Flat,
  /// Per-key layer attribution; always recomputed.
  Blame,
  /// The full layered stack; always recomputed.
  Stack,
}

impl ResolveMode {
  /// Flat results come from the cache; the others need the uncollapsed stack.
  pub fn uses_cache(self) -> bool {
    matches!(self, ResolveMode::Flat)
  }
}

/// Result of a resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
  Flat(Metadata),
  Blame(Blame),
  Stack(Metastack),
}

impl Resolved {
  pub fn into_flat(self) -> Option<Metadata> {
    match self {
      Resolved::Flat(m) => Some(m),
      _ => None,
    }
  }

  pub fn into_blame(self) -> Option<Blame> {
    match self {
      Resolved::Blame(b) => Some(b),
      _ => None,
    }
  }

  pub fn into_stack(self) -> Option<Metastack> {
    match self {
      Resolved::Stack(s) => Some(s),
      _ => None,
    }
  }
}
