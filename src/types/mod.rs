//! Shared value types: reactor identities, diagnostics and resolution results.

use std::collections::BTreeMap;

mod missing_key_record;
mod reactor_id;
mod resolution_stats;
mod resolve_mode;

pub use missing_key_record::MissingKeyRecord;
pub use reactor_id::{ReactorChangeCount, ReactorId};
pub use resolution_stats::ResolutionStats;
pub use resolve_mode::{ResolveMode, Resolved};

/// Leaf key path mapped to the layers that contain it, winning layer first.
pub type Blame = BTreeMap<String, Vec<String>>;
