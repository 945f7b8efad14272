//! Runs a single reactor once and classifies what happened.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{error, instrument};

use crate::error::MetadataError;
use crate::metadata::{Metadata, validate_metadata};
use crate::metastack::{Level, Metastack};
use crate::reactor::{PartialMetadata, Reactor, ReactorError};
use crate::types::{MissingKeyRecord, ReactorChangeCount, ReactorId};

/// Non-fatal result of one reactor invocation. Fatal failures are the `Err`
/// side of [ReactorInvoker::invoke].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactorOutcome {
  /// The reactor produced a layer.
  Success {
    changed: bool,
    accessed: BTreeSet<String>,
  },
  /// The reactor needs a key nobody supplies yet; it runs again next pass.
  RetryableMissingKey {
    path: String,
    accessed: BTreeSet<String>,
  },
  /// The reactor is never run again on this node.
  PermanentSkip,
}

impl ReactorOutcome {
  pub fn changed(&self) -> bool {
    matches!(self, ReactorOutcome::Success { changed: true, .. })
  }

  /// Other nodes read during the invocation.
  pub fn accessed(&self) -> Option<&BTreeSet<String>> {
    match self {
      ReactorOutcome::Success { accessed, .. }
      | ReactorOutcome::RetryableMissingKey { accessed, .. } => Some(accessed),
      ReactorOutcome::PermanentSkip => None,
    }
  }
}

/// Invokes reactors and keeps the per-resolution bookkeeping about them.
#[derive(Debug, Default)]
pub struct ReactorInvoker {
  /// Reactors that asked not to be run again.
  do_not_run_again: HashSet<ReactorId>,
  /// Reactors whose latest run hit a missing key.
  missing_keys: BTreeMap<ReactorId, MissingKeyRecord>,
  /// How often each invoked reactor changed its output.
  changes: BTreeMap<ReactorId, u64>,
  runs: u64,
}

impl ReactorInvoker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Runs `reactor` for `node` against its stack in `stacks`.
  ///
  /// The reactor's previous layer is removed before the call, so it never
  /// sees its own output, and the new result replaces it afterwards.
  #[instrument(level = "trace", skip(self, reactor, stacks, completed))]
  pub fn invoke(
    &mut self,
    node: &str,
    reactor_name: &str,
    reactor: &dyn Reactor,
    stacks: &mut HashMap<String, Metastack>,
    completed: &HashMap<String, Metadata>,
  ) -> Result<ReactorOutcome, MetadataError> {
    let id = ReactorId::new(node, reactor_name);
    if self.do_not_run_again.contains(&id) {
      return Ok(ReactorOutcome::PermanentSkip);
    }
    self.runs += 1;
    self.changes.entry(id.clone()).or_insert(0);

    let old = stacks
      .get_mut(node)
      .and_then(|stack| stack.pop_layer(Level::Reactors, reactor_name));

    let view = PartialMetadata::new(node, stacks, completed);
    let result = reactor.react(&view);
    let accessed = view.into_accessed();

    let value = match result {
      Ok(value) => value,
      Err(ReactorError::MissingKey(path)) => {
        let message = ReactorError::MissingKey(path.clone()).to_string();
        self.missing_keys.insert(
          id,
          MissingKeyRecord {
            node: node.to_string(),
            reactor: reactor_name.to_string(),
            path: path.clone(),
            message,
          },
        );
        return Ok(ReactorOutcome::RetryableMissingKey { path, accessed });
      }
      Err(ReactorError::DoNotRunAgain) => {
        self.missing_keys.remove(&id);
        self.do_not_run_again.insert(id);
        return Ok(ReactorOutcome::PermanentSkip);
      }
      Err(ReactorError::Failed(source)) => {
        error!(node, reactor = reactor_name, error = %source, "exception while executing metadata reactor");
        return Err(MetadataError::Reactor {
          node: node.to_string(),
          reactor: reactor_name.to_string(),
          source,
        });
      }
    };

    self.missing_keys.remove(&id);

    let new = validate_metadata(value).map_err(|reason| {
      error!(node, reactor = reactor_name, %reason, "invalid output from metadata reactor");
      MetadataError::InvalidReactorOutput {
        node: node.to_string(),
        reactor: reactor_name.to_string(),
        reason,
      }
    })?;

    let changed = old.unwrap_or_default() != new;
    stacks
      .entry(node.to_string())
      .or_default()
      .set_layer(Level::Reactors, reactor_name, new);
    if changed {
      *self.changes.entry(id).or_insert(0) += 1;
    }
    Ok(ReactorOutcome::Success { changed, accessed })
  }

  /// Missing-key failures still outstanding, sorted by node and reactor.
  pub fn missing_keys(&self) -> Vec<MissingKeyRecord> {
    self.missing_keys.values().cloned().collect()
  }

  pub fn has_missing_keys(&self) -> bool {
    !self.missing_keys.is_empty()
  }

  /// The `limit` reactors that changed most often.
  pub fn top_changers(&self, limit: usize) -> Vec<ReactorChangeCount> {
    let mut counts: Vec<ReactorChangeCount> = self
      .changes
      .iter()
      .map(|(id, count)| ReactorChangeCount {
        node: id.node.clone(),
        reactor: id.reactor.clone(),
        count: *count,
      })
      .collect();
    ReactorChangeCount::rank(&mut counts);
    counts.truncate(limit);
    counts
  }

  /// Total invocations, skipped reactors excluded.
  pub fn runs(&self) -> u64 {
    self.runs
  }

  /// Distinct reactors invoked at least once.
  pub fn distinct_reactors(&self) -> usize {
    self.changes.len()
  }
}
