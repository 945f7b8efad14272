//! Metadata reactors and the partial-metadata view they run against.
//!
//! A reactor is user code that derives metadata for one node. It sees the
//! node's current (not yet final) metadata through [PartialMetadata] and may
//! read other nodes through [PartialMetadata::node]. Those reads are recorded
//! and become dependency edges in the resolution.
//!
//! [PartialMetadata] can only be built by the invoker, so partial metadata is
//! never reachable outside a running reactor.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use thiserror::Error;

use crate::metadata::{Metadata, value_at_path};
use crate::metastack::Metastack;

/// What a reactor can return instead of metadata.
#[derive(Debug, Error)]
pub enum ReactorError {
  /// A key the reactor needs does not exist (yet). Retried on later passes.
  #[error("key not found: {0}")]
  MissingKey(String),

  /// Never run this reactor on this node again.
  #[error("reactor asked not to be run again")]
  DoNotRunAgain,

  /// Any other failure. Aborts the resolution.
  #[error(transparent)]
  Failed(Box<dyn std::error::Error + Send + Sync>),
}

impl ReactorError {
  pub fn failed(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
    ReactorError::Failed(err.into())
  }
}

/// A metadata reactor.
///
/// Returns the layer to store for this reactor. The value must be a JSON
/// object; anything else fails the resolution.
pub trait Reactor: Send + Sync {
  fn react(&self, metadata: &PartialMetadata<'_>) -> Result<Value, ReactorError>;
}

impl<F> Reactor for F
where
  F: Fn(&PartialMetadata<'_>) -> Result<Value, ReactorError> + Send + Sync,
{
  fn react(&self, metadata: &PartialMetadata<'_>) -> Result<Value, ReactorError> {
    self(metadata)
  }
}

static EMPTY_STACK: Metastack = Metastack::EMPTY;

/// Read-only view of one node's metadata.
#[derive(Debug, Clone, Copy)]
pub enum StackView<'a> {
  /// A stack still being resolved.
  Live(&'a Metastack),
  /// Metadata that finished resolving in an earlier call.
  Complete(&'a Metadata),
}

impl StackView<'_> {
  /// Returns the value at `path` or a [ReactorError::MissingKey].
  pub fn get(&self, path: &str) -> Result<Value, ReactorError> {
    self
      .lookup(path)
      .ok_or_else(|| ReactorError::MissingKey(path.to_string()))
  }

  /// Returns the value at `path`, if present.
  pub fn lookup(&self, path: &str) -> Option<Value> {
    match self {
      StackView::Live(stack) => stack.get(path),
      StackView::Complete(data) => value_at_path(data, path).cloned(),
    }
  }

  /// Flattens everything currently visible.
  pub fn to_metadata(&self) -> Metadata {
    match self {
      StackView::Live(stack) => stack.as_flat_mapping(),
      StackView::Complete(data) => (*data).clone(),
    }
  }
}

/// The execution context handed to a running reactor.
pub struct PartialMetadata<'a> {
  node: &'a str,
  stacks: &'a HashMap<String, Metastack>,
  completed: &'a HashMap<String, Metadata>,
  accessed: RefCell<BTreeSet<String>>,
}

impl<'a> PartialMetadata<'a> {
  pub(crate) fn new(
    node: &'a str,
    stacks: &'a HashMap<String, Metastack>,
    completed: &'a HashMap<String, Metadata>,
  ) -> Self {
    Self {
      node,
      stacks,
      completed,
      accessed: RefCell::new(BTreeSet::new()),
    }
  }

  /// Name of the node this reactor belongs to.
  pub fn node_name(&self) -> &str {
    self.node
  }

  /// Reads a key path from this node's live metadata.
  pub fn get(&self, path: &str) -> Result<Value, ReactorError> {
    self.own().get(path)
  }

  /// Reads a key path from this node's live metadata, if present.
  pub fn lookup(&self, path: &str) -> Option<Value> {
    self.own().lookup(path)
  }

  /// This node's live metadata, flattened.
  pub fn to_metadata(&self) -> Metadata {
    self.own().to_metadata()
  }

  /// Returns a view of another node's metadata.
  ///
  /// Nodes still being resolved are recorded as dependencies of the calling
  /// reactor. A node that has not been seeded yet shows up empty.
  pub fn node(&self, name: &str) -> StackView<'a> {
    if name == self.node {
      return self.own();
    }
    if let Some(done) = self.completed.get(name) {
      return StackView::Complete(done);
    }
    self.accessed.borrow_mut().insert(name.to_string());
    StackView::Live(self.stacks.get(name).unwrap_or(&EMPTY_STACK))
  }

  pub(crate) fn into_accessed(self) -> BTreeSet<String> {
    self.accessed.into_inner()
  }

  fn own(&self) -> StackView<'a> {
    if let Some(stack) = self.stacks.get(self.node) {
      return StackView::Live(stack);
    }
    match self.completed.get(self.node) {
      Some(done) => StackView::Complete(done),
      None => StackView::Live(&EMPTY_STACK),
    }
  }
}
