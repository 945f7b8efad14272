//! Loads a [Repository] from a JSON file.
//!
//! Reactors in a repository file are declarative [CopyReactor]s: each copies
//! one key path, from the node itself or from another node, into another key
//! path.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::MetadataError;
use crate::metadata::{Metadata, metadata_with_path};
use crate::reactor::{PartialMetadata, Reactor, ReactorError};
use crate::repository::Repository;

/// Root of a repository file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryFile {
  #[serde(default)]
  pub groups: BTreeMap<String, GroupSpec>,
  #[serde(default)]
  pub nodes: BTreeMap<String, NodeSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupSpec {
  #[serde(default)]
  pub members: Vec<String>,
  #[serde(default)]
  pub subgroups: Vec<String>,
  #[serde(default)]
  pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
  #[serde(default)]
  pub metadata: Metadata,
  /// Defaults layers by name.
  #[serde(default)]
  pub defaults: BTreeMap<String, Metadata>,
  #[serde(default)]
  pub reactors: BTreeMap<String, CopyReactor>,
}

/// Copies the value at `from` into `to`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyReactor {
  /// Node to read from; the reactor's own node when absent.
  #[serde(default)]
  pub from_node: Option<String>,
  pub from: String,
  pub to: String,
  /// Emitted when `from` is missing. Without it a missing source is a missing key.
  #[serde(default)]
  pub default: Option<Value>,
}

impl Reactor for CopyReactor {
  fn react(&self, metadata: &PartialMetadata<'_>) -> Result<Value, ReactorError> {
    let found = match &self.from_node {
      Some(node) => metadata.node(node).lookup(&self.from),
      None => metadata.lookup(&self.from),
    };
    let value = match (found, &self.default) {
      (Some(value), _) => value,
      (None, Some(default)) => default.clone(),
      (None, None) => return Err(ReactorError::MissingKey(self.from.clone())),
    };
    Ok(Value::Object(metadata_with_path(&self.to, value)))
  }
}

impl RepositoryFile {
  /// Builds an in-memory repository from the parsed file.
  pub fn into_repository(self) -> Repository {
    let mut repo = Repository::new();
    for (name, group) in &self.groups {
      let members: Vec<&str> = group.members.iter().map(String::as_str).collect();
      let subgroups: Vec<&str> = group.subgroups.iter().map(String::as_str).collect();
      repo.add_group(name, group.metadata.clone(), &members, &subgroups);
    }
    for (name, node) in self.nodes {
      repo.add_node(&name, node.metadata);
      for (layer, data) in node.defaults {
        repo.add_defaults(&name, &layer, data);
      }
      for (reactor_name, reactor) in node.reactors {
        repo.add_reactor(&name, &reactor_name, Arc::new(reactor));
      }
    }
    repo
  }
}

/// Parses repository JSON.
pub fn parse_repository(json: &str) -> Result<RepositoryFile, serde_json::Error> {
  serde_json::from_str(json)
}

/// Loads a repository from `path`.
#[instrument(level = "trace", skip(path))]
pub fn load_repository(path: &Path) -> Result<Repository, MetadataError> {
  let load_err = |reason: String| MetadataError::Load {
    path: path.to_path_buf(),
    reason,
  };
  let json = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
  let file = parse_repository(&json).map_err(|e| load_err(e.to_string()))?;
  debug!(
    path = %path.display(),
    nodes = file.nodes.len(),
    groups = file.groups.len(),
    "repository loaded"
  );
  Ok(file.into_repository())
}
