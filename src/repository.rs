//! Where nodes, groups and reactors come from.
//!
//! The engine only talks to a [NodeSource]. [Repository] is the in-memory
//! implementation used by the CLI and tests.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::instrument;

use crate::error::MetadataError;
use crate::metadata::Metadata;
use crate::reactor::{PartialMetadata, Reactor, ReactorError};

/// Everything the engine needs to seed and run one node.
#[derive(Clone)]
pub struct NodeDefinition {
  pub name: String,
  /// The node's own static metadata.
  pub metadata: Metadata,
  /// Groups the node belongs to, parents before subgroups.
  pub groups: Vec<String>,
  /// Named defaults layers, lowest precedence.
  pub defaults: Vec<(String, Metadata)>,
  /// Reactors by unique name.
  pub reactors: Vec<(String, Arc<dyn Reactor>)>,
}

impl fmt::Debug for NodeDefinition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("NodeDefinition")
      .field("name", &self.name)
      .field("groups", &self.groups)
      .field(
        "defaults",
        &self.defaults.iter().map(|(n, _)| n).collect::<Vec<_>>(),
      )
      .field(
        "reactors",
        &self.reactors.iter().map(|(n, _)| n).collect::<Vec<_>>(),
      )
      .finish()
  }
}

/// Read-only provider of node and group definitions.
pub trait NodeSource: Send + Sync {
  /// Looks up a node. Called once per node and resolution.
  fn node(&self, name: &str) -> Result<NodeDefinition, MetadataError>;

  /// Static metadata of a group.
  fn group_metadata(&self, name: &str) -> Result<Metadata, MetadataError>;
}

/// Wraps a closure as a shareable [Reactor].
pub fn reactor_fn<F>(f: F) -> Arc<dyn Reactor>
where
  F: Fn(&PartialMetadata<'_>) -> Result<Value, ReactorError> + Send + Sync + 'static,
{
  Arc::new(f)
}

#[derive(Clone, Default)]
struct NodeEntry {
  metadata: Metadata,
  defaults: Vec<(String, Metadata)>,
  reactors: Vec<(String, Arc<dyn Reactor>)>,
}

#[derive(Debug, Clone, Default)]
struct GroupEntry {
  metadata: Metadata,
  members: BTreeSet<String>,
  subgroups: BTreeSet<String>,
}

/// In-memory [NodeSource].
#[derive(Clone, Default)]
pub struct Repository {
  nodes: BTreeMap<String, NodeEntry>,
  groups: BTreeMap<String, GroupEntry>,
}

impl fmt::Debug for Repository {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Repository")
      .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
      .field("groups", &self.groups.keys().collect::<Vec<_>>())
      .finish()
  }
}

impl Repository {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds a node, replacing its static metadata if it exists.
  pub fn add_node(&mut self, name: &str, metadata: Metadata) -> &mut Self {
    self.nodes.entry(name.to_string()).or_default().metadata = metadata;
    self
  }

  /// Adds a group with direct node members and subgroups.
  pub fn add_group(
    &mut self,
    name: &str,
    metadata: Metadata,
    members: &[&str],
    subgroups: &[&str],
  ) -> &mut Self {
    let group = self.groups.entry(name.to_string()).or_default();
    group.metadata = metadata;
    group.members.extend(members.iter().map(|m| m.to_string()));
    group.subgroups.extend(subgroups.iter().map(|g| g.to_string()));
    self
  }

  /// Adds a defaults layer to a node.
  pub fn add_defaults(&mut self, node: &str, layer: &str, data: Metadata) -> &mut Self {
    self
      .nodes
      .entry(node.to_string())
      .or_default()
      .defaults
      .push((layer.to_string(), data));
    self
  }

  /// Attaches a reactor to a node, replacing one with the same name.
  pub fn add_reactor(&mut self, node: &str, name: &str, reactor: Arc<dyn Reactor>) -> &mut Self {
    let entry = self.nodes.entry(node.to_string()).or_default();
    match entry.reactors.iter_mut().find(|(n, _)| n == name) {
      Some(slot) => slot.1 = reactor,
      None => entry.reactors.push((name.to_string(), reactor)),
    }
    self
  }

  /// Groups containing `node` directly or through subgroups, parents first.
  #[instrument(level = "trace", skip(self))]
  pub fn groups_for_node(&self, node: &str) -> Result<Vec<String>, MetadataError> {
    let mut groups: BTreeSet<String> = self
      .groups
      .iter()
      .filter(|(_, g)| g.members.contains(node))
      .map(|(name, _)| name.clone())
      .collect();
    let mut pending: Vec<String> = groups.iter().cloned().collect();
    while let Some(child) = pending.pop() {
      for (parent, g) in &self.groups {
        if g.subgroups.contains(&child) && groups.insert(parent.clone()) {
          pending.push(parent.clone());
        }
      }
    }
    self.flatten_group_hierarchy(&groups)
  }

  /// Orders `groups` so that every parent comes before its subgroups.
  fn flatten_group_hierarchy(
    &self,
    groups: &BTreeSet<String>,
  ) -> Result<Vec<String>, MetadataError> {
    let mut parents: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for child in groups {
      let entry = parents.entry(child.as_str()).or_default();
      for parent in groups {
        let is_parent = self
          .groups
          .get(parent)
          .is_some_and(|g| g.subgroups.contains(child));
        if is_parent {
          entry.insert(parent.as_str());
        }
      }
    }

    let mut order = Vec::with_capacity(groups.len());
    while !parents.is_empty() {
      let top = parents
        .iter()
        .find(|(_, p)| p.is_empty())
        .map(|(name, _)| *name);
      let Some(top) = top else {
        return Err(MetadataError::InconsistentGroupHierarchy(
          parents.keys().map(|s| s.to_string()).collect(),
        ));
      };
      parents.remove(top);
      for p in parents.values_mut() {
        p.remove(top);
      }
      order.push(top.to_string());
    }
    Ok(order)
  }
}

impl NodeSource for Repository {
  fn node(&self, name: &str) -> Result<NodeDefinition, MetadataError> {
    let entry = self
      .nodes
      .get(name)
      .ok_or_else(|| MetadataError::UnknownNode(name.to_string()))?;
    Ok(NodeDefinition {
      name: name.to_string(),
      metadata: entry.metadata.clone(),
      groups: self.groups_for_node(name)?,
      defaults: entry.defaults.clone(),
      reactors: entry.reactors.clone(),
    })
  }

  fn group_metadata(&self, name: &str) -> Result<Metadata, MetadataError> {
    self
      .groups
      .get(name)
      .map(|g| g.metadata.clone())
      .ok_or_else(|| MetadataError::UnknownGroup(name.to_string()))
  }
}
