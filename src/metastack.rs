//! Layered metadata store for a single node.
//!
//! Layers live at one of three [Level]s. Higher levels win over lower ones
//! and, within a level, later-inserted layers win over earlier ones. Objects
//! are deep-merged across layers (see [crate::metadata::merge_value]).

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use crate::metadata::{
  Metadata, PATH_SEPARATOR, leaf_paths, merge_metadata, merge_value, value_at_path,
};
use crate::types::Blame;

/// Priority level of a layer, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
  /// Defaults contributed by bundles or other providers.
  Defaults,
  /// Output of metadata reactors, one layer per reactor.
  Reactors,
  /// Group and node metadata from the node source.
  Static,
}

impl Level {
  pub const ALL: [Level; 3] = [Level::Defaults, Level::Reactors, Level::Static];

  fn index(self) -> usize {
    match self {
      Level::Defaults => 0,
      Level::Reactors => 1,
      Level::Static => 2,
    }
  }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Level::Defaults => write!(f, "defaults"),
      Level::Reactors => write!(f, "reactors"),
      Level::Static => write!(f, "static"),
    }
  }
}

/// One named layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
  pub name: String,
  pub data: Metadata,
}

/// Layered metadata for one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metastack {
  /// Layers per level in insertion order.
  partitions: [Vec<Layer>; 3],
  /// Merged layers of a level, valid until that level is modified.
  cached: [Option<Metadata>; 3],
}

impl Metastack {
  pub const EMPTY: Metastack = Metastack {
    partitions: [Vec::new(), Vec::new(), Vec::new()],
    cached: [None, None, None],
  };

  pub fn new() -> Self {
    Self::default()
  }

  /// Inserts or replaces the layer `name` at `level`.
  ///
  /// A replaced layer keeps its position within the level.
  #[instrument(level = "trace", skip(self, data))]
  pub fn set_layer(&mut self, level: Level, name: &str, data: Metadata) {
    let partition = &mut self.partitions[level.index()];
    match partition.iter_mut().find(|l| l.name == name) {
      Some(layer) => layer.data = data,
      None => partition.push(Layer {
        name: name.to_string(),
        data,
      }),
    }
    self.cached[level.index()] = None;
  }

  /// Removes the layer `name` at `level` and returns its data.
  #[instrument(level = "trace", skip(self))]
  pub fn pop_layer(&mut self, level: Level, name: &str) -> Option<Metadata> {
    let partition = &mut self.partitions[level.index()];
    let pos = partition.iter().position(|l| l.name == name)?;
    self.cached[level.index()] = None;
    Some(partition.remove(pos).data)
  }

  /// Caches the merged layers of `level` so later reads skip re-merging them.
  #[instrument(level = "trace", skip(self))]
  pub fn cache_partition(&mut self, level: Level) {
    let merged = merge_layers(&self.partitions[level.index()]);
    self.cached[level.index()] = Some(merged);
  }

  /// Returns true if `level` currently has a cached merge.
  pub fn is_cached(&self, level: Level) -> bool {
    self.cached[level.index()].is_some()
  }

  /// Merges all levels into one map, highest level winning per key.
  pub fn as_flat_mapping(&self) -> Metadata {
    let mut out = Metadata::new();
    for level in Level::ALL {
      out = merge_metadata(out, self.partition(level));
    }
    out
  }

  /// Maps every leaf key path to the layers that contain it, winner first.
  pub fn as_blame(&self) -> Blame {
    let flat = self.as_flat_mapping();
    let mut blame = BTreeMap::new();
    for path in leaf_paths(&flat) {
      let names: Vec<String> = self
        .layers()
        .filter(|(_, layer)| value_at_path(&layer.data, &path).is_some())
        .map(|(_, layer)| layer.name.clone())
        .collect();
      blame.insert(path, names);
    }
    blame
  }

  /// Returns the merged value at `path`, or `None` if the flattened metadata
  /// has nothing there.
  ///
  /// A non-object on the way to `path` hides whatever lower layers hold
  /// below it, the same way [Self::as_flat_mapping] does.
  pub fn get(&self, path: &str) -> Option<Value> {
    let mut result: Option<Value> = None;
    for level in Level::ALL {
      match &self.cached[level.index()] {
        Some(merged) => apply_hit(&mut result, merged, path),
        None => {
          for layer in &self.partitions[level.index()] {
            apply_hit(&mut result, &layer.data, path);
          }
        }
      }
    }
    result
  }

  /// Iterates all layers, highest precedence first.
  pub fn layers(&self) -> impl Iterator<Item = (Level, &Layer)> {
    Level::ALL
      .into_iter()
      .rev()
      .flat_map(move |level| {
        self.partitions[level.index()]
          .iter()
          .rev()
          .map(move |layer| (level, layer))
      })
  }

  /// Returns the data of layer `name` at `level`.
  pub fn layer(&self, level: Level, name: &str) -> Option<&Metadata> {
    self.partitions[level.index()]
      .iter()
      .find(|l| l.name == name)
      .map(|l| &l.data)
  }

  fn partition(&self, level: Level) -> Metadata {
    match &self.cached[level.index()] {
      Some(merged) => merged.clone(),
      None => merge_layers(&self.partitions[level.index()]),
    }
  }
}

fn merge_layers(layers: &[Layer]) -> Metadata {
  layers.iter().fold(Metadata::new(), |acc, layer| {
    merge_metadata(acc, layer.data.clone())
  })
}

/// What one layer holds at a key path.
enum PathHit<'a> {
  Found(&'a Value),
  /// A non-object sits on a prefix of the path and replaces everything below.
  Shadowed,
  Absent,
}

fn path_hit<'a>(data: &'a Metadata, path: &str) -> PathHit<'a> {
  let keys: Vec<&str> = path
    .split(PATH_SEPARATOR)
    .filter(|k| !k.is_empty())
    .collect();
  let Some((last, parents)) = keys.split_last() else {
    return PathHit::Absent;
  };
  let mut current = data;
  for key in parents {
    match current.get(*key) {
      None => return PathHit::Absent,
      Some(Value::Object(inner)) => current = inner,
      Some(_) => return PathHit::Shadowed,
    }
  }
  match current.get(*last) {
    Some(value) => PathHit::Found(value),
    None => PathHit::Absent,
  }
}

fn apply_hit(result: &mut Option<Value>, data: &Metadata, path: &str) {
  match path_hit(data, path) {
    PathHit::Found(value) => *result = Some(merge_opt(result.take(), value.clone())),
    PathHit::Shadowed => *result = None,
    PathHit::Absent => {}
  }
}

fn merge_opt(base: Option<Value>, update: Value) -> Value {
  match base {
    Some(base) => merge_value(base, update),
    None => update,
  }
}
