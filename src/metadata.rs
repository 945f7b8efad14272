//! Metadata values: deep merge, key-path lookup and validation.
//!
//! Metadata is a JSON object. Nested keys are addressed with `/`-separated
//! key paths such as `interfaces/eth0/ip`.

use serde_json::{Map, Value};
use tracing::instrument;

/// A node's metadata, or one layer of it.
pub type Metadata = Map<String, Value>;

/// Separator between keys in a key path.
pub const PATH_SEPARATOR: char = '/';

/// Merges `update` on top of `base`.
///
/// Objects merge recursively and two arrays concatenate (`base` first).
/// Any other combination takes the value from `update`.
pub fn merge_value(base: Value, update: Value) -> Value {
  match (base, update) {
    (Value::Object(base), Value::Object(update)) => Value::Object(merge_metadata(base, update)),
    (Value::Array(mut base), Value::Array(update)) => {
      base.extend(update);
      Value::Array(base)
    }
    (_, update) => update,
  }
}

/// Merges the `update` map on top of `base`, key by key.
pub fn merge_metadata(mut base: Metadata, update: Metadata) -> Metadata {
  for (key, value) in update {
    let merged = match base.remove(&key) {
      Some(existing) => merge_value(existing, value),
      None => value,
    };
    base.insert(key, merged);
  }
  base
}

/// Returns the value at `path` inside `metadata`, if every key on the way exists.
pub fn value_at_path<'a>(metadata: &'a Metadata, path: &str) -> Option<&'a Value> {
  let mut keys = path.split(PATH_SEPARATOR).filter(|k| !k.is_empty());
  let first = keys.next()?;
  let mut current = metadata.get(first)?;
  for key in keys {
    current = current.as_object()?.get(key)?;
  }
  Some(current)
}

/// Builds a map holding `value` at `path`, creating intermediate objects.
pub fn metadata_with_path(path: &str, value: Value) -> Metadata {
  let keys: Vec<&str> = path
    .split(PATH_SEPARATOR)
    .filter(|k| !k.is_empty())
    .collect();
  let mut current = value;
  for key in keys.iter().skip(1).rev() {
    let mut wrapper = Map::new();
    wrapper.insert((*key).to_string(), current);
    current = Value::Object(wrapper);
  }
  let mut root = Map::new();
  if let Some(first) = keys.first() {
    root.insert((*first).to_string(), current);
  }
  root
}

/// Lists every leaf key path in `metadata`, sorted.
///
/// A leaf is any value that is not a non-empty object.
pub fn leaf_paths(metadata: &Metadata) -> Vec<String> {
  let mut out = Vec::new();
  collect_leaf_paths(metadata, "", &mut out);
  out.sort();
  out
}

fn collect_leaf_paths(metadata: &Metadata, prefix: &str, out: &mut Vec<String>) {
  for (key, value) in metadata {
    let path = if prefix.is_empty() {
      key.clone()
    } else {
      format!("{prefix}{PATH_SEPARATOR}{key}")
    };
    match value {
      Value::Object(inner) if !inner.is_empty() => collect_leaf_paths(inner, &path, out),
      _ => out.push(path),
    }
  }
}

/// Checks that a reactor result can be stored as a layer.
///
/// The value must be an object and no key at any depth may be empty or
/// contain the path separator.
#[instrument(level = "trace", skip(value))]
pub fn validate_metadata(value: Value) -> Result<Metadata, String> {
  match value {
    Value::Object(map) => {
      validate_keys(&map, "")?;
      Ok(map)
    }
    other => Err(format!(
      "metadata must be an object, got {}",
      value_kind(&other)
    )),
  }
}

fn validate_keys(map: &Metadata, prefix: &str) -> Result<(), String> {
  for (key, value) in map {
    if key.is_empty() {
      return Err(format!("empty key below '{prefix}'"));
    }
    if key.contains(PATH_SEPARATOR) {
      return Err(format!(
        "key '{key}' below '{prefix}' contains '{PATH_SEPARATOR}'"
      ));
    }
    let path = if prefix.is_empty() {
      key.clone()
    } else {
      format!("{prefix}{PATH_SEPARATOR}{key}")
    };
    match value {
      Value::Object(inner) => validate_keys(inner, &path)?,
      Value::Array(items) => {
        for item in items {
          if let Value::Object(inner) = item {
            validate_keys(inner, &path)?;
          }
        }
      }
      _ => {}
    }
  }
  Ok(())
}

fn value_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}
