//! Tests for `Metastack`.

use serde_json::{Value, json};

use crate::metadata::Metadata;
use crate::metastack::{Level, Metastack};

fn map(value: Value) -> Metadata {
  value.as_object().cloned().unwrap()
}

fn seeded() -> Metastack {
  let mut stack = Metastack::new();
  stack.set_layer(
    Level::Defaults,
    "bundle:nginx",
    map(json!({"nginx": {"workers": 4, "modules": ["ssl"]}, "role": "none"})),
  );
  stack.set_layer(Level::Static, "group:all", map(json!({"dns": "1.1.1.1"})));
  stack.set_layer(
    Level::Static,
    "group:web",
    map(json!({"dns": "9.9.9.9", "nginx": {"modules": ["gzip"]}})),
  );
  stack.set_layer(Level::Static, "node:web1", map(json!({"hostname": "web1"})));
  stack
}

#[test]
fn flatten_applies_level_and_insertion_precedence() {
  let mut stack = seeded();
  stack.set_layer(
    Level::Reactors,
    "role",
    map(json!({"role": "web", "dns": "8.8.8.8"})),
  );
  let flat = stack.as_flat_mapping();
  assert_eq!(
    Value::Object(flat),
    json!({
      "dns": "9.9.9.9",
      "hostname": "web1",
      "nginx": {"workers": 4, "modules": ["ssl", "gzip"]},
      "role": "web",
    })
  );
}

#[test]
fn node_layer_beats_groups() {
  let mut stack = seeded();
  stack.set_layer(Level::Static, "node:web1", map(json!({"dns": "10.0.0.53"})));
  assert_eq!(stack.get("dns"), Some(json!("10.0.0.53")));
}

#[test]
fn replacing_a_layer_keeps_its_position() {
  let mut stack = Metastack::new();
  stack.set_layer(Level::Reactors, "a", map(json!({"k": 1})));
  stack.set_layer(Level::Reactors, "b", map(json!({"k": 2})));
  stack.set_layer(Level::Reactors, "a", map(json!({"k": 3})));
  assert_eq!(stack.get("k"), Some(json!(2)));
}

#[test]
fn pop_layer_returns_data_and_hides_it() {
  let mut stack = seeded();
  stack.set_layer(Level::Reactors, "role", map(json!({"role": "web"})));
  let popped = stack.pop_layer(Level::Reactors, "role");
  assert_eq!(popped, Some(map(json!({"role": "web"}))));
  assert_eq!(stack.get("role"), Some(json!("none")));
  assert_eq!(stack.pop_layer(Level::Reactors, "role"), None);
}

#[test]
fn cached_partition_is_used_and_invalidated() {
  let mut stack = seeded();
  stack.cache_partition(Level::Static);
  assert!(stack.is_cached(Level::Static));
  let before = stack.as_flat_mapping();
  stack.set_layer(Level::Reactors, "r", map(json!({"extra": true})));
  assert!(stack.is_cached(Level::Static));
  assert_eq!(stack.get("dns"), Some(json!("9.9.9.9")));
  stack.set_layer(Level::Static, "node:web1", map(json!({"hostname": "w1"})));
  assert!(!stack.is_cached(Level::Static));
  let after = stack.as_flat_mapping();
  assert_eq!(before.get("hostname"), Some(&json!("web1")));
  assert_eq!(after.get("hostname"), Some(&json!("w1")));
}

#[test]
fn get_merges_nested_values_across_levels() {
  let stack = seeded();
  assert_eq!(
    stack.get("nginx"),
    Some(json!({"workers": 4, "modules": ["ssl", "gzip"]}))
  );
  assert_eq!(stack.get("nginx/workers"), Some(json!(4)));
  assert_eq!(stack.get("missing/key"), None);
}

#[test]
fn blame_lists_layers_winner_first() {
  let mut stack = seeded();
  stack.set_layer(Level::Reactors, "role", map(json!({"role": "web"})));
  let blame = stack.as_blame();
  assert_eq!(blame["dns"], vec!["group:web", "group:all"]);
  assert_eq!(blame["role"], vec!["role", "bundle:nginx"]);
  assert_eq!(blame["hostname"], vec!["node:web1"]);
  assert_eq!(blame["nginx/modules"], vec!["group:web", "bundle:nginx"]);
  assert_eq!(blame["nginx/workers"], vec!["bundle:nginx"]);
}

#[test]
fn layers_iterate_highest_precedence_first() {
  let stack = seeded();
  let names: Vec<(Level, &str)> = stack
    .layers()
    .map(|(level, layer)| (level, layer.name.as_str()))
    .collect();
  assert_eq!(
    names,
    vec![
      (Level::Static, "node:web1"),
      (Level::Static, "group:web"),
      (Level::Static, "group:all"),
      (Level::Defaults, "bundle:nginx"),
    ]
  );
}

#[test]
fn get_hides_keys_below_a_higher_scalar() {
  let mut stack = Metastack::new();
  stack.set_layer(Level::Defaults, "bundle:x", map(json!({"a": {"b": 1}})));
  stack.set_layer(Level::Static, "node:n", map(json!({"a": 5})));
  assert_eq!(stack.as_flat_mapping(), map(json!({"a": 5})));
  assert_eq!(stack.get("a/b"), None);
  assert_eq!(stack.get("a"), Some(json!(5)));

  stack.cache_partition(Level::Defaults);
  stack.cache_partition(Level::Static);
  assert_eq!(stack.get("a/b"), None);
}

#[test]
fn get_sees_keys_above_a_lower_scalar() {
  let mut stack = Metastack::new();
  stack.set_layer(Level::Defaults, "bundle:x", map(json!({"a": 5})));
  stack.set_layer(Level::Reactors, "r", map(json!({"a": {"b": 1}})));
  assert_eq!(stack.get("a/b"), Some(json!(1)));
  assert_eq!(stack.get("a"), Some(json!({"b": 1})));
}

#[test]
fn get_within_one_level_follows_insertion_order() {
  let mut stack = Metastack::new();
  stack.set_layer(Level::Static, "group:all", map(json!({"a": {"b": 1}})));
  stack.set_layer(Level::Static, "group:web", map(json!({"a": "off"})));
  assert_eq!(stack.get("a/b"), None);
  stack.cache_partition(Level::Static);
  assert_eq!(stack.get("a/b"), None);
  assert_eq!(stack.get("a"), Some(json!("off")));
}

#[test]
fn empty_stack_has_no_layers() {
  assert_eq!(Metastack::EMPTY.layers().count(), 0);
  assert_eq!(Metastack::EMPTY.get("a"), None);
}

mod props {
  use proptest::prelude::*;
  use serde_json::{Value, json};

  use crate::metadata::{Metadata, value_at_path};
  use crate::metastack::{Level, Metastack};

  fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![any::<i32>().prop_map(|n| json!(n)), "[x-z]{1,3}".prop_map(Value::String)]
  }

  fn entry() -> impl Strategy<Value = Value> {
    prop_oneof![
      scalar(),
      prop::collection::btree_map("[a-b]", scalar(), 0..3)
        .prop_map(|m| Value::Object(m.into_iter().collect())),
    ]
  }

  fn layer() -> impl Strategy<Value = Metadata> {
    prop::collection::btree_map("[a-d]", entry(), 0..5)
      .prop_map(|m| m.into_iter().collect())
  }

  fn paths() -> Vec<String> {
    let mut out = Vec::new();
    for outer in ["a", "b", "c", "d"] {
      out.push(outer.to_string());
      for inner in ["a", "b"] {
        out.push(format!("{outer}/{inner}"));
      }
    }
    out
  }

  fn level() -> impl Strategy<Value = Level> {
    prop_oneof![Just(Level::Defaults), Just(Level::Reactors), Just(Level::Static)]
  }

  proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn flattening_is_idempotent(layers in prop::collection::vec((level(), "[a-c]", layer()), 0..8), cache in any::<bool>()) {
      let mut stack = Metastack::new();
      for (level, name, data) in layers {
        stack.set_layer(level, &name, data);
      }
      if cache {
        stack.cache_partition(Level::Static);
      }
      let first = stack.as_flat_mapping();
      let second = stack.as_flat_mapping();
      prop_assert_eq!(first, second);
    }

    #[test]
    fn caching_does_not_change_result(layers in prop::collection::vec((level(), "[a-c]", layer()), 0..8)) {
      let mut stack = Metastack::new();
      for (level, name, data) in layers {
        stack.set_layer(level, &name, data);
      }
      let uncached = stack.as_flat_mapping();
      for level in Level::ALL {
        stack.cache_partition(level);
      }
      prop_assert_eq!(stack.as_flat_mapping(), uncached);
    }

    #[test]
    fn get_agrees_with_flat_mapping(layers in prop::collection::vec((level(), "[a-c]", layer()), 0..8), cache in any::<bool>()) {
      let mut stack = Metastack::new();
      for (level, name, data) in layers {
        stack.set_layer(level, &name, data);
      }
      if cache {
        stack.cache_partition(Level::Defaults);
      }
      let flat = stack.as_flat_mapping();
      for path in paths() {
        prop_assert_eq!(stack.get(&path), value_at_path(&flat, &path).cloned(), "path {}", path);
      }
    }
  }
}
