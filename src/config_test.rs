//! Tests for `EngineConfig`.

use std::collections::HashMap;

use crate::config::{DEFAULT_MAX_ITERATIONS, ENV_MAX_ITERATIONS, ENV_SEED, EngineConfig};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
  let vars: HashMap<String, String> = vars
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
  move |key| vars.get(key).cloned()
}

#[test]
fn defaults() {
  let c = EngineConfig::default();
  assert_eq!(c.max_iterations, DEFAULT_MAX_ITERATIONS);
  assert!(c.shuffle);
  assert_eq!(c.seed, None);
}

#[test]
fn env_overrides() {
  let c = EngineConfig::from_lookup(lookup(&[(ENV_MAX_ITERATIONS, "12"), (ENV_SEED, " 7 ")]));
  assert_eq!(c.max_iterations, 12);
  assert_eq!(c.seed, Some(7));
}

#[test]
fn invalid_env_values_are_ignored() {
  let c = EngineConfig::from_lookup(lookup(&[(ENV_MAX_ITERATIONS, "lots"), (ENV_SEED, "-1")]));
  assert_eq!(c, EngineConfig::default());
}

#[test]
fn builders() {
  let c = EngineConfig::default()
    .with_max_iterations(5)
    .with_seed(3)
    .without_shuffle();
  assert_eq!(c.max_iterations, 5);
  assert_eq!(c.seed, Some(3));
  assert!(!c.shuffle);
}
