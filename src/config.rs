//! Engine configuration.

use std::env;

use tracing::warn;

/// Default outer-loop iteration budget.
pub const DEFAULT_MAX_ITERATIONS: usize = 5000;

/// Overrides [EngineConfig::max_iterations].
pub const ENV_MAX_ITERATIONS: &str = "METAREACTOR_MAX_ITERATIONS";

/// Pins the evaluation-order shuffle to a seed.
pub const ENV_SEED: &str = "METAREACTOR_SEED";

/// Settings for [crate::MetadataGenerator].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
  /// Abort with a divergence error after this many outer-loop iterations.
  pub max_iterations: usize,
  /// Shuffle nodes, reactors and defaults before each phase.
  pub shuffle: bool,
  /// Seed for the shuffle; random when `None`.
  pub seed: Option<u64>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      max_iterations: DEFAULT_MAX_ITERATIONS,
      shuffle: true,
      seed: None,
    }
  }
}

impl EngineConfig {
  /// Defaults, overridden by `METAREACTOR_MAX_ITERATIONS` and `METAREACTOR_SEED`.
  pub fn from_env() -> Self {
    Self::from_lookup(|key| env::var(key).ok())
  }

  pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let mut config = Self::default();
    if let Some(raw) = lookup(ENV_MAX_ITERATIONS) {
      match raw.trim().parse() {
        Ok(n) => config.max_iterations = n,
        Err(_) => warn!(value = %raw, "ignoring invalid {}", ENV_MAX_ITERATIONS),
      }
    }
    if let Some(raw) = lookup(ENV_SEED) {
      match raw.trim().parse() {
        Ok(seed) => config.seed = Some(seed),
        Err(_) => warn!(value = %raw, "ignoring invalid {}", ENV_SEED),
      }
    }
    config
  }

  pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
    self.max_iterations = max_iterations;
    self
  }

  pub fn with_seed(mut self, seed: u64) -> Self {
    self.seed = Some(seed);
    self
  }

  pub fn without_shuffle(mut self) -> Self {
    self.shuffle = false;
    self
  }
}
