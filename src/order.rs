//! Deliberate evaluation-order shuffling.
//!
//! Nodes, reactors and defaults layers are shuffled before every phase so
//! reactors that silently rely on evaluation order fail early instead of
//! working by accident. A fixed seed makes a run reproducible.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::{IteratorRandom, SliceRandom};

/// Source of evaluation order for one resolution.
#[derive(Debug)]
pub struct Shuffler {
  rng: Option<StdRng>,
}

impl Shuffler {
  /// `shuffle = false` keeps the given order; `seed` pins the permutation.
  pub fn new(shuffle: bool, seed: Option<u64>) -> Self {
    let rng = shuffle.then(|| match seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_entropy(),
    });
    Self { rng }
  }

  /// Returns `items` in randomized order (or unchanged when disabled).
  pub fn randomize_order<T>(&mut self, items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut items: Vec<T> = items.into_iter().collect();
    if let Some(rng) = self.rng.as_mut() {
      items.shuffle(rng);
    }
    items
  }

  /// Picks one of `items` at random (the first one when disabled).
  pub fn choose<T>(&mut self, items: impl IntoIterator<Item = T>) -> Option<T> {
    match self.rng.as_mut() {
      Some(rng) => items.into_iter().choose(rng),
      None => items.into_iter().next(),
    }
  }
}
