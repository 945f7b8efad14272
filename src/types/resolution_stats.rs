//! Counters describing the last completed resolution.

use serde::Serialize;

/// Counters describing one resolution run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionStats {
  /// Outer-loop iterations (one per pass through the phases).
  pub iterations: usize,
  /// Nodes that ran at least once.
  pub nodes: usize,
  /// Distinct reactors invoked.
  pub reactors: usize,
  /// Total reactor invocations.
  pub reactor_runs: u64,
}
