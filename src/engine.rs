//! Fixpoint resolution of node metadata.
//!
//! A request for one node's metadata seeds that node's [Metastack] from its
//! static layers and runs its reactors. Reactors that read other nodes pull
//! those nodes into the same resolution. The loop below then reruns reactors
//! phase by phase until no reactor on any touched node changes its output:
//!
//! 1. initial run of a node nobody ran yet (all of its reactors)
//! 2. rerun of a node triggered by a change on a node it reads
//! 3. restabilize unstable nodes using only reactors that read no other node
//! 4. rerun the reactors that read other nodes, on every node
//!
//! Any phase that finds work restarts the loop at phase 1. The loop gives up
//! after [EngineConfig::max_iterations] passes.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, instrument};

use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::error::MetadataError;
use crate::invoker::ReactorInvoker;
use crate::metadata::Metadata;
use crate::metastack::{Level, Metastack};
use crate::order::Shuffler;
use crate::repository::{NodeDefinition, NodeSource};
use crate::stability::StabilityTracker;
use crate::types::{Blame, ResolutionStats, ResolveMode, Resolved};

/// Number of reactors listed in a divergence report.
pub const TOP_CHANGERS: usize = 25;

/// Resolves node metadata and caches flattened results across calls.
pub struct MetadataGenerator {
  source: Arc<dyn NodeSource>,
  config: EngineConfig,
  /// Flattened metadata of every node completed so far. Held for the whole
  /// check-build-populate sequence of a resolution.
  completed: Mutex<HashMap<String, Metadata>>,
  last_stats: Mutex<Option<ResolutionStats>>,
}

impl MetadataGenerator {
  pub fn new(source: Arc<dyn NodeSource>, config: EngineConfig) -> Self {
    Self {
      source,
      config,
      completed: Mutex::new(HashMap::new()),
      last_stats: Mutex::new(None),
    }
  }

  /// Resolves `node` and returns the requested view of its metadata.
  pub fn resolve(&self, node: &str, mode: ResolveMode) -> Result<Resolved, MetadataError> {
    self.resolve_cancellable(node, mode, &CancellationToken::new())
  }

  /// Like [Self::resolve], checking `cancel` before every iteration.
  ///
  /// [ResolveMode::Flat] is answered from the cache when possible. The other
  /// modes drop the node from the cache and resolve it again.
  #[instrument(level = "trace", skip(self, cancel))]
  pub fn resolve_cancellable(
    &self,
    node: &str,
    mode: ResolveMode,
    cancel: &CancellationToken,
  ) -> Result<Resolved, MetadataError> {
    let mut completed = lock(&self.completed);
    if !mode.uses_cache() {
      completed.remove(node);
    } else if let Some(done) = completed.get(node) {
      debug!(node, "metadata served from cache");
      return Ok(Resolved::Flat(done.clone()));
    }

    info!(node, ?mode, "resolving metadata");
    let finished = Resolution::new(self.source.as_ref(), &self.config, &completed).run(node, cancel)?;
    let Finished {
      mut stacks,
      ran,
      stats,
    } = finished;

    for name in &ran {
      if let Some(stack) = stacks.get(name) {
        completed.insert(name.clone(), stack.as_flat_mapping());
      }
    }
    *lock(&self.last_stats) = Some(stats);
    info!(
      node,
      iterations = stats.iterations,
      nodes = stats.nodes,
      reactor_runs = stats.reactor_runs,
      "metadata resolved"
    );

    match mode {
      ResolveMode::Flat => completed
        .get(node)
        .cloned()
        .map(Resolved::Flat)
        .ok_or_else(|| MetadataError::UnknownNode(node.to_string())),
      ResolveMode::Blame => stacks
        .get(node)
        .map(|s| Resolved::Blame(s.as_blame()))
        .ok_or_else(|| MetadataError::UnknownNode(node.to_string())),
      ResolveMode::Stack => stacks
        .remove(node)
        .map(Resolved::Stack)
        .ok_or_else(|| MetadataError::UnknownNode(node.to_string())),
    }
  }

  /// Flattened metadata of `node`.
  pub fn metadata(&self, node: &str) -> Result<Metadata, MetadataError> {
    self
      .resolve(node, ResolveMode::Flat)
      .map(|r| r.into_flat().unwrap_or_default())
  }

  /// Which layers supplied each key of `node`'s metadata.
  pub fn blame(&self, node: &str) -> Result<Blame, MetadataError> {
    self
      .resolve(node, ResolveMode::Blame)
      .map(|r| r.into_blame().unwrap_or_default())
  }

  /// The full layered stack of `node`.
  pub fn stack(&self, node: &str) -> Result<Metastack, MetadataError> {
    self
      .resolve(node, ResolveMode::Stack)
      .map(|r| r.into_stack().unwrap_or_default())
  }

  pub fn is_cached(&self, node: &str) -> bool {
    lock(&self.completed).contains_key(node)
  }

  /// Drops `node` from the cache so the next request resolves it again.
  pub fn invalidate(&self, node: &str) {
    lock(&self.completed).remove(node);
  }

  pub fn invalidate_all(&self) {
    lock(&self.completed).clear();
  }

  /// Counters of the most recent successful resolution.
  pub fn last_stats(&self) -> Option<ResolutionStats> {
    *lock(&self.last_stats)
  }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a successful resolution hands back to the cache.
struct Finished {
  stacks: HashMap<String, Metastack>,
  ran: BTreeSet<String>,
  stats: ResolutionStats,
}

/// Transient state of one top-level resolution.
struct Resolution<'a> {
  source: &'a dyn NodeSource,
  config: &'a EngineConfig,
  completed: &'a HashMap<String, Metadata>,
  definitions: HashMap<String, NodeDefinition>,
  stacks: HashMap<String, Metastack>,
  tracker: StabilityTracker,
  invoker: ReactorInvoker,
  shuffler: Shuffler,
  iterations: usize,
}

impl<'a> Resolution<'a> {
  fn new(
    source: &'a dyn NodeSource,
    config: &'a EngineConfig,
    completed: &'a HashMap<String, Metadata>,
  ) -> Self {
    Self {
      source,
      config,
      completed,
      definitions: HashMap::new(),
      stacks: HashMap::new(),
      tracker: StabilityTracker::new(),
      invoker: ReactorInvoker::new(),
      shuffler: Shuffler::new(config.shuffle, config.seed),
      iterations: 0,
    }
  }

  #[instrument(level = "trace", skip(self, cancel))]
  fn run(mut self, initial: &str, cancel: &CancellationToken) -> Result<Finished, MetadataError> {
    self.tracker.schedule(initial);

    loop {
      if cancel.is_cancelled() {
        info!(node = initial, iterations = self.iterations, "metadata resolution cancelled");
        return Err(MetadataError::Cancelled {
          node: initial.to_string(),
        });
      }

      self.iterations += 1;
      if self.iterations > self.config.max_iterations {
        return Err(MetadataError::Divergence {
          max_iterations: self.config.max_iterations,
          top_changers: self.invoker.top_changers(TOP_CHANGERS),
        });
      }
      debug!(
        iteration = self.iterations,
        nodes = self.tracker.node_count(),
        reactors = self.invoker.distinct_reactors(),
        runs = self.invoker.runs(),
        "metadata iteration"
      );

      if let Some(node) = self.tracker.pop_never_ran(&mut self.shuffler) {
        self.initial_run(&node)?;
        continue;
      }

      // every relevant node ran at least once from here on

      if let Some(node) = self.tracker.pop_triggered(&mut self.shuffler) {
        debug!(node = %node, "triggered metadata run");
        self.run_reactors(&node, true, true)?;
        continue;
      }

      let mut encountered_unstable = false;
      let unstable = self.tracker.unstable_nodes();
      for node in self.shuffler.randomize_order(unstable) {
        self.run_reactors(&node, false, true)?;
        if self.tracker.node_is_stable(&node) {
          debug!(node = %node, "metadata stabilized");
        } else {
          debug!(node = %node, "metadata remains unstable");
          encountered_unstable = true;
        }
      }
      if encountered_unstable {
        continue;
      }

      // only reactors reading other nodes can still change anything

      let mut encountered_unstable = false;
      let known = self.tracker.known_nodes();
      for node in self.shuffler.randomize_order(known) {
        self.run_reactors(&node, true, false)?;
        if !self.tracker.node_is_stable(&node) {
          encountered_unstable = true;
        }
      }
      if encountered_unstable {
        continue;
      }

      break;
    }

    if self.invoker.has_missing_keys() {
      return Err(MetadataError::PersistentKeyErrors {
        failures: self.invoker.missing_keys(),
      });
    }

    let ran = self.tracker.ran_nodes().clone();
    let stats = ResolutionStats {
      iterations: self.iterations,
      nodes: ran.len(),
      reactors: self.invoker.distinct_reactors(),
      reactor_runs: self.invoker.runs(),
    };
    Ok(Finished {
      stacks: self.stacks,
      ran,
      stats,
    })
  }

  /// Seeds the stack of `node` from its static layers and runs every reactor.
  #[instrument(level = "trace", skip(self))]
  fn initial_run(&mut self, node: &str) -> Result<(), MetadataError> {
    debug!(node, "initial metadata run");
    let definition = self.source.node(node)?;
    let mut stack = Metastack::new();

    for (name, data) in self.shuffler.randomize_order(definition.defaults.iter()) {
      stack.set_layer(Level::Defaults, name, data.clone());
    }
    stack.cache_partition(Level::Defaults);

    for group in &definition.groups {
      let data = self.source.group_metadata(group)?;
      stack.set_layer(Level::Static, &format!("group:{group}"), data);
    }
    stack.set_layer(
      Level::Static,
      &format!("node:{node}"),
      definition.metadata.clone(),
    );
    stack.cache_partition(Level::Static);

    self.stacks.insert(node.to_string(), stack);
    self.definitions.insert(node.to_string(), definition);
    self.run_reactors(node, true, true)?;
    Ok(())
  }

  /// Runs the reactors of `node` selected by phase; returns whether any changed.
  ///
  /// Reactors known to read other nodes run first when `with_deps` is set,
  /// the others afterwards when `without_deps` is set.
  #[instrument(level = "trace", skip(self))]
  fn run_reactors(
    &mut self,
    node: &str,
    with_deps: bool,
    without_deps: bool,
  ) -> Result<bool, MetadataError> {
    let reactors = self
      .definitions
      .get(node)
      .map(|d| d.reactors.clone())
      .unwrap_or_default();
    let mut any_changed = false;

    for deps_only in [true, false] {
      if (deps_only && !with_deps) || (!deps_only && !without_deps) {
        continue;
      }
      for (name, reactor) in self.shuffler.randomize_order(reactors.iter()) {
        if self.tracker.has_deps(node, name) != deps_only {
          continue;
        }
        let outcome = self.invoker.invoke(
          node,
          name,
          reactor.as_ref(),
          &mut self.stacks,
          self.completed,
        )?;
        debug!(node, reactor = %name, ?outcome, "reactor ran");
        let changed = outcome.changed();
        any_changed |= changed;
        if let Some(accessed) = outcome.accessed() {
          self.tracker.mark_reactor_result(node, name, changed, accessed);
        }
      }
    }

    self
      .tracker
      .update_stability(node, with_deps, without_deps, any_changed);
    Ok(any_changed)
  }
}
