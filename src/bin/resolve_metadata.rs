//! CLI: resolve node metadata from a JSON repository file.
//!
//! Usage: `resolve_metadata [OPTIONS] <repository.json> <node>...`
//! Example: resolve_metadata --seed 1 tests/integration/linear.json b
//!
//! Prints one JSON object keyed by node name. With `--blame` each node maps
//! key paths to the layers that supplied them; with `--stack` each node lists
//! its layers, highest precedence first.
//!
//! Set RUST_LOG=metareactor=debug to follow the resolution phase by phase.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use metareactor::config::{DEFAULT_MAX_ITERATIONS, ENV_MAX_ITERATIONS, ENV_SEED};
use metareactor::{EngineConfig, MetadataGenerator, ResolveMode, Resolved, load_repository};
use serde_json::{Map, Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Resolve node metadata from a JSON repository file.
#[derive(Parser, Debug)]
#[command(name = "resolve_metadata")]
struct Args {
  /// Abort after this many resolution iterations.
  #[arg(long, value_name = "N", env = ENV_MAX_ITERATIONS, default_value_t = DEFAULT_MAX_ITERATIONS)]
  max_iterations: usize,

  /// Seed for the evaluation-order shuffle.
  #[arg(long, value_name = "SEED", env = ENV_SEED)]
  seed: Option<u64>,

  /// Evaluate nodes and reactors in a fixed order.
  #[arg(long)]
  no_shuffle: bool,

  /// Print which layer supplied each key instead of the metadata.
  #[arg(long, conflicts_with = "stack")]
  blame: bool,

  /// Print every layer instead of the merged metadata.
  #[arg(long)]
  stack: bool,

  /// Path to the repository JSON file
  #[arg(value_name = "repository.json")]
  repository: PathBuf,

  /// Nodes to resolve
  #[arg(value_name = "node", required = true)]
  nodes: Vec<String>,
}

impl Args {
  fn config(&self) -> EngineConfig {
    EngineConfig {
      max_iterations: self.max_iterations,
      shuffle: !self.no_shuffle,
      seed: self.seed,
    }
  }

  fn mode(&self) -> ResolveMode {
    if self.blame {
      ResolveMode::Blame
    } else if self.stack {
      ResolveMode::Stack
    } else {
      ResolveMode::Flat
    }
  }
}

fn render(resolved: Resolved) -> Value {
  match resolved {
    Resolved::Flat(metadata) => Value::Object(metadata),
    Resolved::Blame(blame) => json!(blame),
    Resolved::Stack(stack) => Value::Array(
      stack
        .layers()
        .map(|(level, layer)| json!({"level": level, "name": layer.name, "data": layer.data}))
        .collect(),
    ),
  }
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = args.config();
  let mode = args.mode();
  info!(?config, ?mode, repository = %args.repository.display(), "resolve_metadata starting");

  let repo = match load_repository(&args.repository) {
    Ok(r) => r,
    Err(e) => {
      eprintln!("Error: {}", e);
      process::exit(1);
    }
  };
  let generator = Arc::new(MetadataGenerator::new(Arc::new(repo), config));

  let jobs = args.nodes.iter().cloned().map(|node| {
    let generator = Arc::clone(&generator);
    tokio::task::spawn_blocking(move || {
      let resolved = generator.resolve(&node, mode);
      (node, resolved)
    })
  });

  let mut out = Map::new();
  let mut failed = false;
  for joined in futures::future::join_all(jobs).await {
    match joined {
      Ok((node, Ok(resolved))) => {
        out.insert(node, render(resolved));
      }
      Ok((node, Err(e))) => {
        eprintln!("Error resolving {}: {}", node, e);
        failed = true;
      }
      Err(e) => {
        eprintln!("Error: resolver task failed: {}", e);
        failed = true;
      }
    }
  }

  match serde_json::to_string_pretty(&Value::Object(out)) {
    Ok(s) => println!("{}", s),
    Err(e) => {
      eprintln!("Error: {}", e);
      process::exit(1);
    }
  }
  if failed {
    process::exit(1);
  }
}
