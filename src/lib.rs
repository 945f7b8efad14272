//! # metareactor
//!
//! Resolves per-node configuration metadata by running metadata reactors
//! over layered key-value stores until every node reaches a fixpoint.
//!
//! ## Architecture
//!
//! - [metastack]: layered metadata of one node (defaults, reactor output,
//!   group and node metadata) with deep merging, caching and blame.
//! - [reactor]: the [Reactor] contract and the [PartialMetadata] view a
//!   running reactor reads from.
//! - [invoker]: runs one reactor and classifies the outcome.
//! - [stability]: which nodes are unstable, triggered or not yet run.
//! - [engine]: the fixpoint loop and the [MetadataGenerator] entry point.
//! - [repository]: the [NodeSource] boundary and an in-memory [Repository];
//!   [repository_io] loads one from JSON.

pub mod cancel;
pub mod config;
#[cfg(test)]
mod config_test;
pub mod engine;
pub mod error;
pub mod invoker;
pub mod metadata;
pub mod metastack;
#[cfg(test)]
mod metastack_test;
pub mod order;
pub mod reactor;
pub mod repository;
pub mod repository_io;
pub mod stability;
#[cfg(test)]
mod stability_test;
pub mod types;

pub use cancel::CancellationToken;
pub use config::EngineConfig;
pub use engine::MetadataGenerator;
pub use error::MetadataError;
pub use metadata::Metadata;
pub use metastack::{Level, Metastack};
pub use reactor::{PartialMetadata, Reactor, ReactorError, StackView};
pub use repository::{NodeDefinition, NodeSource, Repository, reactor_fn};
pub use repository_io::load_repository;
pub use types::{Blame, ResolutionStats, ResolveMode, Resolved};
