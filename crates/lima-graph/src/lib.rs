//! # lima-graph
//!
//! Graph execution engine for the Lima toolchain.
//!
//! Walks an arbitrary, possibly cyclic, caller-supplied dependency graph and
//! visits every reachable node exactly once, dependencies first. The walker
//! discovers edges on the fly through a [`NodeSource`], so the graph never
//! has to be materialized up front and may even be unbounded.
//!
//! This crate provides:
//! - `graph_run` / `graph_run_sync` for concurrent and strictly sequential
//!   traversal of the whole reachable graph
//! - `race` / `any` / `all_settled` combinators (plus `_sync` variants)
//!   layered on the same walker
//! - `Runner` / `RunnerSync` handles exposing the live wait graph and
//!   post-run `route` queries
//! - Two-tier cycle detection: structural (a node reappears among its own
//!   ancestors) and dynamic (two traversal branches mutually waiting on a
//!   shared node)
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `source`: the caller-facing seam traits and closure adapter
//! - `walk`: the concurrent walker core
//! - `sync`: the sequential walker core
//! - `combinator`: race/any/all-settled completion semantics
//! - `runner`: stateful run handles and route queries
//! - `cancel`: the run-scoped cooperative cancellation token
//! - `error`: error types and category guards

pub mod cancel;
pub mod combinator;
pub mod error;
pub mod runner;
pub mod source;
pub mod sync;
pub mod walk;

// Re-export the public surface
pub use cancel::Cancellation;
pub use combinator::{all_settled, all_settled_sync, any, any_sync, race, race_sync, Settled};
pub use error::{engine_error, BoxError, TraversalFailure, WalkError};
pub use runner::{Runner, RunnerSync};
pub use source::{DepResults, FnSource, GraphNode, NodeSource, NodeSourceSync};
pub use sync::graph_run_sync;
pub use walk::{graph_run, RunOptions};

/// Result type alias for whole-graph runs
pub type RunResult<N, R> = Result<indexmap::IndexMap<N, R>, WalkError<N>>;
