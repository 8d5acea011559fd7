//! Stateful run handles.
//!
//! A runner wraps exactly one run: it performs the traversal, stores the
//! result mapping and the realized route index, and exposes the live wait
//! graph for diagnostics while the run is in flight. Afterwards the route
//! index answers `route(a, b)` queries about how nodes were actually
//! reached.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::error::WalkError;
use crate::source::{GraphNode, NodeSource, NodeSourceSync};
use crate::sync::{HaltMode, SyncCore};
use crate::walk::{run_all, RunCore, RunOptions};
use crate::RunResult;

/// Slice the realized path recorded for `to` at the first occurrence of
/// `from`.
///
/// The recorded path ends at `to`, so `from` must appear strictly earlier:
/// `route(a, a)` is unconnected unless a self-loop was actually traversed,
/// which the walker never does.
fn route_between<N: GraphNode>(
    routes: &IndexMap<N, Vec<N>>,
    from: &N,
    to: &N,
) -> Option<Vec<N>> {
    let path = routes.get(to)?;
    let prefix = &path[..path.len().checked_sub(1)?];
    let pos = prefix.iter().position(|node| node == from)?;
    Some(path[pos..].to_vec())
}

/// Stateful handle for one concurrent run.
///
/// Constructed with the same inputs as [`graph_run`](crate::graph_run).
/// `run` is not intended to be invoked concurrently with itself; once the
/// run has settled, further calls return the stored outcome without
/// re-traversing.
pub struct Runner<S: NodeSource> {
    entries: Vec<S::Node>,
    core: Arc<RunCore<S>>,
    outcome: Mutex<Option<RunResult<S::Node, S::Output>>>,
}

impl<S: NodeSource> Runner<S> {
    /// Build a runner over the given entry nodes and source
    pub fn new(entries: Vec<S::Node>, source: Arc<S>, options: RunOptions) -> Self {
        Self {
            entries,
            core: Arc::new(RunCore::new(source, options.fail_fast)),
            outcome: Mutex::new(None),
        }
    }

    /// Perform the traversal and store the outcome
    pub async fn run(&self) -> RunResult<S::Node, S::Output> {
        if let Some(outcome) = self.outcome.lock().clone() {
            return outcome;
        }
        let outcome = run_all(&self.core, &self.entries).await;
        *self.outcome.lock() = Some(outcome.clone());
        outcome
    }

    /// Snapshot of the live wait graph: which node is currently waiting on
    /// which to complete.
    ///
    /// Only meaningful while `run` is in flight; guaranteed empty once the
    /// run has settled, regardless of outcome.
    pub fn wait_graph(&self) -> HashMap<S::Node, HashSet<S::Node>> {
        self.core.wait_snapshot()
    }

    /// The ordered path `[from, ..., to]` by which `to` was actually reached
    /// as a descendant of `from` during the completed run, or `None` if it
    /// never was (including when either node was never visited at all).
    pub fn route(&self, from: &S::Node, to: &S::Node) -> Option<Vec<S::Node>> {
        route_between(&self.core.routes.lock(), from, to)
    }
}

/// Stateful handle for one sequential run.
///
/// Sequential execution never has two branches in flight at once, so its
/// wait graph is empty by construction.
pub struct RunnerSync<S: NodeSourceSync> {
    entries: Vec<S::Node>,
    source: Arc<S>,
    options: RunOptions,
    routes: IndexMap<S::Node, Vec<S::Node>>,
    outcome: Option<RunResult<S::Node, S::Output>>,
}

impl<S: NodeSourceSync> RunnerSync<S> {
    /// Build a runner over the given entry nodes and source
    pub fn new(entries: Vec<S::Node>, source: Arc<S>, options: RunOptions) -> Self {
        Self {
            entries,
            source,
            options,
            routes: IndexMap::new(),
            outcome: None,
        }
    }

    /// Perform the traversal and store the outcome
    pub fn run(&mut self) -> RunResult<S::Node, S::Output> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let outcome = if self.entries.is_empty() {
            Err(WalkError::EmptyGraph)
        } else {
            let mut core =
                SyncCore::new(self.source.as_ref(), self.options.fail_fast, HaltMode::Never);
            let drive = core.drive(&self.entries);
            self.routes = std::mem::take(&mut core.routes);
            core.into_run_result(drive)
        };
        self.outcome = Some(outcome.clone());
        outcome
    }

    /// The wait graph of a sequential run, always empty
    pub fn wait_graph(&self) -> HashMap<S::Node, HashSet<S::Node>> {
        HashMap::new()
    }

    /// The ordered path `[from, ..., to]` by which `to` was actually reached
    /// as a descendant of `from` during the completed run
    pub fn route(&self, from: &S::Node, to: &S::Node) -> Option<Vec<S::Node>> {
        route_between(&self.routes, from, to)
    }
}

#[cfg(test)]
mod tests;
