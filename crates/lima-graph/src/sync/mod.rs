//! Sequential dependency walker.
//!
//! Same contract as the concurrent walker, driven by plain recursion: a
//! node's dependencies are walked strictly in order, each to completion,
//! before the node itself is visited. There is no concurrency, so there is
//! no wait graph and no dynamic cycle tier; a shared dependency discovered
//! through a second branch is already memoized, which is why sequential
//! traversals tend to record fewer, longer paths than concurrent ones for
//! the same graph.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::cancel::Cancellation;
use crate::error::{BoxError, TraversalPath, WalkError};
use crate::source::{DepResults, NodeSourceSync};
use crate::walk::RunOptions;
use crate::RunResult;

/// When a driven run stops early
pub(crate) enum HaltMode {
    /// Run the whole reachable graph
    Never,
    /// Stop at the first settlement, success or failure (`race_sync`)
    FirstSettle,
    /// Stop at the first success, walking past failures (`any_sync`)
    FirstSuccess,
}

/// Non-local exits unwinding through the recursive walk
pub(crate) enum Unwind<S: NodeSourceSync> {
    /// A probed settlement asked the run to stop
    Halted(Result<S::Output, WalkError<S::Node>>),
    /// A fail-fast failure propagating straight to the top
    Failed(WalkError<S::Node>),
}

/// How a driven run ended
pub(crate) enum Drive<S: NodeSourceSync> {
    Completed,
    Halted(Result<S::Output, WalkError<S::Node>>),
    Failed(WalkError<S::Node>),
}

type NodeOutcome<S> =
    Result<<S as NodeSourceSync>::Output, WalkError<<S as NodeSourceSync>::Node>>;

type Step<S, T> = Result<T, Unwind<S>>;

/// State for one sequential run; created fresh per run
pub(crate) struct SyncCore<'a, S: NodeSourceSync> {
    source: &'a S,
    fail_fast: bool,
    halt: HaltMode,
    signal: Cancellation,
    states: HashMap<S::Node, NodeOutcome<S>>,
    pub(crate) results: IndexMap<S::Node, S::Output>,
    pub(crate) routes: IndexMap<S::Node, Vec<S::Node>>,
    pub(crate) failures: Vec<WalkError<S::Node>>,
}

impl<'a, S: NodeSourceSync> SyncCore<'a, S> {
    pub(crate) fn new(source: &'a S, fail_fast: bool, halt: HaltMode) -> Self {
        Self {
            source,
            fail_fast,
            halt,
            signal: Cancellation::new(),
            states: HashMap::new(),
            results: IndexMap::new(),
            routes: IndexMap::new(),
            failures: Vec::new(),
        }
    }

    /// Walk every entry node in order
    pub(crate) fn drive(&mut self, entries: &[S::Node]) -> Drive<S> {
        for entry in entries {
            match self.walk(entry, vec![entry.clone()]) {
                Ok(_) => {}
                Err(Unwind::Halted(settlement)) => return Drive::Halted(settlement),
                Err(Unwind::Failed(err)) => return Drive::Failed(err),
            }
        }
        Drive::Completed
    }

    /// Fold a finished drive into the whole-graph run result
    pub(crate) fn into_run_result(self, drive: Drive<S>) -> RunResult<S::Node, S::Output> {
        match drive {
            Drive::Failed(err) => Err(err),
            Drive::Completed | Drive::Halted(_) => {
                if self.failures.is_empty() {
                    Ok(self.results)
                } else {
                    Err(WalkError::Aggregate { errors: self.failures })
                }
            }
        }
    }

    fn walk(&mut self, node: &S::Node, path: Vec<S::Node>) -> Step<S, NodeOutcome<S>> {
        if let Some(done) = self.states.get(node) {
            // shared dependency reached through a later branch; the branch
            // stops exploring here
            return Ok(done.clone());
        }
        let deps = match self.source.dependencies(node) {
            Ok(deps) => deps,
            Err(source) => return self.settle_failure(node, path, source),
        };
        trace!(node = ?node, deps = deps.len(), "expanded node");

        let mut dep_results: DepResults<S::Node, S::Output> = DepResults::new();
        for dep in deps {
            if path.contains(&dep) {
                // structural cycle: skip the edge, notify, keep walking
                match path.iter().position(|ancestor| *ancestor == dep) {
                    Some(pos) => {
                        let cycle = &path[pos..];
                        debug!(node = ?dep, cycle = %TraversalPath(cycle), "dependency cycle detected");
                        self.source.on_cycle(&dep, cycle, &path);
                    }
                    None => {
                        let err = WalkError::PathLost { node: dep };
                        self.failures.push(err.clone());
                        if self.fail_fast {
                            return Err(Unwind::Failed(err));
                        }
                        self.states.insert(node.clone(), Err(err.clone()));
                        return Ok(Err(err));
                    }
                }
                continue;
            }
            let mut child = path.clone();
            child.push(dep.clone());
            match self.walk(&dep, child)? {
                Ok(value) => {
                    dep_results.insert(dep, value);
                }
                // recorded at its origin; omitted from the result map like a
                // cyclic dependency
                Err(_) => {}
            }
        }

        self.routes.entry(node.clone()).or_insert_with(|| path.clone());

        trace!(node = ?node, deps = dep_results.len(), "visiting node");
        match self.source.visit(node, &self.signal, &path, &dep_results) {
            Ok(value) => {
                self.states.insert(node.clone(), Ok(value.clone()));
                self.results.insert(node.clone(), value.clone());
                self.settle_success(value)
            }
            Err(source) => self.settle_failure(node, path, source),
        }
    }

    fn settle_success(&mut self, value: S::Output) -> Step<S, NodeOutcome<S>> {
        match self.halt {
            HaltMode::FirstSettle | HaltMode::FirstSuccess => Err(Unwind::Halted(Ok(value))),
            HaltMode::Never => Ok(Ok(value)),
        }
    }

    fn settle_failure(
        &mut self,
        node: &S::Node,
        path: Vec<S::Node>,
        source: BoxError,
    ) -> Step<S, NodeOutcome<S>> {
        let err = WalkError::traversal(node.clone(), path, source);
        debug!(error = %err, "node failed during graph run");
        self.states.insert(node.clone(), Err(err.clone()));
        self.failures.push(err.clone());
        if matches!(self.halt, HaltMode::FirstSettle) {
            return Err(Unwind::Halted(Err(err)));
        }
        if self.fail_fast {
            return Err(Unwind::Failed(err));
        }
        Ok(Err(err))
    }
}

/// Walk the whole reachable graph strictly sequentially and resolve with the
/// full node-to-result mapping.
///
/// Behavior-equivalent to [`graph_run`](crate::graph_run) for side-effect-free
/// callbacks, modulo recorded paths and cycle reports: dependencies are
/// walked in order, one at a time, and a fail-fast error unwinds the walk
/// immediately.
pub fn graph_run_sync<S: NodeSourceSync>(
    entries: Vec<S::Node>,
    source: Arc<S>,
    options: RunOptions,
) -> RunResult<S::Node, S::Output> {
    if entries.is_empty() {
        return Err(WalkError::EmptyGraph);
    }
    let mut core = SyncCore::new(source.as_ref(), options.fail_fast, HaltMode::Never);
    let drive = core.drive(&entries);
    core.into_run_result(drive)
}
