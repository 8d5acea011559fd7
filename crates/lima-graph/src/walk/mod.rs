//! Concurrent dependency walker.
//!
//! Expands a node's dependencies through the caller's [`NodeSource`], waits
//! for them with unbounded fan-out, then visits the node. Every reachable
//! node is visited exactly once: concurrent requests for the same node share
//! a single in-flight computation, and completed nodes are memoized for the
//! lifetime of the run.
//!
//! Cycle handling is two-tier. A dependency that reappears among its own
//! ancestors is a structural cycle and is skipped outright. A dependency
//! that is already, transitively, waiting on the requesting node through a
//! different traversal branch is a dynamic cycle: left alone, the two
//! branches would deadlock without any single path ever containing the loop.
//! The wait graph exists to catch exactly that shape. The reachability check
//! is a best-effort heuristic for deep indirect chains, but the two-node
//! mutual wait is detected deterministically because the check and the edge
//! registration share one lock acquisition.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{join_all, ready, try_join_all, BoxFuture, Either, Ready, Shared};
use futures::FutureExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::cancel::Cancellation;
use crate::error::{BoxError, TraversalPath, WalkError};
use crate::source::{DepResults, GraphNode, NodeSource};
use crate::RunResult;

/// Options shared by every run entry point
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Stop on the first failure (default) instead of attempting the whole
    /// reachable graph and aggregating every failure
    pub fail_fast: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { fail_fast: true }
    }
}

impl RunOptions {
    /// Options for a collect-all run: keep walking past failures and fail at
    /// the end with one composite error
    pub fn collect_all() -> Self {
        Self { fail_fast: false }
    }
}

/// Outcome of one node's computation, shared with every waiter
pub(crate) type NodeResult<S> =
    Result<<S as NodeSource>::Output, WalkError<<S as NodeSource>::Node>>;

type SharedWalk<S> = Shared<BoxFuture<'static, NodeResult<S>>>;

/// Future handed to requesters: either a memoized outcome or a handle onto
/// the single in-flight computation
type WalkHandle<S> = Either<Ready<NodeResult<S>>, SharedWalk<S>>;

enum NodeState<S: NodeSource> {
    InFlight(SharedWalk<S>),
    Done(NodeResult<S>),
}

/// Shared state for one concurrent run.
///
/// Created fresh per run and discarded when the run settles; nothing is
/// shared across independent runs.
pub(crate) struct RunCore<S: NodeSource> {
    pub(crate) source: Arc<S>,
    pub(crate) fail_fast: bool,
    pub(crate) signal: Cancellation,
    states: DashMap<S::Node, NodeState<S>>,
    waiting: Mutex<HashMap<S::Node, HashSet<S::Node>>>,
    pub(crate) results: Mutex<IndexMap<S::Node, S::Output>>,
    pub(crate) routes: Mutex<IndexMap<S::Node, Vec<S::Node>>>,
    pub(crate) failures: Mutex<Vec<WalkError<S::Node>>>,
    settle_tx: Option<mpsc::UnboundedSender<NodeResult<S>>>,
}

impl<S: NodeSource> RunCore<S> {
    pub(crate) fn new(source: Arc<S>, fail_fast: bool) -> Self {
        Self::build(source, fail_fast, None)
    }

    /// A core that additionally reports every node settlement, for the
    /// race/any combinators
    pub(crate) fn with_probe(
        source: Arc<S>,
        fail_fast: bool,
        settle_tx: mpsc::UnboundedSender<NodeResult<S>>,
    ) -> Self {
        Self::build(source, fail_fast, Some(settle_tx))
    }

    fn build(
        source: Arc<S>,
        fail_fast: bool,
        settle_tx: Option<mpsc::UnboundedSender<NodeResult<S>>>,
    ) -> Self {
        Self {
            source,
            fail_fast,
            signal: Cancellation::new(),
            states: DashMap::new(),
            waiting: Mutex::new(HashMap::new()),
            results: Mutex::new(IndexMap::new()),
            routes: Mutex::new(IndexMap::new()),
            failures: Mutex::new(Vec::new()),
            settle_tx,
        }
    }

    /// Snapshot of the live wait graph
    pub(crate) fn wait_snapshot(&self) -> HashMap<S::Node, HashSet<S::Node>> {
        self.waiting.lock().clone()
    }

    /// Tear down transient run state once the run has settled.
    ///
    /// Clears the wait graph (it must read as empty after the run no matter
    /// how it ended) and drops any abandoned in-flight futures, which hold
    /// the core alive through their captured `Arc`.
    pub(crate) fn finish(&self) {
        self.waiting.lock().clear();
        self.states.retain(|_, state| matches!(state, NodeState::Done(_)));
    }

    fn remove_wait(&self, parent: &S::Node, dep: &S::Node) {
        let mut waiting = self.waiting.lock();
        if let Some(edges) = waiting.get_mut(parent) {
            edges.remove(dep);
            if edges.is_empty() {
                waiting.remove(parent);
            }
        }
    }

    fn notify_settled(&self, outcome: NodeResult<S>) {
        if let Some(tx) = &self.settle_tx {
            let _ = tx.send(outcome);
        }
    }

    /// Wrap and record one failed callback; trips the shared cancellation
    /// token on the first fail-fast failure
    fn record_failure(
        &self,
        node: S::Node,
        path: Vec<S::Node>,
        source: BoxError,
    ) -> WalkError<S::Node> {
        let err = WalkError::traversal(node, path, source);
        debug!(error = %err, "node failed during graph run");
        if self.fail_fast {
            self.signal.cancel();
        }
        self.failures.lock().push(err.clone());
        self.notify_settled(Err(err.clone()));
        err
    }

    /// Record an invariant violation so collect-all runs still surface it
    fn record_invariant(&self, err: WalkError<S::Node>) {
        if self.fail_fast {
            self.signal.cancel();
        }
        self.failures.lock().push(err);
    }
}

/// True when `from` is already, transitively, waiting on `target`
fn transitively_waiting_on<N: GraphNode>(
    waiting: &HashMap<N, HashSet<N>>,
    from: &N,
    target: &N,
) -> bool {
    let mut pending = vec![from];
    let mut seen: HashSet<&N> = HashSet::new();
    while let Some(current) = pending.pop() {
        if current == target {
            return true;
        }
        if !seen.insert(current) {
            continue;
        }
        if let Some(next) = waiting.get(current) {
            pending.extend(next.iter());
        }
    }
    false
}

/// Request a node's computation.
///
/// `path` is the realized ancestor chain ending at `node` itself. At most
/// one `dependencies` + `visit` pair ever executes per node; every other
/// requester shares the first computation, and the first requester's path is
/// the one recorded in the route index.
pub(crate) fn walk<S: NodeSource>(
    core: &Arc<RunCore<S>>,
    node: S::Node,
    path: Vec<S::Node>,
) -> WalkHandle<S> {
    match core.states.entry(node.clone()) {
        Entry::Occupied(entry) => match entry.get() {
            NodeState::Done(done) => Either::Left(ready(done.clone())),
            NodeState::InFlight(shared) => Either::Right(shared.clone()),
        },
        Entry::Vacant(entry) => {
            let shared = expand(Arc::clone(core), node, path).boxed().shared();
            entry.insert(NodeState::InFlight(shared.clone()));
            Either::Right(shared)
        }
    }
}

async fn expand<S: NodeSource>(
    core: Arc<RunCore<S>>,
    node: S::Node,
    path: Vec<S::Node>,
) -> NodeResult<S> {
    let outcome = expand_inner(&core, &node, &path).await;
    core.states.insert(node, NodeState::Done(outcome.clone()));
    outcome
}

async fn expand_inner<S: NodeSource>(
    core: &Arc<RunCore<S>>,
    node: &S::Node,
    path: &[S::Node],
) -> NodeResult<S> {
    let deps = match core.source.dependencies(node).await {
        Ok(deps) => deps,
        Err(source) => return Err(core.record_failure(node.clone(), path.to_vec(), source)),
    };
    trace!(node = ?node, deps = deps.len(), "expanded node");

    // Classify dependencies and register wait edges under a single lock so
    // the mutual-wait check stays atomic with respect to sibling branches.
    let mut kept: Vec<S::Node> = Vec::new();
    let mut cycles: Vec<(S::Node, Vec<S::Node>)> = Vec::new();
    {
        let mut waiting = core.waiting.lock();
        for dep in deps {
            if kept.contains(&dep) {
                continue;
            }
            if path.contains(&dep) {
                // structural: the dependency is one of this node's ancestors
                match path.iter().position(|ancestor| *ancestor == dep) {
                    Some(pos) => cycles.push((dep, path[pos..].to_vec())),
                    None => {
                        let err = WalkError::PathLost { node: dep };
                        core.record_invariant(err.clone());
                        return Err(err);
                    }
                }
            } else if transitively_waiting_on(&waiting, &dep, node) {
                // dynamic: the dependency is already waiting on this node
                // through another traversal branch
                cycles.push((dep.clone(), vec![dep, node.clone()]));
            } else {
                waiting.entry(node.clone()).or_default().insert(dep.clone());
                kept.push(dep);
            }
        }
    }

    for (dep, cycle) in &cycles {
        debug!(node = ?dep, cycle = %TraversalPath(cycle), "dependency cycle detected");
        core.source.on_cycle(dep, cycle, path).await;
    }

    // Create every dependency walk before awaiting any of them, so
    // independent subtrees proceed with full parallelism.
    let dep_walks: Vec<(S::Node, WalkHandle<S>)> = kept
        .into_iter()
        .map(|dep| {
            let mut child = path.to_vec();
            child.push(dep.clone());
            let handle = walk(core, dep.clone(), child);
            (dep, handle)
        })
        .collect();

    let mut dep_results: DepResults<S::Node, S::Output> = DepResults::new();
    if core.fail_fast {
        let settled = try_join_all(dep_walks.into_iter().map(|(dep, handle)| {
            let core = Arc::clone(core);
            let parent = node.clone();
            async move {
                let outcome = handle.await;
                core.remove_wait(&parent, &dep);
                outcome.map(|value| (dep, value))
            }
        }))
        .await;
        match settled {
            Ok(pairs) => {
                for (dep, value) in pairs {
                    dep_results.insert(dep, value);
                }
            }
            // already recorded at its origin; propagate so ancestors and the
            // run settle immediately
            Err(err) => return Err(err),
        }
    } else {
        let settled = join_all(dep_walks.into_iter().map(|(dep, handle)| {
            let core = Arc::clone(core);
            let parent = node.clone();
            async move {
                let outcome = handle.await;
                core.remove_wait(&parent, &dep);
                (dep, outcome)
            }
        }))
        .await;
        for (dep, outcome) in settled {
            // failed dependencies are recorded at their origin and omitted
            // from the result map, like cyclic ones
            if let Ok(value) = outcome {
                dep_results.insert(dep, value);
            }
        }
    }

    core.routes
        .lock()
        .entry(node.clone())
        .or_insert_with(|| path.to_vec());

    trace!(node = ?node, deps = dep_results.len(), "visiting node");
    match core.source.visit(node, &core.signal, path, &dep_results).await {
        Ok(value) => {
            core.results.lock().insert(node.clone(), value.clone());
            core.notify_settled(Ok(value.clone()));
            Ok(value)
        }
        Err(source) => Err(core.record_failure(node.clone(), path.to_vec(), source)),
    }
}

/// Drive every entry node to completion under the core's failure policy
pub(crate) async fn run_all<S: NodeSource>(
    core: &Arc<RunCore<S>>,
    entries: &[S::Node],
) -> RunResult<S::Node, S::Output> {
    if entries.is_empty() {
        return Err(WalkError::EmptyGraph);
    }
    let roots: Vec<WalkHandle<S>> = entries
        .iter()
        .map(|entry| walk(core, entry.clone(), vec![entry.clone()]))
        .collect();

    let outcome = if core.fail_fast {
        try_join_all(roots).await.map(|_| ())
    } else {
        join_all(roots).await;
        let failures = core.failures.lock().clone();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(WalkError::Aggregate { errors: failures })
        }
    };

    core.finish();
    match outcome {
        Ok(()) => Ok(core.results.lock().clone()),
        Err(err) => Err(err),
    }
}

/// Walk the whole reachable graph concurrently and resolve with the full
/// node-to-result mapping.
///
/// Independent subtrees proceed in full parallel; a node's `visit` is never
/// invoked before all of its non-cyclic dependencies have completed theirs.
/// With `fail_fast` (the default) the first failure cancels the run and is
/// returned as a traversal error; otherwise the whole reachable graph is
/// attempted and failures are aggregated into one composite error.
pub async fn graph_run<S: NodeSource>(
    entries: Vec<S::Node>,
    source: Arc<S>,
    options: RunOptions,
) -> RunResult<S::Node, S::Output> {
    let core = Arc::new(RunCore::new(source, options.fail_fast));
    run_all(&core, &entries).await
}
