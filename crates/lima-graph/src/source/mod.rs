//! Caller-facing seams: node contract, dependency expansion, and visits.
//!
//! The walker is domain-agnostic; everything it knows about the graph comes
//! through one of the traits below. Concurrent runs use [`NodeSource`],
//! sequential runs use [`NodeSourceSync`], and [`FnSource`] adapts plain
//! closures to both so callers with synchronous callbacks need no trait impl.

use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::cancel::Cancellation;
use crate::error::BoxError;

/// Contract for values usable as graph vertices.
///
/// Nodes are identity-compared and used as map keys, which makes node
/// identity a hard contract on [`NodeSource::dependencies`]: the same logical
/// dependency must be returned as an equal node value every time an edge
/// references it. Callers that mint a fresh, non-equal value per edge defeat
/// both deduplication and cycle detection. For object-shaped nodes, keep a
/// canonical vertex registry (an arena plus a small index key) and hand out
/// the index rather than re-allocating node values.
pub trait GraphNode: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T: Clone + Eq + Hash + Debug + Send + Sync + 'static> GraphNode for T {}

/// Per-node map from a direct dependency to its visit result.
///
/// Dependencies elided because of a detected cycle, and dependencies whose
/// own computation failed in a collect-all run, are simply absent.
pub type DepResults<N, R> = IndexMap<N, R>;

/// Dependency expansion and visit callbacks for concurrent runs.
///
/// `dependencies` and `visit` may suspend freely; the walker awaits them
/// without introducing any serialization beyond a node's own dependency
/// edges. Both kinds of failure are wrapped into a traversal error carrying
/// the node and active path.
#[async_trait]
pub trait NodeSource: Send + Sync + 'static {
    /// Graph vertex type
    type Node: GraphNode;
    /// Per-node visit result
    type Output: Clone + Send + Sync + 'static;

    /// Expand a node into its ordered list of direct dependencies
    async fn dependencies(&self, node: &Self::Node) -> Result<Vec<Self::Node>, BoxError>;

    /// Compute a node's result once all of its non-cyclic dependencies have
    /// completed.
    ///
    /// `path` is the realized ancestor chain from an entry point, ending at
    /// `node` itself. `signal` is the run-scoped cancellation token; visits
    /// are expected to observe it and stop early when a fail-fast run trips.
    async fn visit(
        &self,
        node: &Self::Node,
        signal: &Cancellation,
        path: &[Self::Node],
        deps: &DepResults<Self::Node, Self::Output>,
    ) -> Result<Self::Output, BoxError>;

    /// Notification that a dependency edge was skipped because it closes a
    /// cycle.
    ///
    /// `node` is the skipped dependency. For a structural cycle, `cycle` is
    /// the sub-path from the repeated ancestor down to the node that listed
    /// the dependency; for a dynamic cycle it is the two-element
    /// `[skipped, waiting]` pair. Defaults to a no-op.
    async fn on_cycle(&self, node: &Self::Node, cycle: &[Self::Node], path: &[Self::Node]) {
        let _ = (node, cycle, path);
    }
}

/// Dependency expansion and visit callbacks for sequential runs.
///
/// Mirrors [`NodeSource`] with plain functions. The token passed to `visit`
/// is never signalled in sequential mode; an error unwinds the walk
/// immediately instead.
pub trait NodeSourceSync {
    /// Graph vertex type
    type Node: GraphNode;
    /// Per-node visit result
    type Output: Clone;

    /// Expand a node into its ordered list of direct dependencies
    fn dependencies(&self, node: &Self::Node) -> Result<Vec<Self::Node>, BoxError>;

    /// Compute a node's result once its non-cyclic dependencies are done
    fn visit(
        &self,
        node: &Self::Node,
        signal: &Cancellation,
        path: &[Self::Node],
        deps: &DepResults<Self::Node, Self::Output>,
    ) -> Result<Self::Output, BoxError>;

    /// Notification that a dependency edge closed a cycle; defaults to a
    /// no-op
    fn on_cycle(&self, node: &Self::Node, cycle: &[Self::Node], path: &[Self::Node]) {
        let _ = (node, cycle, path);
    }
}

/// Cycle-notification hook stored by [`FnSource`]
pub type CycleHook<N> = Box<dyn Fn(&N, &[N], &[N]) + Send + Sync>;

/// Adapter that builds a node source from plain closures.
///
/// Implements both [`NodeSource`] and [`NodeSourceSync`], so one definition
/// drives either execution mode. Callbacks that genuinely need to suspend
/// should implement [`NodeSource`] directly instead.
pub struct FnSource<N, R, D, V> {
    deps_fn: D,
    visit_fn: V,
    cycle_hook: Option<CycleHook<N>>,
    _output: PhantomData<fn() -> R>,
}

impl<N, R, D, V> FnSource<N, R, D, V> {
    /// Build a source from a dependency-expansion closure and a visit closure
    pub fn new(deps_fn: D, visit_fn: V) -> Self {
        Self { deps_fn, visit_fn, cycle_hook: None, _output: PhantomData }
    }

    /// Attach a cycle-notification hook
    pub fn with_on_cycle(mut self, hook: impl Fn(&N, &[N], &[N]) + Send + Sync + 'static) -> Self {
        self.cycle_hook = Some(Box::new(hook));
        self
    }
}

#[async_trait]
impl<N, R, D, V> NodeSource for FnSource<N, R, D, V>
where
    N: GraphNode,
    R: Clone + Send + Sync + 'static,
    D: Fn(&N) -> Result<Vec<N>, BoxError> + Send + Sync + 'static,
    V: Fn(&N, &Cancellation, &[N], &DepResults<N, R>) -> Result<R, BoxError>
        + Send
        + Sync
        + 'static,
{
    type Node = N;
    type Output = R;

    async fn dependencies(&self, node: &N) -> Result<Vec<N>, BoxError> {
        (self.deps_fn)(node)
    }

    async fn visit(
        &self,
        node: &N,
        signal: &Cancellation,
        path: &[N],
        deps: &DepResults<N, R>,
    ) -> Result<R, BoxError> {
        (self.visit_fn)(node, signal, path, deps)
    }

    async fn on_cycle(&self, node: &N, cycle: &[N], path: &[N]) {
        if let Some(hook) = &self.cycle_hook {
            hook(node, cycle, path);
        }
    }
}

impl<N, R, D, V> NodeSourceSync for FnSource<N, R, D, V>
where
    N: GraphNode,
    R: Clone,
    D: Fn(&N) -> Result<Vec<N>, BoxError>,
    V: Fn(&N, &Cancellation, &[N], &DepResults<N, R>) -> Result<R, BoxError>,
{
    type Node = N;
    type Output = R;

    fn dependencies(&self, node: &N) -> Result<Vec<N>, BoxError> {
        (self.deps_fn)(node)
    }

    fn visit(
        &self,
        node: &N,
        signal: &Cancellation,
        path: &[N],
        deps: &DepResults<N, R>,
    ) -> Result<R, BoxError> {
        (self.visit_fn)(node, signal, path, deps)
    }

    fn on_cycle(&self, node: &N, cycle: &[N], path: &[N]) {
        if let Some(hook) = &self.cycle_hook {
            hook(node, cycle, path);
        }
    }
}
