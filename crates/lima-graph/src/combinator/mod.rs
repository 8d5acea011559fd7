//! Race / any / all-settled completion semantics.
//!
//! All three are layered on the same walkers; they differ only in how and
//! when the overall operation completes. The concurrent variants observe a
//! settlement probe fed by the run core; the sequential variants halt the
//! recursive walk through the sync engine's unwind channel.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::mpsc;

use crate::error::WalkError;
use crate::source::{GraphNode, NodeSource, NodeSourceSync};
use crate::sync::{Drive, HaltMode, SyncCore};
use crate::walk::{run_all, RunCore};

/// Per-node outcome reported by [`all_settled`] / [`all_settled_sync`]
#[derive(Debug, Clone)]
pub enum Settled<R, N: GraphNode> {
    /// The node's visit completed with a value
    Fulfilled(R),
    /// The node's computation failed with the given reason
    Rejected(WalkError<N>),
}

impl<R, N: GraphNode> Settled<R, N> {
    /// Check whether the node's visit completed with a value
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    /// Check whether the node's computation failed
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The visit result, if fulfilled
    pub fn value(&self) -> Option<&R> {
        match self {
            Self::Fulfilled(value) => Some(value),
            Self::Rejected(_) => None,
        }
    }

    /// The failure reason, if rejected
    pub fn reason(&self) -> Option<&WalkError<N>> {
        match self {
            Self::Fulfilled(_) => None,
            Self::Rejected(reason) => Some(reason),
        }
    }
}

/// Settle as soon as any single node's computation settles, success or
/// failure, independent of the rest of the graph.
///
/// Because visits run dependencies-first, the winner is typically the first
/// leaf to finish. The rest of the traversal is dropped once the winner is
/// known.
pub async fn race<S: NodeSource>(
    entries: Vec<S::Node>,
    source: Arc<S>,
) -> Result<S::Output, WalkError<S::Node>> {
    if entries.is_empty() {
        return Err(WalkError::EmptyGraph);
    }
    let (tx, mut rx) = mpsc::unbounded_channel();
    let core = Arc::new(RunCore::with_probe(source, false, tx));
    let run = run_all(&core, &entries);
    tokio::pin!(run);

    let settled = tokio::select! {
        biased;
        Some(settled) = rx.recv() => settled,
        outcome = &mut run => {
            // the run settled at least one node before completing; pick up
            // the settlement that raced with completion
            match rx.try_recv() {
                Ok(settled) => settled,
                Err(_) => match outcome {
                    Err(err) => Err(err),
                    Ok(_) => Err(WalkError::Aggregate { errors: core.failures.lock().clone() }),
                },
            }
        }
    };
    core.finish();
    settled
}

/// Resolve with the first successful visit result, ignoring failures along
/// the way; if every reachable node fails, fail with a composite error
/// aggregating every reason.
pub async fn any<S: NodeSource>(
    entries: Vec<S::Node>,
    source: Arc<S>,
) -> Result<S::Output, WalkError<S::Node>> {
    if entries.is_empty() {
        return Err(WalkError::EmptyGraph);
    }
    let (tx, mut rx) = mpsc::unbounded_channel();
    let core = Arc::new(RunCore::with_probe(source, false, tx));
    let run = run_all(&core, &entries);
    tokio::pin!(run);

    loop {
        tokio::select! {
            biased;
            Some(settled) = rx.recv() => {
                // failures only matter if every node fails; keep waiting
                if let Ok(value) = settled {
                    core.finish();
                    return Ok(value);
                }
            }
            outcome = &mut run => {
                // pick up any success that raced with run completion
                while let Ok(settled) = rx.try_recv() {
                    if let Ok(value) = settled {
                        core.finish();
                        return Ok(value);
                    }
                }
                core.finish();
                return match outcome {
                    Err(err) => Err(err),
                    Ok(_) => Err(WalkError::Aggregate { errors: core.failures.lock().clone() }),
                };
            }
        }
    }
}

/// Always run the whole reachable graph and report every node's outcome.
///
/// Never fails for per-node errors; each node is reported as fulfilled with
/// its value or rejected with its reason. The only error is the empty
/// entry-set configuration error, raised before any traversal.
pub async fn all_settled<S: NodeSource>(
    entries: Vec<S::Node>,
    source: Arc<S>,
) -> Result<IndexMap<S::Node, Settled<S::Output, S::Node>>, WalkError<S::Node>> {
    if entries.is_empty() {
        return Err(WalkError::EmptyGraph);
    }
    let core = Arc::new(RunCore::new(source, false));
    // per-node failures are captured below instead of failing the operation
    let _ = run_all(&core, &entries).await;
    let results = core.results.lock().clone();
    let failures = core.failures.lock().clone();
    Ok(merge_settled(results, failures))
}

/// Sequential [`race`]: the walk halts at the first visit settlement
pub fn race_sync<S: NodeSourceSync>(
    entries: Vec<S::Node>,
    source: Arc<S>,
) -> Result<S::Output, WalkError<S::Node>> {
    if entries.is_empty() {
        return Err(WalkError::EmptyGraph);
    }
    let mut core = SyncCore::new(source.as_ref(), false, HaltMode::FirstSettle);
    match core.drive(&entries) {
        Drive::Halted(settlement) => settlement,
        Drive::Failed(err) => Err(err),
        Drive::Completed => Err(WalkError::Aggregate { errors: core.failures }),
    }
}

/// Sequential [`any`]: the walk halts at the first success and otherwise
/// aggregates every failure
pub fn any_sync<S: NodeSourceSync>(
    entries: Vec<S::Node>,
    source: Arc<S>,
) -> Result<S::Output, WalkError<S::Node>> {
    if entries.is_empty() {
        return Err(WalkError::EmptyGraph);
    }
    let mut core = SyncCore::new(source.as_ref(), false, HaltMode::FirstSuccess);
    match core.drive(&entries) {
        Drive::Halted(Ok(value)) => Ok(value),
        Drive::Halted(Err(err)) | Drive::Failed(err) => Err(err),
        Drive::Completed => Err(WalkError::Aggregate { errors: core.failures }),
    }
}

/// Sequential [`all_settled`]
pub fn all_settled_sync<S: NodeSourceSync>(
    entries: Vec<S::Node>,
    source: Arc<S>,
) -> Result<IndexMap<S::Node, Settled<S::Output, S::Node>>, WalkError<S::Node>> {
    if entries.is_empty() {
        return Err(WalkError::EmptyGraph);
    }
    let mut core = SyncCore::new(source.as_ref(), false, HaltMode::Never);
    let _ = core.drive(&entries);
    Ok(merge_settled(core.results, core.failures))
}

fn merge_settled<N: GraphNode, R>(
    results: IndexMap<N, R>,
    failures: Vec<WalkError<N>>,
) -> IndexMap<N, Settled<R, N>> {
    let mut settled: IndexMap<N, Settled<R, N>> = IndexMap::new();
    for (node, value) in results {
        settled.insert(node, Settled::Fulfilled(value));
    }
    for failure in failures {
        if let Some(node) = failure.failing_node().cloned() {
            settled.insert(node, Settled::Rejected(failure));
        }
    }
    settled
}
