//! Error types and category guards for graph runs.
//!
//! Distinguishes engine-internal failures (configuration problems, invariant
//! violations) from domain failures raised inside caller callbacks, which are
//! carried as wrapped sources.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::source::GraphNode;

/// Boxed domain error returned by `dependencies` and `visit` callbacks
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Display adapter that formats an ancestor path as "a -> b -> c"
pub struct TraversalPath<'a, N: GraphNode>(pub &'a [N]);

impl<N: GraphNode> fmt::Display for TraversalPath<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for node in self.0 {
            if !first {
                write!(f, " -> ")?;
            }
            write!(f, "{node:?}")?;
            first = false;
        }
        Ok(())
    }
}

/// A single failed `dependencies` or `visit` call.
///
/// Carries the offending node and the active ancestor path alongside the
/// original cause, so consumers can translate the failure back into
/// domain-specific diagnostics.
#[derive(Debug, Error)]
#[error("failed to process node {node:?} (via {})", TraversalPath(.path.as_slice()))]
pub struct TraversalFailure<N: GraphNode> {
    /// Node whose callback failed
    pub node: N,
    /// Ancestor path active when the failure occurred, ending at `node`
    pub path: Vec<N>,
    /// The original error raised by the callback
    #[source]
    pub source: BoxError,
}

/// Unified error type for graph runs
#[derive(Debug, Clone, Error)]
pub enum WalkError<N: GraphNode> {
    /// Configuration error: traversal was requested with no entry nodes
    #[error("graph run requires at least one entry node")]
    EmptyGraph,

    /// A single `dependencies` or `visit` call failed
    #[error("{0}")]
    Traversal(Arc<TraversalFailure<N>>),

    /// Multiple independent failures, in completion order
    #[error("{} node(s) failed during the graph run", .errors.len())]
    Aggregate { errors: Vec<WalkError<N>> },

    /// A cycle was detected but its ancestor path could not be reconstructed.
    ///
    /// This is a defect signal: it cannot occur while the walker's path
    /// bookkeeping is intact, and it is always surfaced rather than skipped.
    #[error("cycle detected at node {node:?} but no traversal path could be reconstructed")]
    PathLost { node: N },
}

impl<N: GraphNode> WalkError<N> {
    /// Wrap a failed callback with the node and path it was invoked for
    pub(crate) fn traversal(node: N, path: Vec<N>, source: BoxError) -> Self {
        Self::Traversal(Arc::new(TraversalFailure { node, path, source }))
    }

    /// Check whether this is the empty-entry-set configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::EmptyGraph)
    }

    /// Check whether this wraps a single failed callback
    pub fn is_traversal(&self) -> bool {
        matches!(self, Self::Traversal(_))
    }

    /// Check whether this aggregates multiple independent failures
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Aggregate { .. })
    }

    /// Check whether this is an engine invariant violation
    pub fn is_invariant(&self) -> bool {
        matches!(self, Self::PathLost { .. })
    }

    /// The wrapped callback failure, if this is a traversal error
    pub fn failure(&self) -> Option<&TraversalFailure<N>> {
        match self {
            Self::Traversal(failure) => Some(failure),
            _ => None,
        }
    }

    /// The collected failures, if this is a composite error
    pub fn failures(&self) -> Option<&[WalkError<N>]> {
        match self {
            Self::Aggregate { errors } => Some(errors),
            _ => None,
        }
    }

    /// The node a traversal or invariant error is attached to
    pub fn failing_node(&self) -> Option<&N> {
        match self {
            Self::Traversal(failure) => Some(&failure.node),
            Self::PathLost { node } => Some(node),
            _ => None,
        }
    }

    /// The original domain error raised by the failing callback
    pub fn original(&self) -> Option<&(dyn Error + 'static)> {
        self.failure().map(|failure| failure.source.as_ref() as &(dyn Error + 'static))
    }
}

/// Recognize an engine error behind a `dyn Error` reference.
///
/// Returns `Some` when the error originated in the graph engine itself, as
/// opposed to a domain error raised inside a `visit` callback. Domain causes
/// remain reachable through [`WalkError::original`].
pub fn engine_error<'a, N: GraphNode>(err: &'a (dyn Error + 'static)) -> Option<&'a WalkError<N>> {
    err.downcast_ref::<WalkError<N>>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glorp() -> BoxError {
        "glorp".into()
    }

    #[test]
    fn test_traversal_error_carries_node_and_path() {
        let err = WalkError::traversal("b", vec!["a", "b"], glorp());
        assert!(err.is_traversal());
        assert_eq!(err.failing_node(), Some(&"b"));
        assert_eq!(err.failure().unwrap().path, vec!["a", "b"]);
        assert_eq!(err.original().unwrap().to_string(), "glorp");
    }

    #[test]
    fn test_error_categories_are_disjoint() {
        let config: WalkError<&str> = WalkError::EmptyGraph;
        let traversal = WalkError::traversal("x", vec!["x"], glorp());
        let composite = WalkError::Aggregate { errors: vec![traversal.clone()] };
        let invariant: WalkError<&str> = WalkError::PathLost { node: "x" };

        assert!(config.is_config() && !config.is_traversal());
        assert!(traversal.is_traversal() && !traversal.is_composite());
        assert!(composite.is_composite() && !composite.is_invariant());
        assert!(invariant.is_invariant() && !invariant.is_config());
    }

    #[test]
    fn test_composite_preserves_completion_order() {
        let errors = vec![
            WalkError::traversal("first", vec!["first"], glorp()),
            WalkError::traversal("second", vec!["second"], glorp()),
        ];
        let composite = WalkError::Aggregate { errors };
        let nodes: Vec<_> = composite
            .failures()
            .unwrap()
            .iter()
            .filter_map(WalkError::failing_node)
            .collect();
        assert_eq!(nodes, vec![&"first", &"second"]);
    }

    #[test]
    fn test_engine_error_guard_recognizes_walk_errors() {
        let err: WalkError<&str> = WalkError::EmptyGraph;
        let dynamic: &(dyn Error + 'static) = &err;
        assert!(engine_error::<&str>(dynamic).is_some());

        let domain = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let dynamic: &(dyn Error + 'static) = &domain;
        assert!(engine_error::<&str>(dynamic).is_none());
    }

    #[test]
    fn test_path_display_formats_arrow_chain() {
        let path = vec!["a", "b", "c"];
        assert_eq!(TraversalPath(&path).to_string(), "\"a\" -> \"b\" -> \"c\"");
    }
}
