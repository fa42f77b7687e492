//! Tree errors

use shade_backend::BackendError;

use crate::context::ErrorOrigin;
use crate::definition::Lifetime;
use crate::node::NodeType;
use crate::NodeId;

/// Result type for tree operations
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors raised by tree operations
///
/// Structural and lifecycle errors are caller bugs and are always returned.
/// User-code errors only surface as [`TreeError::UserCode`] when the global
/// context is configured to rethrow them.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("node {0:?} has been released")]
    DoubleRelease(NodeId),

    #[error("node {node:?} is a {actual:?}, expected {expected}")]
    WrongNodeKind {
        node: NodeId,
        expected: &'static str,
        actual: NodeType,
    },

    #[error("node {child:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, child: NodeId },

    #[error("index hint {hint} does not match actual position {actual}")]
    IndexMismatch { hint: usize, actual: usize },

    #[error("range {start}+{count} out of bounds for {len} children")]
    IndexOutOfRange {
        start: usize,
        count: usize,
        len: usize,
    },

    #[error("fragment {0:?} must not have a parent")]
    FragmentHasParent(NodeId),

    #[error("cannot insert {child:?} into {parent:?}")]
    HierarchyRequest { parent: NodeId, child: NodeId },

    #[error("node {child:?} belongs to another shadow tree than {parent:?}")]
    ShadowScopeMismatch { parent: NodeId, child: NodeId },

    #[error("node {0:?} is still part of a tree")]
    StillInTree(NodeId),

    #[error("backend element of node {0:?} has been destroyed")]
    BackendElementDestroyed(NodeId),

    #[error("tree has no backend context")]
    NoBackend,

    #[error("node {0:?} has no backend element in this backend mode")]
    NoBackendElement(NodeId),

    #[error("relation `{0}` declared twice")]
    RelationDeclaredTwice(String),

    #[error(
        "cannot change {requested:?} listeners of {node:?} while its {executing:?} lifetime runs"
    )]
    ListenerPhaseConflict {
        node: NodeId,
        executing: Lifetime,
        requested: Lifetime,
    },

    #[error("mutation observer must watch at least one kind of change")]
    EmptyObserverOptions,

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("{origin}: {error}")]
    UserCode {
        origin: ErrorOrigin,
        error: anyhow::Error,
    },
}

impl TreeError {
    /// Whether this error was raised by user code rather than the tree
    pub fn is_user_code(&self) -> bool {
        matches!(self, Self::UserCode { .. })
    }
}

/// First user-code error of a traversal that has to run to the end
#[derive(Debug, Default)]
pub(crate) struct DeferredError(Option<TreeError>);

impl DeferredError {
    /// Keep a user-code error for later; tree errors pass through
    pub(crate) fn check(&mut self, result: TreeResult<()>) -> TreeResult<()> {
        match result {
            Err(error) if error.is_user_code() => {
                if self.0.is_none() {
                    self.0 = Some(error);
                }
                Ok(())
            }
            other => other,
        }
    }

    pub(crate) fn finish(self) -> TreeResult<()> {
        self.0.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let id = NodeId {
            index: 3,
            generation: 1,
        };
        let err = TreeError::WrongNodeKind {
            node: id,
            expected: "component",
            actual: NodeType::TextNode,
        };
        assert!(err.to_string().contains("TextNode"));
        assert!(err.to_string().contains("expected component"));

        let err: TreeError = BackendError::Destroyed.into();
        assert!(matches!(err, TreeError::Backend(BackendError::Destroyed)));
        assert!(!err.is_user_code());
    }
}
