//! Error types for hierarchy traversal.

use jobrepo_types::EntityId;

/// Errors that can occur during descendant traversal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DagError {
    /// A root id of an unsupported shape was passed to a traversal.
    #[error("invalid root id: {0:?}")]
    InvalidRootId(String),

    /// A parent/child loop: the node was reached a second time.
    #[error("cycle detected involving node {0}")]
    CycleDetected(EntityId),

    /// Two documents with the same id were indexed.
    #[error("duplicate node: {0}")]
    DuplicateNode(EntityId),
}

/// Convenience alias for DAG results.
pub type DagResult<T> = Result<T, DagError>;
