//! Error types for the diff crate.

use jobrepo_types::ObjectId;

/// Errors that can occur during diff operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// The object had an unexpected kind (e.g., expected commit, got tree).
    #[error("object {id} is not a {expected}")]
    UnexpectedObjectKind { id: ObjectId, expected: &'static str },

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] jobrepo_store::StoreError),

    /// Walking a tree failed.
    #[error("tree error: {0}")]
    Tree(#[from] jobrepo_tree::TreeError),

    /// Entity content was not valid JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
