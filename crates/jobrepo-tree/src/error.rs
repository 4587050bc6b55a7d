use jobrepo_store::StoreError;

/// Errors from tree construction and traversal.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// A change path is malformed or collides with the existing tree shape.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Object store failure, propagated unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> TreeError {
    TreeError::InvalidPath {
        path: path.to_string(),
        reason: reason.into(),
    }
}
