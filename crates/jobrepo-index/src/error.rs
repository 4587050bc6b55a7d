//! Error types for status computation.

use jobrepo_types::{EntityId, EntityKind};

/// Errors that can occur while comparing a job against its history.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    /// More than one staged row shares an id within one table of a job.
    #[error("more than one staged {kind} with id {id}")]
    DuplicateStagedElement { kind: EntityKind, id: EntityId },

    /// The head commit, or a tree or blob it references, cannot be loaded.
    #[error("inconsistent repository state for job {job}: {reason}")]
    InconsistentRepositoryState { job: EntityId, reason: String },

    /// Parent pointers form a cycle or a root id is malformed.
    #[error("hierarchy error: {0}")]
    Dag(#[from] jobrepo_dag::DagError),

    #[error("record store error: {0}")]
    Record(#[from] jobrepo_records::RecordError),

    #[error("store error: {0}")]
    Store(#[from] jobrepo_store::StoreError),

    #[error("tree error: {0}")]
    Tree(#[from] jobrepo_tree::TreeError),

    #[error("diff error: {0}")]
    Diff(#[from] jobrepo_diff::DiffError),
}

/// Convenience alias for status results.
pub type StatusResult<T> = Result<T, StatusError>;
