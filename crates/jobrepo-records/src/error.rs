use jobrepo_crypto::CanonicalError;
use jobrepo_types::{EntityId, EntityKind};

/// Errors from entity handling and the record store.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The entity failed its validity predicate and was not saved.
    #[error("invalid {kind} {id}: {reason}")]
    InvalidEntity {
        kind: EntityKind,
        id: EntityId,
        reason: String,
    },

    /// No record with this id exists in the table.
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: EntityId },

    /// `add` was called for a `(hash, id)` key that already exists.
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: EntityKind, key: String },

    /// A record was routed to the table of another kind.
    #[error("record of kind {actual} cannot be stored as {expected}")]
    KindMismatch {
        expected: EntityKind,
        actual: EntityKind,
    },

    /// A transaction transitioned a different number of rows than expected
    /// and was rolled back.
    #[error("transaction expected {expected} state transitions, matched {actual}")]
    AffectedMismatch { expected: usize, actual: usize },

    /// Canonical encoding of a tracked entity failed.
    #[error(transparent)]
    Canonical(#[from] CanonicalError),

    /// JSON (de)serialization of records or snapshots failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error while persisting a snapshot.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for record operations.
pub type RecordResult<T> = Result<T, RecordError>;

pub(crate) fn invalid<E: crate::entity::Entity>(entity: &E, reason: impl Into<String>) -> RecordError {
    RecordError::InvalidEntity {
        kind: E::KIND,
        id: crate::entity::Entity::id(entity).clone(),
        reason: reason.into(),
    }
}
