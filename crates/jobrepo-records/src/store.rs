//! The record store seam.
//!
//! Entity rows live in an external keyed-record database. Each
//! [`EntityKind`] names one table; rows are keyed by `(hash, id)` so several
//! versions of one entity can coexist.

use async_trait::async_trait;
use jobrepo_types::{EntityId, EntityKind, EntityState, RecordKey};

use crate::entity::EntityRecord;
use crate::error::RecordResult;

/// Row predicate for [`RecordStore::query`]. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub job: Option<EntityId>,
    pub id: Option<EntityId>,
    pub state: Option<EntityState>,
    pub parent: Option<EntityId>,
}

impl RecordFilter {
    /// Every row of one job.
    pub fn job(job: &EntityId) -> Self {
        Self {
            job: Some(job.clone()),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: &EntityId) -> Self {
        self.id = Some(id.clone());
        self
    }

    pub fn with_state(mut self, state: EntityState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_parent(mut self, parent: &EntityId) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn matches(&self, record: &EntityRecord) -> bool {
        self.job.as_ref().map_or(true, |j| record.job() == j)
            && self.id.as_ref().map_or(true, |i| record.id() == i)
            && self.state.map_or(true, |s| record.state() == s)
            && self
                .parent
                .as_ref()
                .map_or(true, |p| record.parent() == Some(p))
    }
}

/// One write inside a [`Transaction`].
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    /// Upsert by `(hash, id)`.
    Put(EntityRecord),
    /// Remove the row with this key, if present.
    Delete { kind: EntityKind, key: RecordKey },
    /// Move the row with this key from `from` to `to`. Counts as affected
    /// only when the row exists and is currently in `from`.
    Transition {
        kind: EntityKind,
        key: RecordKey,
        from: EntityState,
        to: EntityState,
    },
}

/// An all-or-nothing batch of writes across tables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transaction {
    pub ops: Vec<WriteOp>,
    /// When set, the batch is rolled back unless exactly this many
    /// `Transition` ops matched their row.
    pub expect_transitions: Option<usize>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, record: EntityRecord) -> Self {
        self.ops.push(WriteOp::Put(record));
        self
    }

    pub fn delete(mut self, kind: EntityKind, key: RecordKey) -> Self {
        self.ops.push(WriteOp::Delete { kind, key });
        self
    }

    pub fn transition(
        mut self,
        kind: EntityKind,
        key: RecordKey,
        from: EntityState,
        to: EntityState,
    ) -> Self {
        self.ops.push(WriteOp::Transition { kind, key, from, to });
        self
    }

    pub fn expect_transitions(mut self, count: usize) -> Self {
        self.expect_transitions = Some(count);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Counts reported by a committed transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxOutcome {
    pub written: usize,
    pub deleted: usize,
    pub transitioned: usize,
}

/// Keyed-record database holding one table per [`EntityKind`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch one row by key.
    async fn get(&self, kind: EntityKind, key: &RecordKey) -> RecordResult<Option<EntityRecord>>;

    /// All rows of a table matching `filter`, ordered by `(id, hash)`.
    async fn query(&self, kind: EntityKind, filter: &RecordFilter)
        -> RecordResult<Vec<EntityRecord>>;

    /// Insert a new row; fails if the key already exists.
    async fn add(&self, record: EntityRecord) -> RecordResult<()>;

    /// Insert many new rows atomically; fails without writing if any key exists.
    async fn bulk_add(&self, records: Vec<EntityRecord>) -> RecordResult<()>;

    /// Upsert one row by key.
    async fn put(&self, record: EntityRecord) -> RecordResult<()>;

    /// Apply a batch atomically across tables.
    async fn transaction(&self, tx: Transaction) -> RecordResult<TxOutcome>;

    /// Every stored version of one entity id.
    async fn versions(&self, kind: EntityKind, id: &EntityId) -> RecordResult<Vec<EntityRecord>> {
        self.query(kind, &RecordFilter::default().with_id(id)).await
    }
}
