//! A job's record-store rows grouped by table, id and state.

use std::collections::BTreeMap;

use jobrepo_records::{Collection, EntityRecord, Folder, RecordFilter, RecordStore};
use jobrepo_types::{EntityId, EntityKind, EntityState};
use tracing::warn;

use crate::committed::CommittedTree;
use crate::error::{StatusError, StatusResult};

/// The rows of one entity id, at most one per state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Versions {
    pub unstaged: Option<EntityRecord>,
    pub staged: Option<EntityRecord>,
    pub committed: Option<EntityRecord>,
}

impl Versions {
    /// Working copy, else staged, else committed.
    pub fn current(&self) -> Option<&EntityRecord> {
        self.unstaged
            .as_ref()
            .or(self.staged.as_ref())
            .or(self.committed.as_ref())
    }
}

/// Every row of one job, grouped per table and id.
#[derive(Clone, Debug, Default)]
pub struct JobRows {
    tables: BTreeMap<EntityKind, BTreeMap<EntityId, Versions>>,
}

impl JobRows {
    /// Read all rows of `job`.
    ///
    /// Two staged rows with one id abort with `DuplicateStagedElement`. When
    /// several committed rows share an id, the one matching `committed` wins.
    pub async fn load<R: RecordStore + ?Sized>(
        records: &R,
        job: &EntityId,
        committed: &CommittedTree,
    ) -> StatusResult<Self> {
        let mut tables = BTreeMap::new();
        for kind in EntityKind::ALL {
            let mut table: BTreeMap<EntityId, Versions> = BTreeMap::new();
            for row in records.query(kind, &RecordFilter::job(job)).await? {
                let id = row.id().clone();
                let slot = table.entry(id.clone()).or_default();
                match row.state() {
                    EntityState::Staged => {
                        if slot.staged.is_some() {
                            return Err(StatusError::DuplicateStagedElement { kind, id });
                        }
                        slot.staged = Some(row);
                    }
                    EntityState::Unstaged => {
                        if slot.unstaged.is_some() {
                            warn!(%kind, %id, "more than one working copy, keeping the first");
                            continue;
                        }
                        slot.unstaged = Some(row);
                    }
                    EntityState::Committed => {
                        let in_tree = committed.get(kind, &id) == Some(row.hash());
                        if slot.committed.is_none() || in_tree {
                            slot.committed = Some(row);
                        }
                    }
                }
            }
            tables.insert(kind, table);
        }
        Ok(Self { tables })
    }

    /// Rows of one table, ordered by id.
    pub fn table(&self, kind: EntityKind) -> impl Iterator<Item = (&EntityId, &Versions)> {
        self.tables.get(&kind).into_iter().flatten()
    }

    pub fn get(&self, kind: EntityKind, id: &EntityId) -> Option<&Versions> {
        self.tables.get(&kind).and_then(|t| t.get(id))
    }

    /// Every staged row of the job, collection first.
    pub fn staged(&self) -> impl Iterator<Item = &EntityRecord> {
        EntityKind::ALL
            .into_iter()
            .flat_map(|k| self.table(k))
            .filter_map(|(_, v)| v.staged.as_ref())
    }

    /// The current version of the job's collection.
    pub fn current_collection(&self) -> Option<&Collection> {
        self.table(EntityKind::Collection)
            .find_map(|(_, v)| match v.current() {
                Some(EntityRecord::Collection(c)) => Some(c),
                _ => None,
            })
    }

    /// The current version of every folder.
    pub fn current_folders(&self) -> Vec<&Folder> {
        self.table(EntityKind::Folder)
            .filter_map(|(_, v)| match v.current() {
                Some(EntityRecord::Folder(f)) => Some(f),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobrepo_records::{Entity, InMemoryRecordStore, Transaction};

    fn folder(id: &str, name: &str, state: EntityState) -> EntityRecord {
        let mut f = Folder::new(EntityId::from("job"), name, "phase", None);
        f.id = EntityId::from(id);
        f.state = state;
        f.rehash().unwrap();
        f.into_record()
    }

    #[tokio::test]
    async fn groups_rows_by_state() {
        let store = InMemoryRecordStore::new();
        store
            .transaction(
                Transaction::new()
                    .put(folder("a", "v1", EntityState::Committed))
                    .put(folder("a", "v2", EntityState::Staged))
                    .put(folder("a", "v3", EntityState::Unstaged))
                    .put(folder("b", "v1", EntityState::Committed)),
            )
            .await
            .unwrap();

        let rows = JobRows::load(&store, &EntityId::from("job"), &CommittedTree::default())
            .await
            .unwrap();
        let a = rows.get(EntityKind::Folder, &EntityId::from("a")).unwrap();
        assert!(a.staged.is_some() && a.committed.is_some());
        match a.current() {
            Some(EntityRecord::Folder(f)) => assert_eq!(f.name, "v3"),
            other => panic!("unexpected current {other:?}"),
        }
        assert_eq!(rows.staged().count(), 1);
        assert_eq!(rows.current_folders().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_staged_rows_abort() {
        let store = InMemoryRecordStore::new();
        store
            .transaction(
                Transaction::new()
                    .put(folder("a", "v1", EntityState::Staged))
                    .put(folder("a", "v2", EntityState::Staged)),
            )
            .await
            .unwrap();

        let err = JobRows::load(&store, &EntityId::from("job"), &CommittedTree::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StatusError::DuplicateStagedElement { kind: EntityKind::Folder, .. }
        ));
    }
}
