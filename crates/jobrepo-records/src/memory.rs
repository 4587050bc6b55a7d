use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use jobrepo_types::{EntityId, EntityKind, ObjectId, RecordKey};
use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::entity::EntityRecord;
use crate::error::{RecordError, RecordResult};
use crate::store::{RecordFilter, RecordStore, Transaction, TxOutcome, WriteOp};

type Table = BTreeMap<(EntityId, ObjectId), EntityRecord>;
type Tables = BTreeMap<EntityKind, Table>;

fn row_key(key: &RecordKey) -> (EntityId, ObjectId) {
    (key.id.clone(), key.hash)
}

/// In-memory record store, one `BTreeMap` table per entity kind.
///
/// With a snapshot path, every successful write is mirrored to a JSON file
/// (written to a temp file and renamed) and the file is loaded on open.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
    snapshot: Option<PathBuf>,
}

impl InMemoryRecordStore {
    /// An empty, purely in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store mirrored to the JSON file at `path`, loading it if it exists.
    pub async fn open(path: impl Into<PathBuf>) -> RecordResult<Self> {
        let path = path.into();
        let mut tables = Tables::new();
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let records: Vec<EntityRecord> = serde_json::from_slice(&bytes)?;
                debug!(path = %path.display(), rows = records.len(), "loaded record snapshot");
                for record in records {
                    insert(&mut tables, record);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Self {
            tables: RwLock::new(tables),
            snapshot: Some(path),
        })
    }

    /// Total number of rows across all tables.
    pub async fn len(&self) -> usize {
        self.tables.read().await.values().map(BTreeMap::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self, tables: &Tables) -> RecordResult<()> {
        let Some(path) = self.snapshot.clone() else {
            return Ok(());
        };
        let records: Vec<&EntityRecord> = tables.values().flat_map(BTreeMap::values).collect();
        let bytes = serde_json::to_vec_pretty(&records)?;
        tokio::task::spawn_blocking(move || write_snapshot(&path, &bytes))
            .await
            .map_err(std::io::Error::other)??;
        Ok(())
    }
}

fn write_snapshot(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn insert(tables: &mut Tables, record: EntityRecord) -> Option<EntityRecord> {
    let key = row_key(&record.key());
    tables.entry(record.kind()).or_default().insert(key, record)
}

fn contains(tables: &Tables, record: &EntityRecord) -> bool {
    tables
        .get(&record.kind())
        .is_some_and(|t| t.contains_key(&row_key(&record.key())))
}

fn apply(tables: &mut Tables, tx: Transaction) -> RecordResult<TxOutcome> {
    let mut outcome = TxOutcome::default();
    for op in tx.ops {
        match op {
            WriteOp::Put(record) => {
                insert(tables, record);
                outcome.written += 1;
            }
            WriteOp::Delete { kind, key } => {
                if let Some(table) = tables.get_mut(&kind) {
                    if table.remove(&row_key(&key)).is_some() {
                        outcome.deleted += 1;
                    }
                }
            }
            WriteOp::Transition { kind, key, from, to } => {
                let row = tables
                    .get_mut(&kind)
                    .and_then(|t| t.get_mut(&row_key(&key)));
                match row {
                    Some(record) if record.state() == from => {
                        record.set_state(to);
                        outcome.transitioned += 1;
                    }
                    _ => debug!(%kind, %key, %from, "transition did not match a row"),
                }
            }
        }
    }
    if let Some(expected) = tx.expect_transitions {
        if expected != outcome.transitioned {
            return Err(RecordError::AffectedMismatch {
                expected,
                actual: outcome.transitioned,
            });
        }
    }
    Ok(outcome)
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, kind: EntityKind, key: &RecordKey) -> RecordResult<Option<EntityRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.get(&kind).and_then(|t| t.get(&row_key(key))).cloned())
    }

    async fn query(
        &self,
        kind: EntityKind,
        filter: &RecordFilter,
    ) -> RecordResult<Vec<EntityRecord>> {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(&kind) else {
            return Ok(Vec::new());
        };
        let rows: Vec<EntityRecord> = match &filter.id {
            // Rows are ordered by id first, so an id filter is a range scan.
            Some(id) => table
                .range((id.clone(), ObjectId::null())..)
                .take_while(|((row_id, _), _)| row_id == id)
                .map(|(_, r)| r)
                .filter(|r| filter.matches(r))
                .cloned()
                .collect(),
            None => table.values().filter(|r| filter.matches(r)).cloned().collect(),
        };
        Ok(rows)
    }

    async fn add(&self, record: EntityRecord) -> RecordResult<()> {
        self.bulk_add(vec![record]).await
    }

    async fn bulk_add(&self, records: Vec<EntityRecord>) -> RecordResult<()> {
        let mut tables = self.tables.write().await;
        let mut next = tables.clone();
        for record in records {
            if contains(&next, &record) {
                return Err(RecordError::AlreadyExists {
                    kind: record.kind(),
                    key: record.key().to_string(),
                });
            }
            insert(&mut next, record);
        }
        self.persist(&next).await?;
        *tables = next;
        Ok(())
    }

    async fn put(&self, record: EntityRecord) -> RecordResult<()> {
        self.transaction(Transaction::new().put(record)).await.map(|_| ())
    }

    async fn transaction(&self, tx: Transaction) -> RecordResult<TxOutcome> {
        let mut tables = self.tables.write().await;
        let mut next = tables.clone();
        let outcome = match apply(&mut next, tx) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "transaction rolled back");
                return Err(e);
            }
        };
        self.persist(&next).await?;
        *tables = next;
        debug!(
            written = outcome.written,
            deleted = outcome.deleted,
            transitioned = outcome.transitioned,
            "transaction committed"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, Folder};
    use jobrepo_types::EntityState;

    fn folder(id: &str, name: &str) -> Folder {
        let mut f = Folder::new(EntityId::from("job"), name, "phase", None);
        f.id = EntityId::from(id);
        f.rehash().unwrap();
        f
    }

    #[tokio::test]
    async fn put_and_get_by_key() {
        let store = InMemoryRecordStore::new();
        let f = folder("f1", "a");
        store.put(f.clone().into_record()).await.unwrap();
        let got = store.get(EntityKind::Folder, &f.key()).await.unwrap();
        assert_eq!(got, Some(f.into_record()));
        assert!(store
            .get(EntityKind::Component, &folder("f1", "a").key())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn versions_coexist_under_one_id() {
        let store = InMemoryRecordStore::new();
        store.put(folder("f1", "a").into_record()).await.unwrap();
        store.put(folder("f1", "b").into_record()).await.unwrap();
        store.put(folder("f2", "a").into_record()).await.unwrap();
        let versions = store.versions(EntityKind::Folder, &EntityId::from("f1")).await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn add_rejects_existing_key() {
        let store = InMemoryRecordStore::new();
        store.add(folder("f1", "a").into_record()).await.unwrap();
        let err = store.add(folder("f1", "a").into_record()).await.unwrap_err();
        assert!(matches!(err, RecordError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn bulk_add_is_all_or_nothing() {
        let store = InMemoryRecordStore::new();
        store.add(folder("f1", "a").into_record()).await.unwrap();
        let err = store
            .bulk_add(vec![folder("f2", "x").into_record(), folder("f1", "a").into_record()])
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::AlreadyExists { .. }));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn query_filters_by_state_and_parent() {
        let store = InMemoryRecordStore::new();
        let root = folder("root", "r");
        let mut child = folder("child", "c");
        child.parent = Some(root.id.clone());
        child.state = EntityState::Staged;
        child.rehash().unwrap();
        store
            .bulk_add(vec![root.into_record(), child.into_record()])
            .await
            .unwrap();

        let job = EntityId::from("job");
        let staged = store
            .query(EntityKind::Folder, &RecordFilter::job(&job).with_state(EntityState::Staged))
            .await
            .unwrap();
        assert_eq!(staged.len(), 1);
        let children = store
            .query(EntityKind::Folder, &RecordFilter::default().with_parent(&EntityId::from("root")))
            .await
            .unwrap();
        assert_eq!(children[0].id(), &EntityId::from("child"));
    }

    #[tokio::test]
    async fn transition_count_mismatch_rolls_back() {
        let store = InMemoryRecordStore::new();
        let a = folder("a", "a");
        let b = folder("b", "b");
        store
            .bulk_add(vec![a.clone().into_record(), b.clone().into_record()])
            .await
            .unwrap();

        let missing = folder("c", "c");
        let tx = Transaction::new()
            .transition(EntityKind::Folder, a.key(), EntityState::Unstaged, EntityState::Staged)
            .transition(EntityKind::Folder, missing.key(), EntityState::Unstaged, EntityState::Staged)
            .expect_transitions(2);
        let err = store.transaction(tx).await.unwrap_err();
        assert!(matches!(err, RecordError::AffectedMismatch { expected: 2, actual: 1 }));

        let row = store.get(EntityKind::Folder, &a.key()).await.unwrap().unwrap();
        assert_eq!(row.state(), EntityState::Unstaged);
    }

    #[tokio::test]
    async fn transition_requires_matching_state() {
        let store = InMemoryRecordStore::new();
        let a = folder("a", "a");
        store.add(a.clone().into_record()).await.unwrap();
        let outcome = store
            .transaction(Transaction::new().transition(
                EntityKind::Folder,
                a.key(),
                EntityState::Staged,
                EntityState::Committed,
            ))
            .await
            .unwrap();
        assert_eq!(outcome.transitioned, 0);
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        {
            let store = InMemoryRecordStore::open(&path).await.unwrap();
            store.put(folder("f1", "a").into_record()).await.unwrap();
            store
                .transaction(Transaction::new().delete(EntityKind::Folder, folder("zz", "z").key()))
                .await
                .unwrap();
        }
        let reopened = InMemoryRecordStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 1);
        assert_eq!(
            reopened.versions(EntityKind::Folder, &EntityId::from("f1")).await.unwrap().len(),
            1
        );
    }
}
