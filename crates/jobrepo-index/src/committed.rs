//! The committed view of a job: entity ids and hashes read from a head commit.

use std::collections::BTreeMap;

use jobrepo_records::EntityRecord;
use jobrepo_store::{Blob, Commit, ObjectBody, ObjectStore, ObjectStoreExt};
use jobrepo_tree::list_dir;
use jobrepo_types::{EntityId, EntityKind, ObjectId};
use tracing::debug;

use crate::error::{StatusError, StatusResult};

/// Entry ids of one job's entities in a committed tree.
///
/// Because an entity hash is the blob id of its tracked JSON, the entry id
/// stored here compares directly with a record's `hash`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommittedTree {
    pub commit: Option<ObjectId>,
    pub tree: Option<ObjectId>,
    collection: Option<ObjectId>,
    tables: BTreeMap<EntityKind, BTreeMap<EntityId, ObjectId>>,
}

impl CommittedTree {
    /// Read the committed view from `head`. With no head the view is empty.
    ///
    /// An unloadable commit, tree or table is an inconsistency, never an
    /// empty history.
    pub async fn load<S: ObjectStore + ?Sized>(
        store: &S,
        job: &EntityId,
        head: Option<&ObjectId>,
    ) -> StatusResult<Self> {
        let Some(head) = head else {
            return Ok(Self::default());
        };
        let inconsistent = |reason: String| StatusError::InconsistentRepositoryState {
            job: job.clone(),
            reason,
        };

        let commit: Commit = store
            .load_as(head)
            .await
            .map_err(|e| inconsistent(format!("head commit {head}: {e}")))?;
        let root = list_dir(store, &commit.tree, "")
            .await
            .map_err(|e| inconsistent(format!("tree {}: {e}", commit.tree)))?
            .ok_or_else(|| inconsistent(format!("tree {} missing", commit.tree)))?;

        let collection = root
            .get(job.as_str())
            .filter(|e| !e.mode.is_tree())
            .map(|e| e.object_id);

        let mut tables = BTreeMap::new();
        for kind in EntityKind::ELEMENTS {
            let Some(dir) = kind.tree_dir() else { continue };
            let listing = list_dir(store, &commit.tree, dir)
                .await
                .map_err(|e| inconsistent(format!("{dir} subtree: {e}")))?;
            let entries = listing
                .map(|tree| {
                    tree.entries
                        .into_iter()
                        .filter(|e| !e.mode.is_tree())
                        .map(|e| (EntityId::new(e.name), e.object_id))
                        .collect()
                })
                .unwrap_or_default();
            tables.insert(kind, entries);
        }

        debug!(
            job = %job,
            commit = %head.short_hex(),
            tree = %commit.tree.short_hex(),
            entities = tables.values().map(BTreeMap::len).sum::<usize>(),
            "loaded committed view"
        );
        Ok(Self {
            commit: Some(*head),
            tree: Some(commit.tree),
            collection,
            tables,
        })
    }

    /// Committed entry id of one entity, if the tree holds it.
    pub fn get(&self, kind: EntityKind, id: &EntityId) -> Option<ObjectId> {
        match kind {
            EntityKind::Collection => self.collection,
            _ => self.tables.get(&kind).and_then(|t| t.get(id)).copied(),
        }
    }

    /// Every committed `(id, entry id)` of one element table.
    pub fn entries(&self, kind: EntityKind) -> impl Iterator<Item = (&EntityId, &ObjectId)> {
        self.tables.get(&kind).into_iter().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_none() && self.tables.values().all(BTreeMap::is_empty)
    }

    /// Fetch committed JSON bodies for many entities in one batch.
    pub async fn load_bodies<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        job: &EntityId,
        wanted: &[(EntityKind, EntityId)],
    ) -> StatusResult<BTreeMap<(EntityKind, EntityId), Vec<u8>>> {
        let present: Vec<(EntityKind, EntityId, ObjectId)> = wanted
            .iter()
            .filter_map(|(kind, id)| self.get(*kind, id).map(|oid| (*kind, id.clone(), oid)))
            .collect();
        let ids: Vec<ObjectId> = present.iter().map(|(_, _, oid)| *oid).collect();
        let objects = store.load_many_raw(&ids).await.map_err(|e| {
            StatusError::InconsistentRepositoryState {
                job: job.clone(),
                reason: format!("committed entity blob: {e}"),
            }
        })?;

        let mut bodies = BTreeMap::new();
        for ((kind, id, _), (_, object)) in present.into_iter().zip(objects) {
            let blob = Blob::from_stored_object(&object)?;
            bodies.insert((kind, id), blob.data);
        }
        Ok(bodies)
    }

    /// Rebuild the committed record of one entity.
    pub async fn read_entity<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        job: &EntityId,
        kind: EntityKind,
        id: &EntityId,
    ) -> StatusResult<Option<EntityRecord>> {
        let Some(hash) = self.get(kind, id) else {
            return Ok(None);
        };
        let mut bodies = self.load_bodies(store, job, &[(kind, id.clone())]).await?;
        let Some(body) = bodies.remove(&(kind, id.clone())) else {
            return Ok(None);
        };
        Ok(Some(EntityRecord::from_tracked(kind, id, hash, &body)?))
    }
}
