//! Commit orchestration: staged rows -> tree -> commit -> ref -> row states.

use jobrepo_crypto::ContentHasher;
use jobrepo_index::{CommittedTree, JobRows};
use jobrepo_records::{EntityRecord, RecordError, RecordStore, Transaction};
use jobrepo_refs::RefStore;
use jobrepo_store::{Commit, ObjectStore, ObjectStoreExt, Person};
use jobrepo_tree::{PathChange, TreeBuilder};
use jobrepo_types::{EntityId, EntityKind, EntityState, ObjectId, RecordKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{SdkError, SdkResult};

/// Result of a successful commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub commit: ObjectId,
    pub tree: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ObjectId>,
    /// Fully qualified ref that now points at `commit`.
    pub reference: String,
    /// Rows moved from `staged` to `committed`.
    pub committed: Vec<(EntityKind, RecordKey)>,
}

/// One commit in first-parent history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub id: ObjectId,
    pub commit: Commit,
}

/// Tree path of an entity: the collection sits at the root under the job id.
pub fn entity_path(job: &EntityId, kind: EntityKind, id: &EntityId) -> String {
    match kind.tree_dir() {
        Some(dir) => format!("{dir}/{id}"),
        None => job.to_string(),
    }
}

/// Writes one commit for a job and settles the record states.
pub(crate) struct Committer<'a> {
    pub objects: &'a dyn ObjectStore,
    pub refs: &'a dyn RefStore,
    pub records: &'a dyn RecordStore,
}

impl Committer<'_> {
    /// Commit every staged row of `job` onto `reference`.
    ///
    /// The staged set is read once; the tree and the post-commit transition
    /// both use exactly those `(hash, id)` keys. If fewer rows transition
    /// than were committed, the state transaction is rolled back and
    /// `CommitReconciliationFailure` is returned. The commit and ref update
    /// remain in place.
    pub async fn commit(
        &self,
        job: &EntityId,
        reference: &str,
        message: &str,
        author: Person,
    ) -> SdkResult<CommitSummary> {
        let head = self.refs.read_ref(reference).await?;
        let committed = CommittedTree::load(self.objects, job, head.as_ref()).await?;
        let rows = JobRows::load(self.records, job, &committed).await?;

        let staged: Vec<&EntityRecord> = rows.staged().collect();
        if staged.is_empty() {
            return Err(SdkError::NothingToCommit);
        }

        let mut changes = Vec::with_capacity(staged.len() + 3);
        if head.is_none() {
            for kind in EntityKind::ELEMENTS {
                if let Some(dir) = kind.tree_dir() {
                    changes.push(PathChange::dir(dir));
                }
            }
        }
        for row in &staged {
            let json = row.tracked_json()?;
            if ContentHasher::BLOB.hash(json.as_bytes()) != row.hash() {
                return Err(SdkError::InconsistentRepositoryState(format!(
                    "staged {} {} does not match its hash {}",
                    row.kind(),
                    row.id(),
                    row.hash().short_hex()
                )));
            }
            changes.push(PathChange::upsert(entity_path(job, row.kind(), row.id()), json));
        }

        let tree = TreeBuilder::new(self.objects)
            .apply(committed.tree, &changes)
            .await?;
        debug!(job = %job, tree = %tree.short_hex(), paths = changes.len(), "built commit tree");

        let commit = Commit {
            tree,
            parents: head.into_iter().collect(),
            author: author.clone(),
            committer: author,
            message: message.to_string(),
        };
        let id = self.objects.save_as(&commit).await?;
        self.refs.update_ref(reference, &id).await?;
        info!(job = %job, commit = %id.short_hex(), reference, "updated ref");

        let mut tx = Transaction::new();
        let mut keys = Vec::with_capacity(staged.len());
        for row in &staged {
            let kind = row.kind();
            if let Some(old) = rows.get(kind, row.id()).and_then(|v| v.committed.as_ref()) {
                if old.hash() != row.hash() {
                    tx = tx.delete(kind, old.key());
                }
            }
            tx = tx.transition(kind, row.key(), EntityState::Staged, EntityState::Committed);
            keys.push((kind, row.key()));
        }

        match self.records.transaction(tx.expect_transitions(keys.len())).await {
            Ok(outcome) => {
                info!(
                    job = %job,
                    commit = %id.short_hex(),
                    transitioned = outcome.transitioned,
                    pruned = outcome.deleted,
                    "committed job"
                );
            }
            Err(RecordError::AffectedMismatch { expected, actual }) => {
                warn!(job = %job, commit = %id.short_hex(), expected, actual, "staged rows changed during commit");
                return Err(SdkError::CommitReconciliationFailure {
                    commit: id,
                    expected,
                    actual,
                });
            }
            Err(e) => return Err(e.into()),
        }

        Ok(CommitSummary {
            commit: id,
            tree,
            parent: commit.parents.first().copied(),
            reference: reference.to_string(),
            committed: keys,
        })
    }

    /// Settle record states against the tree at `reference`.
    ///
    /// Staged rows whose hash equals their tree entry become `committed`,
    /// replacing older committed rows. Tree entries with no matching row at
    /// all are restored from their blobs. Returns the number of rows touched.
    pub async fn reconcile(&self, job: &EntityId, reference: &str) -> SdkResult<usize> {
        let Some(head) = self.refs.read_ref(reference).await? else {
            return Ok(0);
        };
        let committed = CommittedTree::load(self.objects, job, Some(&head)).await?;
        let rows = JobRows::load(self.records, job, &committed).await?;

        let mut entries: Vec<(EntityKind, EntityId, ObjectId)> = Vec::new();
        if let Some(hash) = committed.get(EntityKind::Collection, job) {
            entries.push((EntityKind::Collection, job.clone(), hash));
        }
        for kind in EntityKind::ELEMENTS {
            entries.extend(committed.entries(kind).map(|(id, hash)| (kind, id.clone(), *hash)));
        }

        let mut tx = Transaction::new();
        let mut transitions = 0;
        let mut missing = Vec::new();
        for (kind, id, hash) in entries {
            let versions = rows.get(kind, &id);
            let committed_row = versions.and_then(|v| v.committed.as_ref());
            if committed_row.is_some_and(|c| c.hash() == hash) {
                continue;
            }
            match versions.and_then(|v| v.staged.as_ref()).filter(|s| s.hash() == hash) {
                Some(staged) => {
                    tx = tx.transition(kind, staged.key(), EntityState::Staged, EntityState::Committed);
                    transitions += 1;
                }
                None => missing.push((kind, id.clone())),
            }
            if let Some(old) = committed_row {
                tx = tx.delete(kind, old.key());
            }
        }

        for (kind, id) in &missing {
            if let Some(record) = committed.read_entity(self.objects, job, *kind, id).await? {
                tx = tx.put(record);
            }
        }

        if tx.is_empty() {
            return Ok(0);
        }
        let outcome = self
            .records
            .transaction(tx.expect_transitions(transitions))
            .await?;
        let touched = outcome.transitioned + outcome.written;
        info!(
            job = %job,
            head = %head.short_hex(),
            transitioned = outcome.transitioned,
            restored = outcome.written,
            "reconciled job"
        );
        Ok(touched)
    }
}
