//! Three-way status computation.

use jobrepo_diff::diff_json;
use jobrepo_records::{EntityRecord, RecordStore};
use jobrepo_store::ObjectStore;
use jobrepo_types::{EntityId, EntityKind, ObjectId};
use serde_json::Value;
use tracing::{debug, info};

use crate::committed::CommittedTree;
use crate::containment::Containment;
use crate::error::StatusResult;
use crate::rows::{JobRows, Versions};
use crate::status::{Change, EntityStatus, JobStatus, Version};

/// Which views a status report covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusOptions {
    pub staged: bool,
    pub unstaged: bool,
    /// Attach a field-level diff against the committed version.
    pub diff: bool,
}

impl StatusOptions {
    pub const STAGED: Self = Self {
        staged: true,
        unstaged: false,
        diff: false,
    };
    pub const WORKING: Self = Self {
        staged: false,
        unstaged: true,
        diff: false,
    };
    pub const ALL: Self = Self {
        staged: true,
        unstaged: true,
        diff: false,
    };

    pub fn with_diff(mut self) -> Self {
        self.diff = true;
        self
    }
}

/// Compares a job's staged and working rows against a committed tree.
pub struct StatusEngine<'a> {
    objects: &'a dyn ObjectStore,
    records: &'a dyn RecordStore,
}

impl<'a> StatusEngine<'a> {
    pub fn new(objects: &'a dyn ObjectStore, records: &'a dyn RecordStore) -> Self {
        Self { objects, records }
    }

    /// Report every staged and/or working entity of `job` against `head`.
    ///
    /// Entities with neither a staged nor a working row in scope are left
    /// out; `None` for `head` means nothing has been committed yet.
    pub async fn status(
        &self,
        job: &EntityId,
        head: Option<&ObjectId>,
        options: StatusOptions,
    ) -> StatusResult<JobStatus> {
        let committed = CommittedTree::load(self.objects, job, head).await?;
        let rows = JobRows::load(self.records, job, &committed).await?;
        let containment = Containment::resolve(rows.current_collection(), &rows.current_folders())?;

        let mut report = JobStatus::new(job.clone(), committed.commit);
        for kind in EntityKind::ALL {
            for (id, versions) in rows.table(kind) {
                if let Some(status) = entity_status(kind, id, versions, &committed, &containment, options) {
                    report.table_mut(kind).push(status);
                }
            }
        }

        if options.diff {
            self.attach_diffs(job, &committed, &rows, &mut report, options).await?;
        }

        info!(
            job = %job,
            head = ?committed.commit.map(|c| c.short_hex()),
            entries = report.len(),
            clean = report.is_clean(),
            "computed status"
        );
        Ok(report)
    }

    async fn attach_diffs(
        &self,
        job: &EntityId,
        committed: &CommittedTree,
        rows: &JobRows,
        report: &mut JobStatus,
        options: StatusOptions,
    ) -> StatusResult<()> {
        let wanted: Vec<(EntityKind, EntityId)> = report
            .iter()
            .filter(|s| s.committed.is_some())
            .map(|s| (s.kind, s.id.clone()))
            .collect();
        let bodies = committed.load_bodies(self.objects, job, &wanted).await?;
        debug!(job = %job, fetched = bodies.len(), "loaded committed bodies for diff");

        for kind in EntityKind::ALL {
            for status in report.table_mut(kind) {
                let Some(newest) = rows.get(kind, &status.id).and_then(|v| newest_in_scope(v, options)) else {
                    continue;
                };
                let old: Value = match bodies.get(&(kind, status.id.clone())) {
                    Some(body) => serde_json::from_slice(body).map_err(jobrepo_diff::DiffError::from)?,
                    None => Value::Object(Default::default()),
                };
                let new: Value = serde_json::from_str(&newest.tracked_json()?)
                    .map_err(jobrepo_diff::DiffError::from)?;
                status.diff = Some(diff_json(&old, &new));
            }
        }
        Ok(())
    }
}

fn newest_in_scope(versions: &Versions, options: StatusOptions) -> Option<&EntityRecord> {
    let unstaged = versions.unstaged.as_ref().filter(|_| options.unstaged);
    let staged = versions.staged.as_ref().filter(|_| options.staged);
    unstaged.or(staged)
}

fn entity_status(
    kind: EntityKind,
    id: &EntityId,
    versions: &Versions,
    committed: &CommittedTree,
    containment: &Containment,
    options: StatusOptions,
) -> Option<EntityStatus> {
    let committed_id = committed.get(kind, id);
    let version = |row: &EntityRecord| Version {
        hash: row.hash(),
        change: Change::classify(&row.hash(), committed_id.as_ref()),
    };
    let staged = versions.staged.as_ref().filter(|_| options.staged).map(version);
    let unstaged = versions.unstaged.as_ref().filter(|_| options.unstaged).map(version);
    if staged.is_none() && unstaged.is_none() {
        return None;
    }
    let attached = versions
        .current()
        .is_some_and(|row| containment.is_attached(row));
    Some(EntityStatus {
        id: id.clone(),
        kind,
        staged,
        unstaged,
        committed: committed_id,
        attached,
        diff: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobrepo_diff::FieldChange;
    use jobrepo_records::{Component, Entity, InMemoryRecordStore, Workspace};
    use jobrepo_store::{Commit, InMemoryObjectStore, ObjectStoreExt, Person};
    use jobrepo_tree::{PathChange, TreeBuilder};
    use std::sync::Arc;

    struct Harness {
        objects: InMemoryObjectStore,
        records: Arc<InMemoryRecordStore>,
        ws: Workspace,
    }

    impl Harness {
        fn new() -> Self {
            let records = Arc::new(InMemoryRecordStore::new());
            Self {
                objects: InMemoryObjectStore::new(),
                ws: Workspace::new(records.clone()),
                records,
            }
        }

        fn engine(&self) -> StatusEngine<'_> {
            StatusEngine::new(&self.objects, self.records.as_ref())
        }

        /// Commit the given records verbatim, the way the orchestrator lays them out.
        async fn commit(&self, job: &EntityId, rows: &[EntityRecord]) -> ObjectId {
            let mut changes = vec![
                PathChange::dir("folders"),
                PathChange::dir("components"),
                PathChange::dir("instances"),
            ];
            for row in rows {
                let path = match row.kind().tree_dir() {
                    Some(dir) => format!("{dir}/{}", row.id()),
                    None => job.to_string(),
                };
                changes.push(PathChange::upsert(path, row.tracked_json().unwrap()));
            }
            let tree = TreeBuilder::new(&self.objects).apply(None, &changes).await.unwrap();
            let who = Person::now("Ada", "ada@example.com");
            self.objects
                .save_as(&Commit {
                    tree,
                    parents: vec![],
                    author: who.clone(),
                    committer: who,
                    message: "first".into(),
                })
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn nothing_committed_means_created() {
        let h = Harness::new();
        let c = h.ws.create_job("Job", "ada", "builders", vec!["phase".into()]).await.unwrap();
        h.ws.stage_all(&c.id).await.unwrap();

        let report = h.engine().status(&c.id, None, StatusOptions::STAGED).await.unwrap();
        assert_eq!(report.collection.len(), 1);
        assert_eq!(report.folders.len(), 2);
        assert!(report.iter().all(|s| s.staged.unwrap().change == Change::Created));
        assert!(report.iter().all(|s| s.attached));
        assert!(report.head.is_none());
    }

    #[tokio::test]
    async fn modified_and_unchanged_against_head() {
        let h = Harness::new();
        let c = h.ws.create_job("Job", "ada", "builders", vec!["phase".into()]).await.unwrap();
        let root = c.folders.roots["phase"].clone();
        let mut comp = h
            .ws
            .save(Component::new(c.id.clone(), "Pump", Some(root.clone()), None))
            .await
            .unwrap();
        let head = h
            .commit(&c.id, &[c.clone().into_record(), comp.clone().into_record()])
            .await;

        comp.name = "Pump v2".into();
        let comp = h.ws.save(comp).await.unwrap();
        let report = h
            .engine()
            .status(&c.id, Some(&head), StatusOptions::WORKING.with_diff())
            .await
            .unwrap();

        let collection = report.get(EntityKind::Collection, &c.id).unwrap();
        assert_eq!(collection.unstaged.unwrap().change, Change::Unchanged);

        let status = report.get(EntityKind::Component, &comp.id).unwrap();
        assert_eq!(status.unstaged.unwrap().change, Change::Modified);
        assert!(status.committed.is_some());
        assert!(status.attached);
        let diff = status.diff.as_ref().unwrap();
        assert_eq!(
            diff.changes,
            vec![FieldChange::Modified {
                path: "name".into(),
                old: "Pump".into(),
                new: "Pump v2".into(),
            }]
        );

        // The root folders were never committed.
        let folder = report.get(EntityKind::Folder, &root).unwrap();
        assert_eq!(folder.change(), Some(Change::Created));
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn created_entity_diff_lists_every_field() {
        let h = Harness::new();
        let c = h.ws.create_job("Job", "ada", "builders", vec![]).await.unwrap();
        let report = h
            .engine()
            .status(&c.id, None, StatusOptions::ALL.with_diff())
            .await
            .unwrap();
        let diff = report.collection[0].diff.as_ref().unwrap();
        assert!(diff.get("owner").is_some());
        assert_eq!(diff.removals(), 0);
    }

    #[tokio::test]
    async fn detached_component_is_flagged() {
        let h = Harness::new();
        let c = h.ws.create_job("Job", "ada", "builders", vec!["phase".into()]).await.unwrap();
        let comp = h
            .ws
            .save(Component::new(c.id.clone(), "Lost", Some(EntityId::from("gone")), None))
            .await
            .unwrap();
        let report = h.engine().status(&c.id, None, StatusOptions::ALL).await.unwrap();
        assert!(report.get(EntityKind::Component, &comp.id).unwrap().is_detached());
    }

    #[tokio::test]
    async fn scope_filters_views() {
        let h = Harness::new();
        let c = h.ws.create_job("Job", "ada", "builders", vec![]).await.unwrap();
        h.ws.stage(&c.id, &[(EntityKind::Collection, c.id.clone())]).await.unwrap();

        let staged = h.engine().status(&c.id, None, StatusOptions::STAGED).await.unwrap();
        assert_eq!(staged.collection.len(), 1);
        assert!(staged.folders.is_empty());

        let working = h.engine().status(&c.id, None, StatusOptions::WORKING).await.unwrap();
        assert!(working.collection.is_empty());
        assert_eq!(working.folders.len(), 1);
    }
}
