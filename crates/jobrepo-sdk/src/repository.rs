use std::sync::Arc;

use jobrepo_diff::TreeDiff;
use jobrepo_index::{CommittedTree, JobStatus, StatusEngine, StatusOptions};
use jobrepo_records::{EntityRecord, InMemoryRecordStore, RecordStore, Workspace};
use jobrepo_refs::{FsRefStore, InMemoryRefStore, RefNamespace, RefStore};
use jobrepo_store::{Commit, FsObjectStore, InMemoryObjectStore, ObjectStore, ObjectStoreExt, StoreError};
use jobrepo_types::{EntityId, EntityKind, ObjectId};
use tracing::{debug, info};

use crate::commit::{CommitSummary, Committer, LogEntry};
use crate::config::RepoConfig;
use crate::error::{SdkError, SdkResult};

/// High-level repository API over an object store, a ref store and a
/// record store.
///
/// Every job gets its own ref namespace, derived from the collection's
/// shortname, so many jobs can share the same stores.
pub struct Repository {
    objects: Arc<dyn ObjectStore>,
    refs: Arc<dyn RefStore>,
    records: Arc<dyn RecordStore>,
    workspace: Workspace,
    config: RepoConfig,
}

impl Repository {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        refs: Arc<dyn RefStore>,
        records: Arc<dyn RecordStore>,
        config: RepoConfig,
    ) -> Self {
        Self {
            workspace: Workspace::new(records.clone()),
            objects,
            refs,
            records,
            config,
        }
    }

    /// A repository whose stores all live in memory.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryRefStore::new()),
            Arc::new(InMemoryRecordStore::new()),
            RepoConfig::default(),
        )
    }

    /// Open (or create) an on-disk repository under `config.data_dir`.
    pub async fn open(config: RepoConfig) -> SdkResult<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        let objects = FsObjectStore::open(config.objects_dir()).await?;
        let refs = FsRefStore::open(config.refs_dir()).await?;
        let records = InMemoryRecordStore::open(config.records_path()).await?;
        info!(data_dir = %config.data_dir.display(), "opened repository");
        Ok(Self::new(
            Arc::new(objects),
            Arc::new(refs),
            Arc::new(records),
            config,
        ))
    }

    // ---- Accessors ----

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn refs(&self) -> &Arc<dyn RefStore> {
        &self.refs
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    /// Entity editing: save, stage, unstage.
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    // ---- Refs ----

    /// The ref namespace of a job.
    pub async fn namespace(&self, job: &EntityId) -> SdkResult<RefNamespace> {
        let collection = self.workspace.collection(job).await?;
        Ok(RefNamespace::new(collection.shortname)?)
    }

    /// Fully qualified ref of `branch` (or the default branch) of a job.
    pub async fn ref_name(&self, job: &EntityId, branch: Option<&str>) -> SdkResult<String> {
        let branch = branch.unwrap_or(&self.config.default_ref);
        Ok(self.namespace(job).await?.qualify(branch)?)
    }

    /// Commit a branch of `job` points at, if any.
    pub async fn head(&self, job: &EntityId, branch: Option<&str>) -> SdkResult<Option<ObjectId>> {
        let reference = self.ref_name(job, branch).await?;
        Ok(self.refs.read_ref(&reference).await?)
    }

    /// Every branch of a job with its tip.
    pub async fn branches(&self, job: &EntityId) -> SdkResult<Vec<(String, ObjectId)>> {
        let ns = self.namespace(job).await?;
        let refs = self.refs.list_refs(&ns.heads_prefix()).await?;
        Ok(refs
            .into_iter()
            .filter_map(|(name, id)| ns.branch_of(&name).map(|b| (b.to_string(), id)))
            .collect())
    }

    // ---- Commits ----

    /// Stage everything and write the first commit of a job.
    pub async fn create_repo(&self, job: &EntityId) -> SdkResult<CommitSummary> {
        let reference = self.ref_name(job, None).await?;
        let run = async {
            if let Some(existing) = self.refs.read_ref(&reference).await? {
                return Err(SdkError::AlreadyInitialized(existing));
            }
            self.workspace.stage_all(job).await?;
            self.committer()
                .commit(job, &reference, "Initial commit", self.config.person())
                .await
        };
        run.await.map_err(|e| e.in_job(job, &reference))
    }

    /// Commit the job's staged rows to the default branch.
    pub async fn commit(&self, job: &EntityId, message: &str) -> SdkResult<CommitSummary> {
        self.commit_to(job, message, None).await
    }

    pub async fn commit_to(
        &self,
        job: &EntityId,
        message: &str,
        branch: Option<&str>,
    ) -> SdkResult<CommitSummary> {
        let reference = self.ref_name(job, branch).await?;
        self.committer()
            .commit(job, &reference, message, self.config.person())
            .await
            .map_err(|e| e.in_job(job, &reference))
    }

    /// Retry path after a `CommitReconciliationFailure`.
    pub async fn reconcile(&self, job: &EntityId, branch: Option<&str>) -> SdkResult<usize> {
        let reference = self.ref_name(job, branch).await?;
        self.committer()
            .reconcile(job, &reference)
            .await
            .map_err(|e| e.in_job(job, &reference))
    }

    fn committer(&self) -> Committer<'_> {
        Committer {
            objects: self.objects.as_ref(),
            refs: self.refs.as_ref(),
            records: self.records.as_ref(),
        }
    }

    // ---- Status ----

    /// Staged rows against the default branch.
    pub async fn stage_status(&self, job: &EntityId) -> SdkResult<JobStatus> {
        self.status(job, None, StatusOptions::STAGED).await
    }

    /// Working rows against the default branch.
    pub async fn work_status(&self, job: &EntityId) -> SdkResult<JobStatus> {
        self.status(job, None, StatusOptions::WORKING).await
    }

    /// Staged rows against `branch`, with field-level diffs.
    pub async fn diff_index(&self, job: &EntityId, branch: Option<&str>) -> SdkResult<JobStatus> {
        self.status(job, branch, StatusOptions::STAGED.with_diff()).await
    }

    /// Staged and working rows against the default branch.
    pub async fn diff_tree(&self, job: &EntityId) -> SdkResult<JobStatus> {
        self.status(job, None, StatusOptions::ALL).await
    }

    pub async fn status(
        &self,
        job: &EntityId,
        branch: Option<&str>,
        options: StatusOptions,
    ) -> SdkResult<JobStatus> {
        let reference = self.ref_name(job, branch).await?;
        let run = async {
            let head = self.refs.read_ref(&reference).await?;
            let engine = StatusEngine::new(self.objects.as_ref(), self.records.as_ref());
            Ok::<_, SdkError>(engine.status(job, head.as_ref(), options).await?)
        };
        run.await.map_err(|e| e.in_job(job, &reference))
    }

    // ---- History ----

    /// First-parent history from a branch tip, newest first.
    pub async fn log(
        &self,
        job: &EntityId,
        branch: Option<&str>,
        limit: usize,
    ) -> SdkResult<Vec<LogEntry>> {
        let reference = self.ref_name(job, branch).await?;
        let run = async {
            let mut entries = Vec::new();
            let mut next = self.refs.read_ref(&reference).await?;
            while let Some(id) = next {
                if entries.len() >= limit {
                    break;
                }
                let commit: Commit = self.objects.load_as(&id).await.map_err(|e| {
                    SdkError::InconsistentRepositoryState(format!("history commit {id}: {e}"))
                })?;
                next = commit.parent().copied();
                entries.push(LogEntry { id, commit });
            }
            debug!(job = %job, entries = entries.len(), "walked history");
            Ok::<_, SdkError>(entries)
        };
        run.await.map_err(|e| e.in_job(job, &reference))
    }

    /// The committed version of one entity on a branch.
    pub async fn read_committed(
        &self,
        job: &EntityId,
        branch: Option<&str>,
        kind: EntityKind,
        id: &EntityId,
    ) -> SdkResult<Option<EntityRecord>> {
        let reference = self.ref_name(job, branch).await?;
        let run = async {
            let head = self.refs.read_ref(&reference).await?;
            let committed = CommittedTree::load(self.objects.as_ref(), job, head.as_ref()).await?;
            let record = committed
                .read_entity(self.objects.as_ref(), job, kind, id)
                .await?;
            Ok::<_, SdkError>(record)
        };
        run.await.map_err(|e| e.in_job(job, &reference))
    }

    /// Entry-level difference between two commits. `None` for `old`
    /// compares against an empty tree.
    pub async fn diff_commits(&self, old: Option<&ObjectId>, new: &ObjectId) -> SdkResult<TreeDiff> {
        Ok(jobrepo_diff::diff_commits(self.objects.as_ref(), old, new).await?)
    }

    /// Read a commit object.
    pub async fn show(&self, id: &ObjectId) -> SdkResult<Commit> {
        self.objects.load_as(id).await.map_err(|e| match e {
            StoreError::NotFound(id) => SdkError::ObjectNotFound(id),
            other => other.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobrepo_index::Change;
    use jobrepo_records::{Collection, Component, Entity, Folder};
    use jobrepo_types::EntityState;

    async fn repo_with_job() -> (Repository, Collection) {
        let repo = Repository::in_memory();
        let job = repo
            .workspace()
            .create_job("Tower A", "ada", "builders", vec!["phase".into()])
            .await
            .unwrap();
        (repo, job)
    }

    #[tokio::test]
    async fn ref_name_uses_shortname() {
        let (repo, job) = repo_with_job().await;
        assert_eq!(repo.ref_name(&job.id, None).await.unwrap(), "tower-a/refs/heads/master");
        assert_eq!(
            repo.ref_name(&job.id, Some("review")).await.unwrap(),
            "tower-a/refs/heads/review"
        );
    }

    #[tokio::test]
    async fn create_repo_commits_everything() {
        let (repo, job) = repo_with_job().await;
        let summary = repo.create_repo(&job.id).await.unwrap();
        assert!(summary.parent.is_none());
        // Collection, `phase` root and `component` root.
        assert_eq!(summary.committed.len(), 3);
        assert_eq!(repo.head(&job.id, None).await.unwrap(), Some(summary.commit));

        let commit = repo.show(&summary.commit).await.unwrap();
        assert_eq!(commit.message, "Initial commit");
        assert_eq!(commit.tree, summary.tree);
        assert_eq!(
            repo.branches(&job.id).await.unwrap(),
            vec![("master".to_string(), summary.commit)]
        );
    }

    #[tokio::test]
    async fn create_repo_twice_fails() {
        let (repo, job) = repo_with_job().await;
        let first = repo.create_repo(&job.id).await.unwrap();
        let err = repo.create_repo(&job.id).await.unwrap_err();
        assert!(matches!(err.root(), SdkError::AlreadyInitialized(id) if *id == first.commit));
    }

    #[tokio::test]
    async fn commit_without_staged_rows_fails() {
        let (repo, job) = repo_with_job().await;
        let err = repo.commit(&job.id, "empty").await.unwrap_err();
        assert!(matches!(err.root(), SdkError::NothingToCommit));
        match err {
            SdkError::Job { reference, .. } => assert_eq!(reference, "tower-a/refs/heads/master"),
            other => panic!("expected job context, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_commit_links_parent_and_prunes_old_rows() {
        let (repo, job) = repo_with_job().await;
        let first = repo.create_repo(&job.id).await.unwrap();

        let root = job.folders.roots["phase"].clone();
        let mut folder = Folder::new(job.id.clone(), "Level 1", "phase", Some(root));
        folder = repo.workspace().save(folder).await.unwrap();
        repo.workspace().stage_all(&job.id).await.unwrap();
        let second = repo.commit(&job.id, "add level").await.unwrap();
        assert_eq!(second.parent, Some(first.commit));

        folder.name = "Level one".into();
        let folder = repo.workspace().save(folder).await.unwrap();
        repo.workspace().stage_all(&job.id).await.unwrap();
        repo.commit(&job.id, "rename level").await.unwrap();

        let rows = repo.records().versions(EntityKind::Folder, &folder.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state(), EntityState::Committed);
        assert_eq!(rows[0].hash(), folder.hash);

        let log = repo.log(&job.id, None, 10).await.unwrap();
        let messages: Vec<&str> = log.iter().map(|e| e.commit.message.as_str()).collect();
        assert_eq!(messages, ["rename level", "add level", "Initial commit"]);
        assert_eq!(repo.log(&job.id, None, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stage_and_work_status_split_views() {
        let (repo, job) = repo_with_job().await;
        repo.create_repo(&job.id).await.unwrap();

        let root = job.folders.roots[jobrepo_records::COMPONENT_ROOT].clone();
        let pump = repo
            .workspace()
            .save(Component::new(job.id.clone(), "Pump", Some(root.clone()), None))
            .await
            .unwrap();
        let valve = repo
            .workspace()
            .save(Component::new(job.id.clone(), "Valve", Some(root), None))
            .await
            .unwrap();
        repo.workspace()
            .stage(&job.id, &[(EntityKind::Component, pump.id.clone())])
            .await
            .unwrap();

        let staged = repo.stage_status(&job.id).await.unwrap();
        assert_eq!(staged.components.len(), 1);
        assert_eq!(staged.components[0].id, pump.id);

        let working = repo.work_status(&job.id).await.unwrap();
        assert_eq!(working.components.len(), 1);
        assert_eq!(working.components[0].id, valve.id);
        assert_eq!(working.components[0].change(), Some(Change::Created));

        assert_eq!(repo.diff_tree(&job.id).await.unwrap().components.len(), 2);
    }

    #[tokio::test]
    async fn read_committed_rebuilds_entity() {
        let (repo, job) = repo_with_job().await;
        repo.create_repo(&job.id).await.unwrap();
        let record = repo
            .read_committed(&job.id, None, EntityKind::Collection, &job.id)
            .await
            .unwrap()
            .unwrap();
        match record {
            EntityRecord::Collection(c) => {
                assert_eq!(c.shortname, "tower-a");
                assert_eq!(c.hash, Entity::hash(&job));
                assert_eq!(c.state, EntityState::Committed);
            }
            other => panic!("unexpected record {other:?}"),
        }
        let missing = repo
            .read_committed(&job.id, None, EntityKind::Folder, &EntityId::from("nope"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn show_missing_commit() {
        let repo = Repository::in_memory();
        let id = ObjectId::from_hash([3; 20]);
        assert!(matches!(repo.show(&id).await, Err(SdkError::ObjectNotFound(_))));
    }

    #[tokio::test]
    async fn unknown_job_is_record_error() {
        let repo = Repository::in_memory();
        let err = repo.stage_status(&EntityId::from("nope")).await.unwrap_err();
        assert!(matches!(err, SdkError::Record(_)));
    }
}
