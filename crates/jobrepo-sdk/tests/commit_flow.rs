//! End-to-end commit and status scenarios against in-memory stores.

use std::collections::BTreeSet;

use jobrepo_sdk::{
    Change, Collection, Entity, EntityKind, EntityState, Folder, Repository, TreeChange,
};
use jobrepo_store::{ObjectStoreExt, Tree};
use jobrepo_tree::list_dir;

async fn job_with_roots(repo: &Repository) -> Collection {
    repo.workspace()
        .create_job(
            "Riverside Tower",
            "ada",
            "builders",
            vec!["phase".into(), "building".into()],
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn first_commit_lays_out_tree_and_commits_rows() {
    let repo = Repository::in_memory();
    let job = job_with_roots(&repo).await;
    assert_eq!(repo.workspace().stage_all(&job.id).await.unwrap(), 4);

    let summary = repo.commit(&job.id, "first").await.unwrap();
    assert_eq!(summary.reference, "riverside-tower/refs/heads/master");
    assert_eq!(repo.head(&job.id, Some("master")).await.unwrap(), Some(summary.commit));

    let root: Tree = repo.objects().load_as(&summary.tree).await.unwrap();
    let names: BTreeSet<&str> = root.entries.iter().map(|e| e.name.as_str()).collect();
    let expected: BTreeSet<&str> = ["components", "folders", "instances", job.id.as_str()].into();
    assert_eq!(names, expected);
    assert!(!root.get(job.id.as_str()).unwrap().mode.is_tree());
    assert_eq!(root.get(job.id.as_str()).unwrap().object_id, job.hash);

    let folders = list_dir(repo.objects().as_ref(), &summary.tree, "folders")
        .await
        .unwrap()
        .unwrap();
    // `phase`, `building` and the implicit `component` root.
    assert_eq!(folders.len(), 3);
    let instances = list_dir(repo.objects().as_ref(), &summary.tree, "instances")
        .await
        .unwrap()
        .unwrap();
    assert!(instances.is_empty());

    for kind in [EntityKind::Collection, EntityKind::Folder] {
        for (_, row) in repo.workspace().current(kind, &job.id).await.unwrap() {
            assert_eq!(row.state(), EntityState::Committed, "{kind} {}", row.id());
        }
    }
    assert!(repo.diff_tree(&job.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn new_folder_is_created_until_committed() {
    let repo = Repository::in_memory();
    let job = job_with_roots(&repo).await;
    let first = repo.create_repo(&job.id).await.unwrap();

    let phase = job.folders.roots["phase"].clone();
    let folder = repo
        .workspace()
        .save(Folder::new(job.id.clone(), "Phase 1", "phase", Some(phase)))
        .await
        .unwrap();

    let working = repo.work_status(&job.id).await.unwrap();
    let status = working.get(EntityKind::Folder, &folder.id).unwrap();
    assert_eq!(status.unstaged.unwrap().change, Change::Created);
    assert!(status.attached);

    repo.workspace()
        .stage(&job.id, &[(EntityKind::Folder, folder.id.clone())])
        .await
        .unwrap();
    let report = repo.diff_tree(&job.id).await.unwrap();
    let created: Vec<_> = report.with_change(Change::Created).map(|s| s.id.clone()).collect();
    assert_eq!(created, vec![folder.id.clone()]);

    let second = repo.commit(&job.id, "add phase 1").await.unwrap();
    let report = repo.diff_tree(&job.id).await.unwrap();
    assert!(report.get(EntityKind::Folder, &folder.id).is_none());
    assert!(report.is_clean());

    let diff = repo.diff_commits(Some(&first.commit), &second.commit).await.unwrap();
    assert_eq!(diff.len(), 1);
    match &diff.changes[0] {
        TreeChange::Added { path, new_id, .. } => {
            assert_eq!(path, &format!("folders/{}", folder.id));
            assert_eq!(*new_id, folder.hash);
        }
        other => panic!("unexpected change {other:?}"),
    }
}

#[tokio::test]
async fn diff_index_reports_field_changes() {
    let repo = Repository::in_memory();
    let job = job_with_roots(&repo).await;
    repo.create_repo(&job.id).await.unwrap();

    let root_id = job.folders.roots["building"].clone();
    let mut root = match repo
        .read_committed(&job.id, None, EntityKind::Folder, &root_id)
        .await
        .unwrap()
    {
        Some(record) => Folder::from_record(record).unwrap(),
        None => panic!("root folder not committed"),
    };
    root.description = "North block".into();
    repo.workspace().save(root).await.unwrap();
    repo.workspace().stage_all(&job.id).await.unwrap();

    let report = repo.diff_index(&job.id, None).await.unwrap();
    let status = report.get(EntityKind::Folder, &root_id).unwrap();
    assert_eq!(status.staged.unwrap().change, Change::Modified);
    let diff = status.diff.as_ref().unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff.changes[0].path(), "description");
}

#[tokio::test]
async fn history_walks_first_parents() {
    let repo = Repository::in_memory();
    let job = job_with_roots(&repo).await;
    let first = repo.create_repo(&job.id).await.unwrap();

    let mut collection = job.clone();
    collection.description = "Phase two tender".into();
    repo.workspace().save(collection).await.unwrap();
    repo.workspace().stage_all(&job.id).await.unwrap();
    let second = repo.commit(&job.id, "describe job").await.unwrap();

    let log = repo.log(&job.id, None, 10).await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].id, second.commit);
    assert_eq!(log[0].commit.parents, vec![first.commit]);
    assert_eq!(log[1].id, first.commit);
    assert!(log[1].commit.parents.is_empty());
}

#[tokio::test]
async fn jobs_sharing_a_store_keep_separate_histories() {
    let repo = Repository::in_memory();
    let a = job_with_roots(&repo).await;
    let a_first = repo.create_repo(&a.id).await.unwrap();

    let err = repo
        .workspace()
        .create_job("Riverside  Tower", "grace", "builders", vec!["phase".into()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        jobrepo_records::RecordError::InvalidEntity { kind: EntityKind::Collection, .. }
    ));

    let b = repo
        .workspace()
        .create_job("Riverside Tower East", "grace", "builders", vec!["phase".into()])
        .await
        .unwrap();
    repo.workspace().stage_all(&b.id).await.unwrap();
    let b_first = repo.commit(&b.id, "first").await.unwrap();

    assert_eq!(b_first.reference, "riverside-tower-east/refs/heads/master");
    assert_ne!(b_first.reference, a_first.reference);
    let log = repo.log(&b.id, None, 10).await.unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].commit.parents.is_empty());

    let root: Tree = repo.objects().load_as(&b_first.tree).await.unwrap();
    assert!(root.get(b.id.as_str()).is_some());
    assert!(root.get(a.id.as_str()).is_none());
    let folders = list_dir(repo.objects().as_ref(), &b_first.tree, "folders")
        .await
        .unwrap()
        .unwrap();
    // `phase` and `component`, none of job a's three roots.
    assert_eq!(folders.len(), 2);

    assert_eq!(repo.head(&a.id, None).await.unwrap(), Some(a_first.commit));
}
