//! On-disk repository: state survives reopening.

use jobrepo_sdk::{EntityKind, EntityState, RepoConfig, Repository};

#[tokio::test]
async fn reopen_keeps_refs_objects_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let config = RepoConfig::default().with_data_dir(dir.path().join("data"));

    let (job, commit) = {
        let repo = Repository::open(config.clone()).await.unwrap();
        let job = repo
            .workspace()
            .create_job("Harbour Works", "ada", "marine", vec!["phase".into()])
            .await
            .unwrap();
        let summary = repo.create_repo(&job.id).await.unwrap();
        (job, summary.commit)
    };

    let repo = Repository::open(config).await.unwrap();
    assert_eq!(repo.head(&job.id, None).await.unwrap(), Some(commit));
    assert_eq!(repo.show(&commit).await.unwrap().message, "Initial commit");

    let rows = repo.workspace().current(EntityKind::Folder, &job.id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.values().all(|r| r.state() == EntityState::Committed));
    assert!(repo.diff_tree(&job.id).await.unwrap().is_clean());
}

#[tokio::test]
async fn config_file_sets_author() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(RepoConfig::FILE_NAME);
    tokio::fs::write(
        &path,
        format!(
            "data_dir = {:?}\n[author]\nname = \"Grace\"\nemail = \"grace@example.com\"\n",
            dir.path().join("data").display().to_string()
        ),
    )
    .await
    .unwrap();

    let config = RepoConfig::load(&path).await.unwrap();
    let repo = Repository::open(config).await.unwrap();
    let job = repo
        .workspace()
        .create_job("Quay", "grace", "marine", vec![])
        .await
        .unwrap();
    let summary = repo.create_repo(&job.id).await.unwrap();
    let commit = repo.show(&summary.commit).await.unwrap();
    assert_eq!(commit.author.name, "Grace");
    assert_eq!(commit.committer.email, "grace@example.com");
}
