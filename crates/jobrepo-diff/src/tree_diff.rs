//! Tree-level diff: compare two committed trees path by path.
//!
//! Trees are flattened to their file entries first, so a change three levels
//! down is reported as one entry at its full path (`folders/<id>`).

use std::collections::BTreeMap;

use jobrepo_store::{Commit, EntryMode, ObjectKind, ObjectStore, ObjectStoreExt, StoreError, Tree, TreeEntry};
use jobrepo_tree::flatten;
use jobrepo_types::ObjectId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DiffError, DiffResult};

/// The result of comparing two trees.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeDiff {
    pub changes: Vec<TreeChange>,
}

impl TreeDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Changes whose path lies under the directory `dir`.
    pub fn under<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = &'a TreeChange> + 'a {
        self.changes.iter().filter(move |c| {
            c.path()
                .strip_prefix(dir)
                .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// A single change between two trees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum TreeChange {
    Added {
        path: String,
        new_id: ObjectId,
        mode: EntryMode,
    },
    Deleted {
        path: String,
        old_id: ObjectId,
        mode: EntryMode,
    },
    /// Same path, different object id.
    Modified {
        path: String,
        old_id: ObjectId,
        new_id: ObjectId,
        mode: EntryMode,
    },
    /// Same content, different mode.
    ModeChanged {
        path: String,
        id: ObjectId,
        old_mode: EntryMode,
        new_mode: EntryMode,
    },
}

impl TreeChange {
    pub fn path(&self) -> &str {
        match self {
            Self::Added { path, .. }
            | Self::Deleted { path, .. }
            | Self::Modified { path, .. }
            | Self::ModeChanged { path, .. } => path,
        }
    }
}

/// Compare two trees stored in `store`. `None` stands for the empty tree.
pub async fn diff_trees<S: ObjectStore + ?Sized>(
    store: &S,
    old_tree: Option<&ObjectId>,
    new_tree: Option<&ObjectId>,
) -> DiffResult<TreeDiff> {
    let old = match old_tree {
        Some(id) => flatten(store, id).await?,
        None => BTreeMap::new(),
    };
    let new = match new_tree {
        Some(id) => flatten(store, id).await?,
        None => BTreeMap::new(),
    };
    let diff = diff_entries(&old, &new);
    debug!(changes = diff.len(), "diffed trees");
    Ok(diff)
}

/// Compare the root trees of two commits. `None` for `old` diffs against the
/// empty tree, as for a first commit.
pub async fn diff_commits<S: ObjectStore + ?Sized>(
    store: &S,
    old: Option<&ObjectId>,
    new: &ObjectId,
) -> DiffResult<TreeDiff> {
    let old_tree = match old {
        Some(id) => Some(load_commit(store, id).await?.tree),
        None => None,
    };
    let new_tree = load_commit(store, new).await?.tree;
    diff_trees(store, old_tree.as_ref(), Some(&new_tree)).await
}

async fn load_commit<S: ObjectStore + ?Sized>(store: &S, id: &ObjectId) -> DiffResult<Commit> {
    match store.load_as::<Commit>(id).await {
        Err(StoreError::KindMismatch { .. }) => Err(DiffError::UnexpectedObjectKind {
            id: *id,
            expected: ObjectKind::Commit.tag(),
        }),
        other => Ok(other?),
    }
}

/// Compare the direct entries of two in-memory trees without touching a store.
pub fn diff_tree_objects(old_tree: Option<&Tree>, new_tree: &Tree) -> TreeDiff {
    let old = old_tree.map(entries_to_map).unwrap_or_default();
    diff_entries(&old, &entries_to_map(new_tree))
}

fn entries_to_map(tree: &Tree) -> BTreeMap<String, TreeEntry> {
    tree.entries
        .iter()
        .map(|e| (e.name.clone(), e.clone()))
        .collect()
}

fn diff_entries(old: &BTreeMap<String, TreeEntry>, new: &BTreeMap<String, TreeEntry>) -> TreeDiff {
    let mut changes = Vec::new();

    for (path, old_entry) in old {
        match new.get(path) {
            Some(new_entry) if old_entry.object_id != new_entry.object_id => {
                changes.push(TreeChange::Modified {
                    path: path.clone(),
                    old_id: old_entry.object_id,
                    new_id: new_entry.object_id,
                    mode: new_entry.mode,
                });
            }
            Some(new_entry) if old_entry.mode != new_entry.mode => {
                changes.push(TreeChange::ModeChanged {
                    path: path.clone(),
                    id: old_entry.object_id,
                    old_mode: old_entry.mode,
                    new_mode: new_entry.mode,
                });
            }
            Some(_) => {}
            None => changes.push(TreeChange::Deleted {
                path: path.clone(),
                old_id: old_entry.object_id,
                mode: old_entry.mode,
            }),
        }
    }

    for (path, new_entry) in new {
        if !old.contains_key(path) {
            changes.push(TreeChange::Added {
                path: path.clone(),
                new_id: new_entry.object_id,
                mode: new_entry.mode,
            });
        }
    }

    changes.sort_by(|a, b| a.path().cmp(b.path()));
    TreeDiff { changes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobrepo_store::{InMemoryObjectStore, Person};
    use jobrepo_tree::{PathChange, TreeBuilder};

    fn oid(b: u8) -> ObjectId {
        ObjectId::from_hash([b; 20])
    }

    fn entry(name: &str, id: ObjectId, mode: EntryMode) -> TreeEntry {
        TreeEntry::new(mode, name, id)
    }

    #[test]
    fn empty_to_populated_all_additions() {
        let new_tree = Tree::new(vec![
            entry("a", oid(1), EntryMode::Regular),
            entry("b", oid(2), EntryMode::Regular),
        ]);
        let diff = diff_tree_objects(None, &new_tree);
        assert_eq!(diff.len(), 2);
        assert!(diff.changes.iter().all(|c| matches!(c, TreeChange::Added { .. })));
    }

    #[test]
    fn identical_content_under_new_name_is_add_and_delete() {
        // Entity ids are identities, so equal content under another id is not a rename.
        let old_tree = Tree::new(vec![entry("f1", oid(1), EntryMode::Regular)]);
        let new_tree = Tree::new(vec![entry("f2", oid(1), EntryMode::Regular)]);
        let diff = diff_tree_objects(Some(&old_tree), &new_tree);
        assert_eq!(diff.len(), 2);
        assert!(matches!(&diff.changes[0], TreeChange::Deleted { path, .. } if path == "f1"));
        assert!(matches!(&diff.changes[1], TreeChange::Added { path, .. } if path == "f2"));
    }

    #[test]
    fn mode_change_detection() {
        let old_tree = Tree::new(vec![entry("run", oid(1), EntryMode::Regular)]);
        let new_tree = Tree::new(vec![entry("run", oid(1), EntryMode::Executable)]);
        let diff = diff_tree_objects(Some(&old_tree), &new_tree);
        assert!(matches!(
            &diff.changes[..],
            [TreeChange::ModeChanged {
                old_mode: EntryMode::Regular,
                new_mode: EntryMode::Executable,
                ..
            }]
        ));
    }

    async fn build(store: &InMemoryObjectStore, base: Option<ObjectId>, changes: &[PathChange]) -> ObjectId {
        TreeBuilder::new(store).apply(base, changes).await.unwrap()
    }

    #[tokio::test]
    async fn nested_changes_reported_at_full_path() {
        let store = InMemoryObjectStore::new();
        let v1 = build(
            &store,
            None,
            &[
                PathChange::upsert("job1", "{}"),
                PathChange::upsert("folders/a", "1"),
                PathChange::upsert("folders/b", "2"),
                PathChange::dir("components"),
            ],
        )
        .await;
        let v2 = build(
            &store,
            Some(v1),
            &[
                PathChange::upsert("folders/a", "1b"),
                PathChange::delete("folders/b"),
                PathChange::upsert("components/c", "3"),
            ],
        )
        .await;

        let diff = diff_trees(&store, Some(&v1), Some(&v2)).await.unwrap();
        let paths: Vec<&str> = diff.changes.iter().map(TreeChange::path).collect();
        assert_eq!(paths, vec!["components/c", "folders/a", "folders/b"]);
        assert!(matches!(&diff.changes[1], TreeChange::Modified { .. }));
        assert!(matches!(&diff.changes[2], TreeChange::Deleted { .. }));
        assert_eq!(diff.under("folders").count(), 2);
        assert_eq!(diff.under("fold").count(), 0);

        assert!(diff_trees(&store, Some(&v2), Some(&v2)).await.unwrap().is_empty());
        assert_eq!(diff_trees(&store, None, Some(&v1)).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn diff_commits_against_parent_and_root() {
        let store = InMemoryObjectStore::new();
        let t1 = build(&store, None, &[PathChange::upsert("folders/a", "1")]).await;
        let t2 = build(&store, Some(t1), &[PathChange::upsert("folders/b", "2")]).await;
        let who = Person::now("Ada", "ada@example.com");
        let c1 = store
            .save_as(&Commit {
                tree: t1,
                parents: vec![],
                author: who.clone(),
                committer: who.clone(),
                message: "first".into(),
            })
            .await
            .unwrap();
        let c2 = store
            .save_as(&Commit {
                tree: t2,
                parents: vec![c1],
                author: who.clone(),
                committer: who,
                message: "second".into(),
            })
            .await
            .unwrap();

        let diff = diff_commits(&store, Some(&c1), &c2).await.unwrap();
        assert!(matches!(&diff.changes[..], [TreeChange::Added { path, .. }] if path == "folders/b"));
        assert_eq!(diff_commits(&store, None, &c1).await.unwrap().len(), 1);

        let err = diff_commits(&store, None, &t1).await.unwrap_err();
        assert!(matches!(err, DiffError::UnexpectedObjectKind { .. }));
    }
}
