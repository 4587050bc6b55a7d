//! Read-side helpers over committed trees.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use jobrepo_store::{Blob, ObjectStore, ObjectStoreExt, Tree, TreeEntry};
use jobrepo_types::ObjectId;

use crate::error::{invalid_path, TreeResult};
use crate::path::{join_path, split_path};

/// Resolve `path` under `root` to its tree entry.
///
/// Returns `None` if any component is missing or a non-final component is a file.
pub async fn lookup<S: ObjectStore + ?Sized>(
    store: &S,
    root: &ObjectId,
    path: &str,
) -> TreeResult<Option<TreeEntry>> {
    let components = split_path(path)?;
    let mut tree: Tree = store.load_as(root).await?;
    let last = components.len() - 1;
    for (i, name) in components.iter().enumerate() {
        let Some(entry) = tree.get(name).cloned() else {
            return Ok(None);
        };
        if i == last {
            return Ok(Some(entry));
        }
        if !entry.mode.is_tree() {
            return Ok(None);
        }
        tree = store.load_as(&entry.object_id).await?;
    }
    Ok(None)
}

/// Read the blob stored at `path`.
pub async fn read_file<S: ObjectStore + ?Sized>(
    store: &S,
    root: &ObjectId,
    path: &str,
) -> TreeResult<Option<Vec<u8>>> {
    match lookup(store, root, path).await? {
        None => Ok(None),
        Some(entry) if entry.mode.is_tree() => Err(invalid_path(path, "is a directory")),
        Some(entry) => {
            let blob: Blob = store.load_as(&entry.object_id).await?;
            Ok(Some(blob.data))
        }
    }
}

/// List the directory at `path`; the empty path lists the root itself.
pub async fn list_dir<S: ObjectStore + ?Sized>(
    store: &S,
    root: &ObjectId,
    path: &str,
) -> TreeResult<Option<Tree>> {
    if path.is_empty() {
        return Ok(Some(store.load_as(root).await?));
    }
    match lookup(store, root, path).await? {
        None => Ok(None),
        Some(entry) if !entry.mode.is_tree() => Err(invalid_path(path, "is not a directory")),
        Some(entry) => Ok(Some(store.load_as(&entry.object_id).await?)),
    }
}

type FlattenFuture<'a> = Pin<Box<dyn Future<Output = TreeResult<()>> + Send + 'a>>;

/// Every non-directory entry reachable from `root`, keyed by full path.
pub async fn flatten<S: ObjectStore + ?Sized>(
    store: &S,
    root: &ObjectId,
) -> TreeResult<BTreeMap<String, TreeEntry>> {
    let mut out = BTreeMap::new();
    flatten_into(store, *root, String::new(), &mut out).await?;
    Ok(out)
}

fn flatten_into<'a, S: ObjectStore + ?Sized>(
    store: &'a S,
    id: ObjectId,
    prefix: String,
    out: &'a mut BTreeMap<String, TreeEntry>,
) -> FlattenFuture<'a> {
    Box::pin(async move {
        let tree: Tree = store.load_as(&id).await?;
        for entry in tree.entries {
            let path = join_path(&prefix, &entry.name);
            if entry.mode.is_tree() {
                flatten_into(store, entry.object_id, path, out).await?;
            } else {
                out.insert(path, entry);
            }
        }
        Ok(())
    })
}
