use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use jobrepo_crypto::unframe;
use jobrepo_types::ObjectId;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StoredObject};
use crate::traits::ObjectStore;

/// Loose-object store on the local filesystem.
///
/// Each object lives at `<root>/<first two hex chars>/<remaining 38>` and
/// holds its framed bytes. Writes go to a temporary file in the same
/// directory and are renamed into place, so readers never observe a
/// partially written object.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "opened object store");
        Ok(Self { root })
    }

    /// The root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "object path has no parent"))?;
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    sync_dir(dir)
}

/// Flush the directory entry created by a rename.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let bytes = match tokio::fs::read(self.object_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let (tag, body) = unframe(&bytes).ok_or_else(|| StoreError::CorruptObject {
            id: *id,
            reason: "malformed object header".into(),
        })?;
        let kind = ObjectKind::from_tag(tag).ok_or_else(|| StoreError::CorruptObject {
            id: *id,
            reason: format!("unknown object kind {tag:?}"),
        })?;

        let object = StoredObject::new(kind, body.to_vec());
        let computed = object.compute_id();
        if computed != *id {
            warn!(%id, %computed, "object content does not match its id");
            return Err(StoreError::HashMismatch { id: *id, computed });
        }
        Ok(Some(object))
    }

    async fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        let path = self.object_path(&id);
        if tokio::fs::try_exists(&path).await? {
            return Ok(id);
        }

        let bytes = object.framed();
        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(std::io::Error::other)??;
        debug!(%id, kind = %object.kind, size = object.size(), "wrote object");
        Ok(id)
    }

    async fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(tokio::fs::try_exists(self.object_path(id)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Blob, Commit, ObjectBody, Person, Tree, TreeEntry, EntryMode};
    use crate::traits::ObjectStoreExt;

    #[tokio::test]
    async fn roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path().join("objects")).await.unwrap();

        let blob_id = store.save_as(&Blob::new(b"{}".to_vec())).await.unwrap();
        let tree_id = store
            .save_as(&Tree::new(vec![TreeEntry::new(EntryMode::Regular, "job", blob_id)]))
            .await
            .unwrap();
        let commit = Commit {
            tree: tree_id,
            parents: Vec::new(),
            author: Person::now("a", "a@example.com"),
            committer: Person::now("a", "a@example.com"),
            message: "init".into(),
        };
        let commit_id = store.save_as(&commit).await.unwrap();

        let reopened = FsObjectStore::open(dir.path().join("objects")).await.unwrap();
        let loaded: Commit = reopened.load_as(&commit_id).await.unwrap();
        assert_eq!(loaded.tree, tree_id);
        assert!(reopened.exists(&blob_id).await.unwrap());
    }

    #[tokio::test]
    async fn layout_matches_loose_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).await.unwrap();
        let id = store.save_as(&Blob::new(b"hello world\n".to_vec())).await.unwrap();
        assert_eq!(id.to_hex(), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");
        assert!(dir
            .path()
            .join("3b")
            .join("18e512dba79e4c8300dd08aeb37f8e728b8dad")
            .is_file());
    }

    #[tokio::test]
    async fn missing_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).await.unwrap();
        let id = ObjectId::from_hash([4; 20]);
        assert!(store.read(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tampered_object_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).await.unwrap();
        let id = store.save_as(&Blob::new(b"original".to_vec())).await.unwrap();

        let stored = Blob::new(b"tampered".to_vec()).to_stored_object().unwrap();
        std::fs::write(store.object_path(&id), stored.framed()).unwrap();

        let err = store.read(&id).await.unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch { .. }));
    }

    #[tokio::test]
    async fn garbage_header_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).await.unwrap();
        let id = ObjectId::from_hash([5; 20]);
        let path = store.object_path(&id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not an object").unwrap();

        let err = store.read(&id).await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptObject { .. }));
    }

    #[test]
    fn atomic_write_leaves_only_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ab").join("cdef");
        write_atomically(&path, b"first").unwrap();
        write_atomically(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let names: Vec<_> = std::fs::read_dir(dir.path().join("ab"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("cdef")]);
        sync_dir(&dir.path().join("ab")).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn syncing_a_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(sync_dir(&dir.path().join("gone")).is_err());
    }
}
