//! Filesystem reference store: one small text file per ref.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use jobrepo_types::ObjectId;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{RefError, Result};
use crate::names::validate_ref_name;
use crate::traits::RefStore;

/// A [`RefStore`] that keeps each ref at `<root>/<name>` containing the hex
/// commit id followed by a newline, the layout git uses for loose refs.
#[derive(Debug, Clone)]
pub struct FsRefStore {
    root: PathBuf,
}

impl FsRefStore {
    /// Open (creating if needed) a ref store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        name.split('/').fold(self.root.clone(), |p, c| p.join(c))
    }
}

fn parse_ref(name: &str, text: &str) -> Result<ObjectId> {
    ObjectId::from_hex(text.trim()).map_err(|e| RefError::Corrupt {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn write_ref_file(path: &Path, id: &ObjectId) -> std::io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "ref path has no parent"))?;
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    writeln!(tmp, "{id}")?;
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

fn collect_refs(root: &Path, dir: &Path, out: &mut Vec<(String, String)>) -> std::io::Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_refs(root, &path, out)?;
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let name: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let name = name.join("/");
        // Temp files from interrupted writes start with '.' and fail validation.
        if validate_ref_name(&name).is_err() {
            continue;
        }
        out.push((name, std::fs::read_to_string(&path)?));
    }
    Ok(())
}

#[async_trait]
impl RefStore for FsRefStore {
    async fn read_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        validate_ref_name(name)?;
        match tokio::fs::read_to_string(self.ref_path(name)).await {
            Ok(text) => parse_ref(name, &text).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_ref(&self, name: &str, id: &ObjectId) -> Result<()> {
        validate_ref_name(name)?;
        let path = self.ref_path(name);
        let target = *id;
        tokio::task::spawn_blocking(move || write_ref_file(&path, &target))
            .await
            .map_err(std::io::Error::other)??;
        debug!(name, to = %id.short_hex(), "updated ref");
        Ok(())
    }

    async fn list_refs(&self, prefix: &str) -> Result<Vec<(String, ObjectId)>> {
        let root = self.root.clone();
        let raw = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            collect_refs(&root, &root, &mut out).map(|_| out)
        })
        .await
        .map_err(std::io::Error::other)??;

        let mut refs = raw
            .into_iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, text)| parse_ref(&name, &text).map(|id| (name, id)))
            .collect::<Result<Vec<_>>>()?;
        refs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(b: u8) -> ObjectId {
        ObjectId::from_hash([b; 20])
    }

    #[tokio::test]
    async fn update_read_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRefStore::open(dir.path()).await.unwrap();
        store.update_ref("job/refs/heads/master", &oid(1)).await.unwrap();

        let text = std::fs::read_to_string(dir.path().join("job/refs/heads/master")).unwrap();
        assert_eq!(text, format!("{}\n", oid(1)));

        let reopened = FsRefStore::open(dir.path()).await.unwrap();
        assert_eq!(
            reopened.read_ref("job/refs/heads/master").await.unwrap(),
            Some(oid(1))
        );
    }

    #[tokio::test]
    async fn missing_ref_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRefStore::open(dir.path()).await.unwrap();
        assert_eq!(store.read_ref("job/refs/heads/master").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRefStore::open(dir.path()).await.unwrap();
        store.update_ref("a/refs/heads/master", &oid(1)).await.unwrap();
        store.update_ref("a/refs/heads/draft", &oid(2)).await.unwrap();
        store.update_ref("b/refs/heads/master", &oid(3)).await.unwrap();

        let listed = store.list_refs("a/refs/heads/").await.unwrap();
        let names: Vec<&str> = listed.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a/refs/heads/draft", "a/refs/heads/master"]);
    }

    #[tokio::test]
    async fn corrupt_ref_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRefStore::open(dir.path()).await.unwrap();
        std::fs::create_dir_all(dir.path().join("job/refs/heads")).unwrap();
        std::fs::write(dir.path().join("job/refs/heads/master"), "zzz\n").unwrap();
        let err = store.read_ref("job/refs/heads/master").await.unwrap_err();
        assert!(matches!(err, RefError::Corrupt { .. }));
    }

    #[test]
    fn ref_rewrite_replaces_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job/refs/heads/master");
        write_ref_file(&path, &oid(1)).unwrap();
        write_ref_file(&path, &oid(2)).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), format!("{}\n", oid(2)));
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
        sync_dir(path.parent().unwrap()).unwrap();
    }
}
