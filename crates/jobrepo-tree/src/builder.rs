use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use jobrepo_store::{Blob, EntryMode, ObjectStore, ObjectStoreExt, Tree, TreeEntry};
use jobrepo_types::ObjectId;
use tracing::debug;

use crate::error::{invalid_path, TreeResult};
use crate::path::split_path;

/// One path-level edit applied by [`TreeBuilder::apply`].
///
/// A present `mode` means add or modify; `None` means delete. A change with
/// `EntryMode::Tree` ensures an (empty if new) directory exists at `path`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathChange {
    pub path: String,
    pub mode: Option<EntryMode>,
    pub content: Vec<u8>,
}

impl PathChange {
    /// Add or replace a regular file.
    pub fn upsert(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            mode: Some(EntryMode::Regular),
            content: content.into(),
        }
    }

    /// Remove whatever entry lives at `path`.
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: None,
            content: Vec::new(),
        }
    }

    /// Make sure a directory exists at `path`.
    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: Some(EntryMode::Tree),
            content: Vec::new(),
        }
    }
}

enum Slot {
    /// Entry carried over from the base tree, not yet loaded.
    Stored(EntryMode, ObjectId),
    /// New file content waiting to be written as a blob.
    Pending(EntryMode, Vec<u8>),
    /// Directory loaded into memory because a change descends into it.
    Dir(Node),
}

#[derive(Default)]
struct Node {
    entries: BTreeMap<String, Slot>,
}

type PersistFuture<'a> = Pin<Box<dyn Future<Output = TreeResult<ObjectId>> + Send + 'a>>;

/// Rebuilds trees from a base tree plus a flat list of [`PathChange`]s.
///
/// Only subtrees touched by a change are loaded and re-hashed; untouched
/// siblings keep their stored ids.
pub struct TreeBuilder<'s, S: ObjectStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: ObjectStore + ?Sized> TreeBuilder<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Apply `changes` on top of `base` (or an empty tree) and return the new root tree id.
    pub async fn apply(&self, base: Option<ObjectId>, changes: &[PathChange]) -> TreeResult<ObjectId> {
        let mut root = match base {
            Some(id) => self.load_node(&id).await?,
            None => Node::default(),
        };

        for change in changes {
            self.apply_one(&mut root, change).await?;
        }

        let id = self.persist(root).await?;
        debug!(base = ?base.map(|b| b.short_hex()), tree = %id.short_hex(), changes = changes.len(), "rebuilt tree");
        Ok(id)
    }

    async fn load_node(&self, id: &ObjectId) -> TreeResult<Node> {
        let tree: Tree = self.store.load_as(id).await?;
        let entries = tree
            .entries
            .into_iter()
            .map(|e| (e.name, Slot::Stored(e.mode, e.object_id)))
            .collect();
        Ok(Node { entries })
    }

    async fn apply_one(&self, root: &mut Node, change: &PathChange) -> TreeResult<()> {
        let components = split_path(&change.path)?;
        let Some((leaf, dirs)) = components.split_last() else {
            return Err(invalid_path(&change.path, "empty path"));
        };

        let mut node = root;
        for dir in dirs {
            node = match self.descend(node, dir, change.mode.is_some(), &change.path).await? {
                Some(child) => child,
                // Deleting below a directory that does not exist.
                None => return Ok(()),
            };
        }

        match change.mode {
            None => {
                node.entries.remove(*leaf);
            }
            Some(EntryMode::Tree) => match node.entries.get(*leaf) {
                Some(Slot::Dir(_)) | Some(Slot::Stored(EntryMode::Tree, _)) => {}
                Some(_) => {
                    return Err(invalid_path(&change.path, "a file already exists here"));
                }
                None => {
                    node.entries.insert(leaf.to_string(), Slot::Dir(Node::default()));
                }
            },
            Some(mode) => {
                if let Some(Slot::Dir(_)) | Some(Slot::Stored(EntryMode::Tree, _)) =
                    node.entries.get(*leaf)
                {
                    return Err(invalid_path(&change.path, "would replace a directory with a file"));
                }
                node.entries
                    .insert(leaf.to_string(), Slot::Pending(mode, change.content.clone()));
            }
        }
        Ok(())
    }

    /// Step into the directory `name`, loading it from the store if needed.
    ///
    /// Returns `None` when the directory is absent and `create` is false.
    async fn descend<'n>(
        &self,
        node: &'n mut Node,
        name: &str,
        create: bool,
        path: &str,
    ) -> TreeResult<Option<&'n mut Node>> {
        let loaded = match node.entries.get(name) {
            Some(Slot::Dir(_)) => None,
            Some(Slot::Stored(EntryMode::Tree, id)) => Some(self.load_node(id).await?),
            Some(_) => {
                return Err(invalid_path(
                    path,
                    format!("{name:?} is a file, not a directory"),
                ))
            }
            None if create => Some(Node::default()),
            None => return Ok(None),
        };
        if let Some(child) = loaded {
            node.entries.insert(name.to_string(), Slot::Dir(child));
        }
        match node.entries.get_mut(name) {
            Some(Slot::Dir(child)) => Ok(Some(child)),
            _ => Ok(None),
        }
    }

    /// Write a node bottom-up: pending blobs first, then subtrees, then the node itself.
    fn persist(&self, node: Node) -> PersistFuture<'_> {
        Box::pin(async move {
            let mut entries = Vec::with_capacity(node.entries.len());
            let mut dirs = Vec::new();
            for (name, slot) in node.entries {
                match slot {
                    Slot::Stored(mode, id) => entries.push(TreeEntry::new(mode, name, id)),
                    Slot::Pending(mode, content) => {
                        let id = self.store.save_as(&Blob::new(content)).await?;
                        entries.push(TreeEntry::new(mode, name, id));
                    }
                    Slot::Dir(child) => dirs.push((name, child)),
                }
            }
            for (name, child) in dirs {
                let id = self.persist(child).await?;
                entries.push(TreeEntry::new(EntryMode::Tree, name, id));
            }
            Ok(self.store.save_as(&Tree::new(entries)).await?)
        })
    }
}
