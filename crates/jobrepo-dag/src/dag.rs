//! Arena index over parent-pointer documents and breadth-first closure.
//!
//! [`ParentIndex`] stores documents in a `Vec` arena with an id lookup table
//! and a forward-edge index (`parent -> children`), so each BFS level is a
//! set of map lookups rather than a scan over every document.

use std::collections::{HashMap, HashSet};

use jobrepo_types::EntityId;
use tracing::debug;

use crate::error::{DagError, DagResult};
use crate::node::ParentLink;

/// Arena of documents indexed by id and by parent id.
#[derive(Clone, Debug)]
pub struct ParentIndex<T> {
    docs: Vec<T>,
    by_id: HashMap<EntityId, usize>,
    children: HashMap<EntityId, Vec<usize>>,
}

impl<T> Default for ParentIndex<T> {
    fn default() -> Self {
        Self {
            docs: Vec::new(),
            by_id: HashMap::new(),
            children: HashMap::new(),
        }
    }
}

impl<T: ParentLink> ParentIndex<T> {
    /// Build an index, rejecting duplicate ids.
    pub fn build(docs: impl IntoIterator<Item = T>) -> DagResult<Self> {
        let mut index = Self::default();
        for doc in docs {
            index.insert(doc)?;
        }
        Ok(index)
    }

    /// Add one document.
    pub fn insert(&mut self, doc: T) -> DagResult<()> {
        let id = doc.id().clone();
        if self.by_id.contains_key(&id) {
            return Err(DagError::DuplicateNode(id));
        }
        let slot = self.docs.len();
        if let Some(parent) = doc.parent() {
            self.children.entry(parent.clone()).or_default().push(slot);
        }
        self.by_id.insert(id, slot);
        self.docs.push(doc);
        Ok(())
    }

    /// Look up a document by id.
    pub fn get(&self, id: &EntityId) -> Option<&T> {
        self.by_id.get(id).map(|&slot| &self.docs[slot])
    }

    /// Documents whose parent is `id`.
    pub fn children_of(&self, id: &EntityId) -> impl Iterator<Item = &T> {
        self.children
            .get(id)
            .into_iter()
            .flatten()
            .map(|&slot| &self.docs[slot])
    }

    /// Documents with no parent.
    pub fn roots(&self) -> impl Iterator<Item = &T> {
        self.docs.iter().filter(|d| d.parent().is_none())
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Result of [`descendants`]: the reached ids in BFS order plus the
/// documents for every id the index knows about.
#[derive(Debug)]
pub struct Closure<'a, T> {
    pub ids: Vec<EntityId>,
    pub docs_by_id: HashMap<EntityId, &'a T>,
}

impl<T> Closure<'_, T> {
    pub fn contains(&self, id: &EntityId) -> bool {
        self.docs_by_id.contains_key(id) || self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Breadth-first closure of the hierarchy below `roots`.
///
/// Each level's frontier is every document whose parent is in the previous
/// frontier. With `include_root == false` the roots are traversed but left
/// out of the result, unless a root also sits below another root, in which
/// case it is reported once as a descendant. Reaching a node again is a cycle
/// only when that node lies on the ancestor chain of the node that reached it.
pub fn descendants<'a, T: ParentLink>(
    index: &'a ParentIndex<T>,
    roots: &[EntityId],
    include_root: bool,
) -> DagResult<Closure<'a, T>> {
    for root in roots {
        if !root.is_path_safe() {
            return Err(DagError::InvalidRootId(root.as_str().to_string()));
        }
    }

    let seeds: HashSet<&EntityId> = roots.iter().collect();
    let mut seen: HashSet<&EntityId> = HashSet::new();
    let mut ids = Vec::new();
    let mut docs_by_id = HashMap::new();
    let mut frontier: Vec<&EntityId> = Vec::new();

    for root in roots {
        if !seen.insert(root) {
            continue;
        }
        frontier.push(root);
        if include_root {
            ids.push(root.clone());
            if let Some(doc) = index.get(root) {
                docs_by_id.insert(root.clone(), doc);
            }
        }
    }

    let mut depth = 0usize;
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for parent in frontier {
            for child in index.children_of(parent) {
                let id = child.id();
                if seen.insert(id) {
                    ids.push(id.clone());
                    docs_by_id.insert(id.clone(), child);
                    next.push(id);
                    continue;
                }
                if !seeds.contains(id) || is_ancestor(index, id, parent) {
                    return Err(DagError::CycleDetected(id.clone()));
                }
                // A root nested below another root: its subtree is already queued.
                if !include_root {
                    ids.push(id.clone());
                    docs_by_id.insert(id.clone(), child);
                }
            }
        }
        frontier = next;
        depth += 1;
    }

    debug!(roots = roots.len(), reached = ids.len(), depth, "resolved descendants");
    Ok(Closure { ids, docs_by_id })
}

/// Whether `target` is `start` or one of its ancestors.
fn is_ancestor<T: ParentLink>(index: &ParentIndex<T>, target: &EntityId, start: &EntityId) -> bool {
    let mut walked = HashSet::new();
    let mut cursor = Some(start);
    while let Some(id) = cursor {
        if id == target {
            return true;
        }
        if !walked.insert(id) {
            return false;
        }
        cursor = index.get(id).and_then(|doc| doc.parent());
    }
    false
}
