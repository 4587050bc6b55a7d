//! Attachment of entities to a job's current containment roots.

use std::collections::HashSet;

use jobrepo_dag::{descendants, ParentIndex};
use jobrepo_records::{Collection, EntityRecord, Folder};
use jobrepo_types::EntityId;

use crate::error::StatusResult;

/// The folder closure of a job's declared roots.
#[derive(Clone, Debug, Default)]
pub struct Containment {
    folders: HashSet<EntityId>,
    order: Vec<String>,
}

impl Containment {
    /// Resolve the closure below the collection's folder roots.
    ///
    /// Without a collection, or while its roots are incomplete, nothing but
    /// the collection itself is attached.
    pub fn resolve(collection: Option<&Collection>, folders: &[&Folder]) -> StatusResult<Self> {
        let Some(collection) = collection else {
            return Ok(Self::default());
        };
        let order = collection.folders.order.clone();
        let Some(roots) = collection.folder_roots() else {
            return Ok(Self {
                folders: HashSet::new(),
                order,
            });
        };

        let index = ParentIndex::build(folders.iter().copied())?;
        let roots: Vec<EntityId> = roots.values().cloned().collect();
        let closure = descendants(&index, &roots, true)?;
        Ok(Self {
            folders: closure.ids.into_iter().collect(),
            order,
        })
    }

    pub fn contains_folder(&self, id: &EntityId) -> bool {
        self.folders.contains(id)
    }

    /// Whether `record` is reachable from the current roots.
    ///
    /// A component nested under another component counts as attached; an
    /// instance needs a reachable folder for every declared folder type.
    pub fn is_attached(&self, record: &EntityRecord) -> bool {
        match record {
            EntityRecord::Collection(_) => true,
            EntityRecord::Folder(f) => self.contains_folder(&f.id),
            EntityRecord::Component(c) => {
                c.parent.is_some() || c.folder.as_ref().is_some_and(|f| self.contains_folder(f))
            }
            EntityRecord::Instance(i) => self.order.iter().all(|kind| {
                i.folders
                    .get(kind)
                    .is_some_and(|f| self.contains_folder(f))
            }),
        }
    }
}
