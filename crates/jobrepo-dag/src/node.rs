//! The parent back-reference every indexed document exposes.

use jobrepo_types::EntityId;

/// A document that points at its parent by id.
///
/// `parent() == None` marks a root.
pub trait ParentLink {
    fn id(&self) -> &EntityId;
    fn parent(&self) -> Option<&EntityId>;
}

impl<T: ParentLink + ?Sized> ParentLink for &T {
    fn id(&self) -> &EntityId {
        (**self).id()
    }

    fn parent(&self) -> Option<&EntityId> {
        (**self).parent()
    }
}
