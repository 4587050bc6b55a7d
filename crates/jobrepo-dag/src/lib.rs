//! Descendant resolution over parent-pointer hierarchies.
//!
//! Folders and components point at their parent by id. [`ParentIndex`]
//! stores such documents in an arena, and [`descendants`] computes the
//! breadth-first closure below a set of roots, failing on cycles.

pub mod dag;
pub mod error;
pub mod node;

pub use dag::{descendants, Closure, ParentIndex};
pub use error::{DagError, DagResult};
pub use node::ParentLink;
