//! Foundation types for jobrepo.
//!
//! This crate provides the identifier and lifecycle types shared by every
//! other jobrepo crate.
//!
//! # Key Types
//!
//! - [`ObjectId`]: Content-addressed identifier (160-bit SHA-1 digest)
//! - [`EntityId`]: Identifier of a collection, folder, component, or instance
//! - [`EntityKind`]: Tagged entity kind, doubling as the record table registry
//! - [`EntityState`]: Lifecycle state of a stored version
//! - [`RecordKey`]: The `(hash, id)` storage key of one entity version

pub mod entity;
pub mod error;
pub mod object;

pub use entity::{EntityId, EntityKind, EntityState, RecordKey};
pub use error::TypeError;
pub use object::{ObjectId, OBJECT_ID_LEN};
