//! Tree construction for jobrepo.
//!
//! [`TreeBuilder`] turns a base tree plus a flat list of path-level changes
//! into a new root tree, loading and rewriting only the subtrees a change
//! touches. The [`read`] helpers resolve paths in committed trees.

pub mod builder;
pub mod error;
pub mod path;
pub mod read;

pub use builder::{PathChange, TreeBuilder};
pub use error::{TreeError, TreeResult};
pub use path::{join_path, split_path};
pub use read::{flatten, list_dir, lookup, read_file};
