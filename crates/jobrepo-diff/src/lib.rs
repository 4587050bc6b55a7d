//! Diff engine for jobrepo.
//!
//! Two granularities are provided:
//!
//! - [`JsonDiff`] / [`FieldChange`] -- field-level diff between two JSON
//!   documents, used for the detailed status payload of one entity
//! - [`TreeDiff`] / [`TreeChange`] -- path-level diff between two committed
//!   trees or commits

pub mod error;
pub mod json_diff;
pub mod tree_diff;

pub use error::{DiffError, DiffResult};
pub use json_diff::{diff_json, diff_json_bytes, FieldChange, JsonDiff};
pub use tree_diff::{diff_commits, diff_tree_objects, diff_trees, TreeChange, TreeDiff};
