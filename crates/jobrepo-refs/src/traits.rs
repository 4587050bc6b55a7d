//! The [`RefStore`] trait defining the reference storage interface.

use async_trait::async_trait;
use jobrepo_types::ObjectId;

use crate::error::Result;

/// Storage backend for named references.
///
/// Refs are the only mutable locations in a repository: each maps a fully
/// qualified name (see [`RefNamespace`](crate::RefNamespace)) to a commit id.
/// Implementations must make `update_ref` durable before it returns.
#[async_trait]
pub trait RefStore: Send + Sync {
    /// Read a ref by its fully qualified name.
    ///
    /// Returns `Ok(None)` if the ref does not exist.
    async fn read_ref(&self, name: &str) -> Result<Option<ObjectId>>;

    /// Create or move a ref to point at `id`.
    async fn update_ref(&self, name: &str, id: &ObjectId) -> Result<()>;

    /// List all refs whose name starts with `prefix`, sorted by name.
    ///
    /// Pass `""` to list every ref.
    async fn list_refs(&self, prefix: &str) -> Result<Vec<(String, ObjectId)>>;
}
