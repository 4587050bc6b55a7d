use async_trait::async_trait;
use jobrepo_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectBody, StoredObject};

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written; the same body always produces the same ID.
/// - Writes are idempotent. Writing an existing object is a no-op.
/// - The store never interprets object contents.
/// - All I/O errors are propagated, never silently ignored.
///
/// There is no delete: history is append-only.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read an object by its content-addressed ID.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    async fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its content-addressed ID.
    async fn write(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Check whether an object exists in the store.
    async fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Read multiple objects in a batch.
    ///
    /// Default implementation calls `read()` for each ID.
    async fn read_batch(&self, ids: &[ObjectId]) -> StoreResult<Vec<Option<StoredObject>>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.read(id).await?);
        }
        Ok(out)
    }
}

/// Typed helpers layered over any [`ObjectStore`].
#[async_trait]
pub trait ObjectStoreExt: ObjectStore {
    /// Encode and write a typed object body.
    async fn save_as<T: ObjectBody + Sync>(&self, value: &T) -> StoreResult<ObjectId> {
        let stored = value.to_stored_object()?;
        self.write(&stored).await
    }

    /// Read and decode a typed object body, failing with `NotFound` if absent.
    async fn load_as<T: ObjectBody + Send>(&self, id: &ObjectId) -> StoreResult<T> {
        let stored = self
            .read(id)
            .await?
            .ok_or(StoreError::NotFound(*id))?;
        T::from_stored_object(&stored)
    }

    /// Read every listed object, failing with `NotFound` on the first missing one.
    async fn load_many_raw(&self, ids: &[ObjectId]) -> StoreResult<Vec<(ObjectId, StoredObject)>> {
        let objects = self.read_batch(ids).await?;
        ids.iter()
            .zip(objects)
            .map(|(id, obj)| obj.map(|o| (*id, o)).ok_or(StoreError::NotFound(*id)))
            .collect()
    }
}

impl<S: ObjectStore + ?Sized> ObjectStoreExt for S {}
