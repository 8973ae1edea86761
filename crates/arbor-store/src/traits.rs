use arbor_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{Blob, StoredObject, Tree};

/// Content-addressed object store.
///
/// Implementations provide the raw `read`/`write` primitives; the tree and
/// blob adapter methods used by the merge engine are derived from them.
///
/// - Objects are immutable once written.
/// - `write` is idempotent and returns the id computed from kind and data.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read an object by its content-addressed ID.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its content-addressed ID.
    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Read and decode a tree. A missing tree is [`StoreError::NotFound`].
    fn read_tree(&self, id: &ObjectId) -> StoreResult<Tree> {
        let stored = self.read(id)?.ok_or(StoreError::NotFound(*id))?;
        Tree::from_stored_object(&stored)
    }

    /// Encode and write a tree.
    fn write_tree(&self, tree: &Tree) -> StoreResult<ObjectId> {
        self.write(&tree.to_stored_object()?)
    }

    /// Read blob content. A missing blob is [`StoreError::NotFound`].
    fn read_blob(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        let stored = self.read(id)?.ok_or(StoreError::NotFound(*id))?;
        Ok(Blob::from_stored_object(&stored)?.data)
    }

    /// Write blob content and return its id.
    fn write_blob(&self, data: &[u8]) -> StoreResult<ObjectId> {
        self.write(&Blob::new(data.to_vec()).to_stored_object())
    }

    /// Id of the empty tree, writing it if necessary.
    fn empty_tree(&self) -> StoreResult<ObjectId> {
        self.write_tree(&Tree::empty())
    }
}
