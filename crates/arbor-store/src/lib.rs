//! Content-addressed object storage for arbor.
//!
//! Blobs hold file contents and trees hold directory listings; both are
//! immutable and identified by a domain-separated BLAKE3 hash of their
//! serialized form. The merge engine only ever reads existing objects and
//! writes new ones, so the store is a plain key-value map keyed by
//! [`ObjectId`](arbor_types::ObjectId).
//!
//! # Key Types
//!
//! - [`ObjectStore`] -- storage trait with tree/blob adapter methods
//! - [`InMemoryObjectStore`] -- `HashMap`-backed store for tests and embedding
//! - [`Tree`] / [`TreeEntry`] / [`EntryMode`] -- one directory level
//! - [`FlatTree`] -- a whole tree flattened to `path -> (mode, id)`
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written.
//! 2. Writes are idempotent: the same content always maps to the same id.
//! 3. A missing object is an error at the adapter level
//!    ([`StoreError::NotFound`]), never silently an empty tree or blob.

pub mod error;
pub mod flat;
pub mod hasher;
pub mod memory;
pub mod object;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use flat::{file_name, join, parent_dir, FlatEntry, FlatTree};
pub use hasher::ContentHasher;
pub use memory::InMemoryObjectStore;
pub use object::{Blob, EntryMode, ObjectKind, StoredObject, Tree, TreeEntry};
pub use traits::ObjectStore;
