//! Foundation types for arbor.
//!
//! Every object that takes part in a merge (blobs, trees, commits) is
//! addressed by an [`ObjectId`], the BLAKE3 hash of its content. All other
//! arbor crates depend on this one.

pub mod error;
pub mod object;

pub use error::TypeError;
pub use object::ObjectId;
