//! Durable index file.
//!
//! Layout: `[magic "ARIX"] [version: u32 LE] [length: u32 LE] [crc32: u32 LE]`
//! followed by `length` bytes of bincode-encoded entries. The file is written
//! to a temporary sibling and renamed into place, so readers see either the
//! old or the new index, never a torn one.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use arbor_store::ObjectStore;
use tracing::debug;

use crate::entry::IndexEntry;
use crate::error::{IndexError, IndexResult};
use crate::index::Index;

const MAGIC: &[u8; 4] = b"ARIX";
const HEADER_SIZE: usize = 16;

impl Index {
    /// Atomically write the index to `path`.
    pub fn save(&self, path: &Path) -> IndexResult<()> {
        let entries: Vec<&IndexEntry> = self.entries.values().collect();
        let payload = bincode::serialize(&entries)
            .map_err(|e| IndexError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| IndexError::Serialization("index too large".to_string()))?;
        let crc = crc32fast::hash(&payload);

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(MAGIC)?;
        tmp.write_all(&self.version.to_le_bytes())?;
        tmp.write_all(&length.to_le_bytes())?;
        tmp.write_all(&crc.to_le_bytes())?;
        tmp.write_all(&payload)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| IndexError::Io(e.error))?;

        debug!(path = %path.display(), entries = entries.len(), "index written");
        Ok(())
    }

    /// Read an index written by [`Index::save`].
    pub fn load(path: &Path, store: Arc<dyn ObjectStore>) -> IndexResult<Index> {
        let data = fs::read(path)?;
        if data.len() < HEADER_SIZE || &data[..4] != MAGIC {
            return Err(IndexError::Corrupt("bad magic".to_string()));
        }
        let word = |at: usize| u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        let version = word(4);
        if version != Index::VERSION {
            return Err(IndexError::UnsupportedVersion(version));
        }
        let length = word(8) as usize;
        let expected_crc = word(12);

        let payload = data
            .get(HEADER_SIZE..HEADER_SIZE + length)
            .ok_or_else(|| IndexError::Corrupt("truncated payload".to_string()))?;
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            return Err(IndexError::Corrupt(format!(
                "checksum mismatch (expected {expected_crc:08x}, got {actual_crc:08x})"
            )));
        }

        let entries: Vec<IndexEntry> = bincode::deserialize(payload)
            .map_err(|e| IndexError::Serialization(e.to_string()))?;
        let mut index = Index::new(store);
        for entry in entries {
            index.entries.insert((entry.path.clone(), entry.stage), entry);
        }
        debug!(path = %path.display(), entries = index.len(), "index loaded");
        Ok(index)
    }
}
