//! Persistence collaborator traits
//!
//! The storage layer never touches disk directly. Encoded chunk data goes
//! through a [`PartitionStore`] and the identifier cache goes through a
//! [`CachePersistence`] backend, both injected by the host.

use crate::error::Result;
use crate::types::{BlockLocation, MachineId, PartitionKey};
use serde::{Deserialize, Serialize};

/// Per-partition key-value attachment point.
///
/// Mirrors the metadata container a host engine attaches to each chunk:
/// byte values addressed by a tag name.
pub trait PartitionStore {
    /// Read the bytes stored under `tag` for `partition`
    ///
    /// Returns `Ok(None)` if nothing was ever written.
    fn get(&self, partition: &PartitionKey, tag: &str) -> Result<Option<Vec<u8>>>;

    /// Write a single tag
    fn set(&mut self, partition: &PartitionKey, tag: &str, bytes: Vec<u8>) -> Result<()>;

    /// Write several tags as one unit.
    ///
    /// Readers observe either all of `entries` or none of them. Chunk flushes
    /// use this for the index/data pair.
    fn commit(&mut self, partition: &PartitionKey, entries: Vec<(String, Vec<u8>)>) -> Result<()>;
}

/// One identifier cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Machine identifier
    pub id: MachineId,
    /// Current location of the machine
    pub location: BlockLocation,
}

/// Whole-table image of the identifier cache, as persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTable {
    /// All entries, in no particular order
    pub entries: Vec<CacheEntry>,
}

impl CacheTable {
    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Backend that stores the identifier cache wholesale.
pub trait CachePersistence {
    /// Replace the stored table
    fn save(&mut self, table: &CacheTable) -> Result<()>;

    /// Read the stored table, or None if nothing was saved yet
    fn load(&self) -> Result<Option<CacheTable>>;
}
