//! In-memory persistence backends.
//!
//! Useful for tests and for hosts that mirror chunk metadata into their own
//! storage. Commits are trivially atomic: every tag of a batch lands in the
//! same map insert loop with no way to fail halfway.

use machinestore_core::{CachePersistence, CacheTable, PartitionKey, PartitionStore, Result};
use std::collections::HashMap;

/// Partition store backed by a `HashMap`
#[derive(Debug, Default, Clone)]
pub struct MemoryPartitionStore {
    partitions: HashMap<PartitionKey, HashMap<String, Vec<u8>>>,
    commits: u64,
}

impl MemoryPartitionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `commit` calls
    pub fn commit_count(&self) -> u64 {
        self.commits
    }

    /// Number of partitions holding at least one tag
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

impl PartitionStore for MemoryPartitionStore {
    fn get(&self, partition: &PartitionKey, tag: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .partitions
            .get(partition)
            .and_then(|tags| tags.get(tag))
            .cloned())
    }

    fn set(&mut self, partition: &PartitionKey, tag: &str, bytes: Vec<u8>) -> Result<()> {
        self.partitions
            .entry(partition.clone())
            .or_default()
            .insert(tag.to_string(), bytes);
        Ok(())
    }

    fn commit(&mut self, partition: &PartitionKey, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
        let tags = self.partitions.entry(partition.clone()).or_default();
        for (tag, bytes) in entries {
            tags.insert(tag, bytes);
        }
        self.commits += 1;
        Ok(())
    }
}

/// Cache backend that keeps the last saved table in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryCacheBackend {
    table: Option<CacheTable>,
    saves: u64,
}

impl MemoryCacheBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that already holds `table`
    pub fn with_table(table: CacheTable) -> Self {
        Self {
            table: Some(table),
            saves: 0,
        }
    }

    /// Number of `save` calls
    pub fn save_count(&self) -> u64 {
        self.saves
    }
}

impl CachePersistence for MemoryCacheBackend {
    fn save(&mut self, table: &CacheTable) -> Result<()> {
        self.table = Some(table.clone());
        self.saves += 1;
        Ok(())
    }

    fn load(&self) -> Result<Option<CacheTable>> {
        Ok(self.table.clone())
    }
}
