//! Identifier ↔ location cache
//!
//! Process-wide bidirectional map between a machine's stable id and the block
//! it occupies. It lives independently of chunk lifecycle: unloading a chunk
//! does not evict its entries, and answering "is there a machine here" or
//! "where is machine X" never loads a chunk.
//!
//! Entries are only removed when the machine is removed. The whole table is
//! persisted at once through a [`CachePersistence`] backend.

use machinestore_core::{
    BlockLocation, CacheEntry, CachePersistence, CacheTable, MachineId, Result,
};
use rustc_hash::FxHashMap;
use tracing::warn;

/// Bidirectional id ↔ location map
///
/// Both directions are updated together, so `location_of(id) == Some(loc)`
/// iff `id_of(loc) == Some(id)`.
#[derive(Debug, Default, Clone)]
pub struct IdentifierLocationCache {
    by_id: FxHashMap<MachineId, BlockLocation>,
    by_location: FxHashMap<BlockLocation, MachineId>,
}

impl IdentifierLocationCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that machine `id` now lives at `location`.
    ///
    /// If `id` was elsewhere, its old location is released and returned.
    /// If another machine was recorded at `location`, that machine's entry is
    /// dropped (one machine per location).
    pub fn put(&mut self, id: MachineId, location: BlockLocation) -> Option<BlockLocation> {
        if let Some(displaced) = self.by_location.get(&location).copied() {
            if displaced != id {
                self.by_id.remove(&displaced);
            }
        }

        let previous = self.by_id.insert(id, location.clone());
        if let Some(old) = &previous {
            if old != &location {
                self.by_location.remove(old);
            }
        }
        self.by_location.insert(location, id);

        previous.filter(|old| {
            self.by_location
                .get(old)
                .map_or(true, |owner| *owner != id)
        })
    }

    /// Forget whatever machine is recorded at `location`
    pub fn remove(&mut self, location: &BlockLocation) -> Option<MachineId> {
        let id = self.by_location.remove(location)?;
        self.by_id.remove(&id);
        Some(id)
    }

    /// Forget machine `id`
    pub fn remove_id(&mut self, id: MachineId) -> Option<BlockLocation> {
        let location = self.by_id.remove(&id)?;
        self.by_location.remove(&location);
        Some(location)
    }

    /// Current location of machine `id`
    pub fn location_of(&self, id: MachineId) -> Option<&BlockLocation> {
        self.by_id.get(&id)
    }

    /// Id of the machine at `location`
    pub fn id_of(&self, location: &BlockLocation) -> Option<MachineId> {
        self.by_location.get(location).copied()
    }

    /// Returns true if a machine is recorded at `location`
    pub fn contains(&self, location: &BlockLocation) -> bool {
        self.by_location.contains_key(location)
    }

    /// Every location holding a machine, in no particular order
    pub fn all_locations(&self) -> impl Iterator<Item = &BlockLocation> {
        self.by_location.keys()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns true if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Whole-table image, sorted by location
    pub fn to_table(&self) -> CacheTable {
        let mut entries: Vec<CacheEntry> = self
            .by_id
            .iter()
            .map(|(id, location)| CacheEntry {
                id: *id,
                location: location.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.location.cmp(&b.location));
        CacheTable { entries }
    }

    /// Rebuild a cache from a table image.
    ///
    /// Conflicting entries (same id twice, or two ids at one location) are
    /// resolved last-writer-wins and logged.
    pub fn from_table(table: CacheTable) -> Self {
        let mut cache = Self::new();
        for entry in table.entries {
            if let Some(existing) = cache.id_of(&entry.location) {
                if existing != entry.id {
                    warn!(target: "machinestore::integrity", location = %entry.location, kept = %entry.id, dropped = %existing, "Cache table holds two machines at one location");
                }
            }
            if let Some(old) = cache.put(entry.id, entry.location.clone()) {
                warn!(target: "machinestore::integrity", id = %entry.id, kept = %entry.location, dropped = %old, "Cache table holds one machine at two locations");
            }
        }
        cache
    }

    /// Persist the whole table
    pub fn save(&self, backend: &mut dyn CachePersistence) -> Result<()> {
        backend.save(&self.to_table())
    }

    /// Load the table from `backend`; an absent table yields an empty cache
    pub fn load(backend: &dyn CachePersistence) -> Result<Self> {
        Ok(backend
            .load()?
            .map(Self::from_table)
            .unwrap_or_default())
    }
}
