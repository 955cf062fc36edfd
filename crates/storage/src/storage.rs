//! Chunk-scoped machine storage
//!
//! [`ChunkMachineStorage`] routes every lookup and mutation to the
//! [`InMemoryChunk`] of the owning partition, loading it lazily on first
//! access, and writes it back when the host reports the partition inactive.
//! An [`IdentifierLocationCache`] spanning all partitions is kept current on
//! every mutation, so id and occupancy queries never load a chunk.
//!
//! # Lifecycle
//!
//! ```text
//!   Unloaded ──on_partition_activated / first access──▶ Loaded
//!   Loaded ──on_partition_deactivated (flush succeeded)──▶ Unloaded
//! ```
//!
//! Loaded chunks live in an explicit table keyed by [`PartitionKey`]. Each
//! load gets a fresh generation number, so a re-activation after an unload
//! is distinguishable from a redundant activation.
//!
//! # Threading
//!
//! Single-threaded by construction: every state transition takes
//! `&mut self`, and activation/deactivation events are expected on the same
//! thread that reads and writes machines.

use crate::cache::IdentifierLocationCache;
use crate::chunk::{FlushReport, InMemoryChunk, LoadReport};
use crate::config::StorageConfig;
use machinestore_core::{
    BlockLocation, CachePersistence, Error, FactoryLookup, FormatError, Location, Machine,
    MachineId, PartitionKey, PartitionStore, Result,
};
use machinestore_durability::format::MAX_BLOCK_Y;
use machinestore_durability::{
    decode_records, BinaryIndexCodec, ChunkMachineIndex, MachineRecordCodec,
};
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use tracing::{debug, error, info, warn};

/// Partition lifecycle notification from the host engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionEvent {
    /// The partition became active
    Activated(PartitionKey),
    /// The partition is about to become inactive
    Deactivated(PartitionKey),
}

/// Machine storage over partition-attached byte storage.
///
/// Collaborators are supplied at construction: the factory lookup used to
/// rebuild machines, the per-partition byte store, and the backend holding
/// the identifier cache.
pub struct ChunkMachineStorage<P, C> {
    config: StorageConfig,
    factories: Box<dyn FactoryLookup>,
    partitions: P,
    cache_backend: C,
    cache: IdentifierLocationCache,
    chunks: FxHashMap<PartitionKey, InMemoryChunk>,
    next_generation: u64,
    index_codec: BinaryIndexCodec,
    record_codec: MachineRecordCodec,
}

impl<P, C> ChunkMachineStorage<P, C>
where
    P: PartitionStore,
    C: CachePersistence,
{
    /// Open storage, loading the identifier cache from `cache_backend`.
    ///
    /// # Errors
    ///
    /// Fails on an invalid config or an unreadable cache table.
    pub fn open(
        config: StorageConfig,
        factories: impl FactoryLookup + 'static,
        partitions: P,
        cache_backend: C,
    ) -> Result<Self> {
        config.validate()?;
        let cache = IdentifierLocationCache::load(&cache_backend)?;
        debug!(target: "machinestore::storage", cached = cache.len(), "Machine storage opened");

        Ok(Self {
            config,
            factories: Box::new(factories),
            partitions,
            cache_backend,
            cache,
            chunks: FxHashMap::default(),
            next_generation: 1,
            index_codec: BinaryIndexCodec,
            record_codec: MachineRecordCodec,
        })
    }

    // ========================================================================
    // Machine access
    // ========================================================================

    /// Get the machine at `location`, loading its chunk if needed
    pub fn get(&mut self, location: &Location) -> Result<Option<&dyn Machine>> {
        let block = location.purify();
        let (chunk, _) = self.load_chunk(&block.partition())?;
        Ok(chunk.get_machine(&block))
    }

    /// Get the machine at `location` for mutation, loading its chunk if needed
    ///
    /// Changes made through the returned reference are persisted when the
    /// chunk is flushed; no explicit [`save`](Self::save) is required.
    pub fn get_mut(
        &mut self,
        location: &Location,
    ) -> Result<Option<&mut (dyn Machine + 'static)>> {
        let block = location.purify();
        let (chunk, _) = self.load_chunk(&block.partition())?;
        Ok(chunk.get_machine_mut(&block))
    }

    /// Find a machine by identifier through the cache.
    ///
    /// If the cached location holds a different machine (or none) the
    /// inconsistency is logged and `None` is returned; the cache is left
    /// untouched.
    pub fn get_by_id(&mut self, id: MachineId) -> Result<Option<&dyn Machine>> {
        let Some(block) = self.cache.location_of(id).cloned() else {
            return Ok(None);
        };
        let (chunk, _) = self.load_chunk(&block.partition())?;
        match chunk.get_machine(&block) {
            Some(machine) if machine.id() == id => Ok(Some(machine)),
            Some(machine) => {
                error!(target: "machinestore::integrity", id = %id, location = %block, found = %machine.id(), "Identifier cache points at a different machine");
                Ok(None)
            }
            None => {
                error!(target: "machinestore::integrity", id = %id, location = %block, "Identifier cache points at an empty location");
                Ok(None)
            }
        }
    }

    /// Store `machine` at `location`, replacing anything already there.
    ///
    /// The caller's location is authoritative. A machine that reports a
    /// different location is stored anyway and the mismatch is logged.
    ///
    /// If the identifier cache places the same machine at another location,
    /// the save is treated as a move: the error is logged once and a copy
    /// still held by a loaded chunk is evicted from it.
    ///
    /// # Errors
    ///
    /// Preconditions (non-empty world and type tag, Y within the encodable
    /// range) are checked before anything is touched. Loading the chunk can
    /// fail with a format or persistence error.
    pub fn save(&mut self, location: &Location, machine: Box<dyn Machine>) -> Result<()> {
        let block = location.purify();
        check_saveable(&block, &*machine)?;

        if machine.location() != &block {
            warn!(target: "machinestore::integrity", location = %block, reported = %machine.location(), id = %machine.id(), "Machine saved at a location it does not report");
        }

        let id = machine.id();
        let (chunk, _) = self.load_chunk(&block.partition())?;
        let replaced = chunk.save_machine(block.clone(), machine)?;

        if let Some(previous) = self.cache.location_of(id).filter(|l| **l != block).cloned() {
            let evicted = self.evict_stale_copy(id, &previous);
            error!(target: "machinestore::integrity", id = %id, from = %previous, to = %block, evicted, "Machine saved at a new location without being removed from the old one");
        }

        if let Some(old) = replaced {
            if old.id() != id {
                debug!(target: "machinestore::storage", location = %block, old = %old.id(), new = %id, "Machine replaced");
            }
        }
        self.cache.put(id, block);
        Ok(())
    }

    /// Remove the machine at `location`
    pub fn remove(&mut self, location: &Location) -> Result<Option<Box<dyn Machine>>> {
        let block = location.purify();
        let (chunk, _) = self.load_chunk(&block.partition())?;
        let removed = chunk.remove_machine(&block);

        let cached = self.cache.remove(&block);
        if let (Some(machine), Some(cached)) = (&removed, cached) {
            if machine.id() != cached {
                error!(target: "machinestore::integrity", location = %block, machine = %machine.id(), cached = %cached, "Removed machine does not match the identifier cache");
            }
        }
        Ok(removed)
    }

    /// All machines of a partition, loading it if needed
    pub fn get_by_chunk(&mut self, partition: &PartitionKey) -> Result<Vec<&dyn Machine>> {
        let (chunk, _) = self.load_chunk(partition)?;
        Ok(chunk.machines().collect())
    }

    // ========================================================================
    // Cache-only queries (never load a chunk)
    // ========================================================================

    /// Current location of machine `id`
    pub fn location_of(&self, id: MachineId) -> Option<&BlockLocation> {
        self.cache.location_of(id)
    }

    /// Identifier of the machine at `location`
    pub fn id_of(&self, location: &Location) -> Option<MachineId> {
        self.cache.id_of(&location.purify())
    }

    /// Returns true if a machine is recorded at `location`
    pub fn contains(&self, location: &Location) -> bool {
        self.cache.contains(&location.purify())
    }

    /// Every location holding a machine, across loaded and unloaded chunks
    pub fn keys(&self) -> impl Iterator<Item = &BlockLocation> {
        self.cache.all_locations()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load a partition's machines.
    ///
    /// Idempotent: an already loaded partition is left as is and the report
    /// carries `already_loaded = true` with the existing generation. A
    /// partition with nothing persisted loads as an empty chunk.
    ///
    /// # Errors
    ///
    /// An unreadable index or data blob fails the load with
    /// [`Error::Format`]; the partition stays unloaded. Individual bad
    /// records are reported, not propagated.
    pub fn on_partition_activated(&mut self, partition: &PartitionKey) -> Result<LoadReport> {
        let (_, report) = self.load_chunk(partition)?;
        Ok(report)
    }

    /// Serve a partition whose persisted machines cannot be read as empty.
    ///
    /// This is the host's explicit choice after
    /// [`on_partition_activated`](Self::on_partition_activated) failed with a
    /// format error. The persisted bytes are left alone until the chunk is
    /// flushed, at which point they are overwritten. Identifier cache entries
    /// inside the partition are forgotten. An already loaded partition is
    /// left as is.
    pub fn activate_empty(&mut self, partition: &PartitionKey) -> LoadReport {
        if let Some(chunk) = self.chunks.get(partition) {
            return LoadReport::already_loaded(chunk);
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let stale: Vec<BlockLocation> = self
            .cache
            .all_locations()
            .filter(|location| partition.contains(location))
            .cloned()
            .collect();
        for location in &stale {
            self.cache.remove(location);
        }

        error!(target: "machinestore::storage", partition = %partition, generation, forgotten = stale.len(), "Partition activated empty over unreadable machine data");
        self.chunks
            .insert(partition.clone(), InMemoryChunk::superseding(partition.clone(), generation));
        LoadReport::empty(partition.clone(), generation)
    }

    /// Flush a partition and drop its in-memory view.
    ///
    /// Every machine in the chunk is written, including ones mutated in
    /// place without a `save`. The index and data are committed as one unit.
    /// Returns `None` if the partition was not loaded.
    ///
    /// # Errors
    ///
    /// If encoding or the commit fails the chunk stays loaded and the error
    /// is returned.
    pub fn on_partition_deactivated(
        &mut self,
        partition: &PartitionKey,
    ) -> Result<Option<FlushReport>> {
        let Some(chunk) = self.chunks.get(partition) else {
            warn!(target: "machinestore::storage", partition = %partition, "Deactivation for a partition that is not loaded");
            return Ok(None);
        };

        for (location, machine) in chunk.entries() {
            refresh_cache(&mut self.cache, machine.id(), location);
        }
        for (location, record) in chunk.unresolved() {
            refresh_cache(&mut self.cache, record.id, location);
        }

        let mut report = FlushReport {
            partition: partition.clone(),
            generation: chunk.generation(),
            machines: chunk.len(),
            unresolved: chunk.unresolved_count(),
            committed: false,
            index_bytes: 0,
            data_bytes: 0,
        };

        if chunk.is_empty() && !chunk.was_persisted() {
            debug!(target: "machinestore::storage", partition = %partition, "Empty chunk dropped without writing");
        } else {
            let (index_bytes, data_bytes) = chunk.encode(&self.index_codec, &self.record_codec)?;
            report.index_bytes = index_bytes.len();
            report.data_bytes = data_bytes.len();

            let entries = vec![
                (self.config.index_tag.clone(), index_bytes),
                (self.config.data_tag.clone(), data_bytes),
            ];
            if let Err(e) = self.partitions.commit(partition, entries) {
                error!(target: "machinestore::storage", partition = %partition, error = %e, "Chunk flush failed, keeping it loaded");
                return Err(e);
            }
            report.committed = true;
        }

        self.chunks.remove(partition);

        if self.config.log_flush_counts {
            info!(target: "machinestore::storage", partition = %partition, machines = report.machines, unresolved = report.unresolved, "Chunk flushed");
        } else {
            debug!(target: "machinestore::storage", partition = %partition, generation = report.generation, machines = report.machines, unresolved = report.unresolved, index_bytes = report.index_bytes, data_bytes = report.data_bytes, "Chunk flushed");
        }
        Ok(Some(report))
    }

    /// Dispatch a lifecycle notification
    pub fn handle_event(&mut self, event: PartitionEvent) -> Result<()> {
        match event {
            PartitionEvent::Activated(partition) => {
                self.on_partition_activated(&partition)?;
            }
            PartitionEvent::Deactivated(partition) => {
                self.on_partition_deactivated(&partition)?;
            }
        }
        Ok(())
    }

    /// Flush every loaded chunk, then persist the identifier cache.
    ///
    /// A chunk that fails to flush stays loaded; the remaining chunks and the
    /// cache are still written and the first error is returned.
    pub fn flush_all(&mut self) -> Result<()> {
        let mut partitions = self.loaded_partitions();
        partitions.sort();

        let mut first_error = None;
        let mut flushed = 0usize;
        for partition in &partitions {
            match self.on_partition_deactivated(partition) {
                Ok(_) => flushed += 1,
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        let cache_result = self.save_cache();
        info!(target: "machinestore::storage", flushed, failed = partitions.len() - flushed, cached = self.cache.len(), "Flushed all chunks");

        match first_error {
            Some(e) => Err(e),
            None => cache_result,
        }
    }

    /// Persist the identifier cache
    pub fn save_cache(&mut self) -> Result<()> {
        self.cache.save(&mut self.cache_backend)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Returns true if `partition` is loaded
    pub fn is_loaded(&self, partition: &PartitionKey) -> bool {
        self.chunks.contains_key(partition)
    }

    /// Currently loaded partitions, in no particular order
    pub fn loaded_partitions(&self) -> Vec<PartitionKey> {
        self.chunks.keys().cloned().collect()
    }

    /// Generation of the loaded chunk serving `partition`
    pub fn generation_of(&self, partition: &PartitionKey) -> Option<u64> {
        self.chunks.get(partition).map(InMemoryChunk::generation)
    }

    /// The loaded chunk serving `partition`
    pub fn chunk(&self, partition: &PartitionKey) -> Option<&InMemoryChunk> {
        self.chunks.get(partition)
    }

    /// The identifier cache
    pub fn cache(&self) -> &IdentifierLocationCache {
        &self.cache
    }

    /// The partition byte store
    pub fn partition_store(&self) -> &P {
        &self.partitions
    }

    /// The cache persistence backend
    pub fn cache_backend(&self) -> &C {
        &self.cache_backend
    }

    /// The active configuration
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    // ========================================================================
    // Loading
    // ========================================================================

    fn load_chunk(
        &mut self,
        partition: &PartitionKey,
    ) -> Result<(&mut InMemoryChunk, LoadReport)> {
        let generation = self.next_generation;
        let vacant = match self.chunks.entry(partition.clone()) {
            Entry::Occupied(entry) => {
                let chunk = entry.into_mut();
                debug!(target: "machinestore::storage", partition = %partition, generation = chunk.generation(), "Partition already loaded");
                let report = LoadReport::already_loaded(chunk);
                return Ok((chunk, report));
            }
            Entry::Vacant(entry) => entry,
        };

        let (chunk, mut report) = read_chunk(
            &self.partitions,
            &self.config,
            &*self.factories,
            &self.index_codec,
            &self.record_codec,
            partition,
            generation,
        )?;
        self.next_generation += 1;

        forget_dropped(&mut self.cache, &chunk, &report);
        if self.config.verify_consistency_on_load {
            report.cache_mismatches = check_against_cache(&self.cache, &chunk);
        }

        if report.is_clean() {
            debug!(target: "machinestore::storage", partition = %partition, generation, machines = report.machines, "Partition loaded");
        } else {
            warn!(
                target: "machinestore::storage",
                partition = %partition,
                generation,
                machines = report.machines,
                unresolved = report.unresolved.len(),
                failed = report.failed_records,
                missing = report.missing_records.len(),
                inconsistent = report.inconsistent,
                cache_mismatches = report.cache_mismatches,
                "Partition loaded with problems"
            );
        }

        Ok((vacant.insert(chunk), report))
    }

    /// Remove machine `id` from the loaded chunk holding it at `location`.
    fn evict_stale_copy(&mut self, id: MachineId, location: &BlockLocation) -> bool {
        let Some(chunk) = self.chunks.get_mut(&location.partition()) else {
            return false;
        };
        if chunk.get_machine(location).map(|m| m.id()) != Some(id) {
            return false;
        }
        chunk.remove_machine(location);
        true
    }
}

impl<P, C> std::fmt::Debug for ChunkMachineStorage<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkMachineStorage")
            .field("config", &self.config)
            .field("loaded_chunks", &self.chunks.len())
            .field("cached_machines", &self.cache.len())
            .field("next_generation", &self.next_generation)
            .finish()
    }
}

fn check_saveable(block: &BlockLocation, machine: &dyn Machine) -> Result<()> {
    if block.world.is_empty() {
        return Err(Error::precondition("world name must not be empty"));
    }
    if machine.type_tag().is_empty() {
        return Err(Error::precondition(format!(
            "machine {} has an empty type tag",
            machine.id()
        )));
    }
    if !(0..=MAX_BLOCK_Y).contains(&block.y) {
        return Err(Error::precondition(format!(
            "y = {} is outside 0..={}",
            block.y, MAX_BLOCK_Y
        )));
    }
    Ok(())
}

/// Point the cache at a flushed machine.
///
/// An entry in another partition is kept: it comes from a later save, and
/// the flushed copy is the stale one.
fn refresh_cache(cache: &mut IdentifierLocationCache, id: MachineId, location: &BlockLocation) {
    if let Some(cached) = cache.location_of(id) {
        if cached.partition() != location.partition() {
            error!(target: "machinestore::integrity", id = %id, stale = %location, cached = %cached, "Machine held by two partitions, keeping the cached location");
            return;
        }
    }
    if let Some(previous) = cache.put(id, location.clone()) {
        warn!(target: "machinestore::integrity", id = %id, from = %previous, to = %location, "Identifier cache corrected on flush");
    }
}

/// Drop cache entries for records the freshly loaded chunk did not keep.
fn forget_dropped(
    cache: &mut IdentifierLocationCache,
    chunk: &InMemoryChunk,
    report: &LoadReport,
) {
    for (id, location) in &report.dropped {
        if cache.location_of(*id) == Some(location) {
            cache.remove_id(*id);
            warn!(target: "machinestore::integrity", id = %id, location = %location, "Forgot cached machine whose record was dropped");
        }
    }
    for location in &report.missing_records {
        if chunk.holds(location) {
            continue;
        }
        if let Some(id) = cache.remove(location) {
            warn!(target: "machinestore::integrity", id = %id, location = %location, "Forgot cached machine with no readable record");
        }
    }
}

fn read_chunk(
    partitions: &dyn PartitionStore,
    config: &StorageConfig,
    factories: &dyn FactoryLookup,
    index_codec: &BinaryIndexCodec,
    record_codec: &MachineRecordCodec,
    partition: &PartitionKey,
    generation: u64,
) -> Result<(InMemoryChunk, LoadReport)> {
    let index_bytes = partitions.get(partition, &config.index_tag)?;
    let data_bytes = partitions.get(partition, &config.data_tag)?;

    if index_bytes.is_none() && data_bytes.is_none() {
        return Ok((
            InMemoryChunk::new(partition.clone(), generation),
            LoadReport::empty(partition.clone(), generation),
        ));
    }

    let index = match index_bytes {
        Some(bytes) => {
            let index = index_codec.decode(&bytes).map_err(|e| {
                error!(target: "machinestore::codec", partition = %partition, error = %e, "Machine index is unreadable");
                e
            })?;
            if index.chunk() != partition.chunk {
                error!(target: "machinestore::codec", partition = %partition, index_chunk = %index.chunk(), "Machine index belongs to another chunk");
                return Err(FormatError::Malformed(format!(
                    "index for chunk {} stored in partition {}",
                    index.chunk(),
                    partition
                ))
                .into());
            }
            index
        }
        None => {
            error!(target: "machinestore::integrity", partition = %partition, "Machine data present without an index");
            ChunkMachineIndex::new(partition.chunk)
        }
    };

    let records = match data_bytes {
        Some(bytes) => decode_records(&bytes).map_err(|e| {
            error!(target: "machinestore::codec", partition = %partition, error = %e, "Machine data blob is unreadable");
            e
        })?,
        None => Vec::new(),
    };

    Ok(InMemoryChunk::materialize(
        partition.clone(),
        generation,
        &index,
        records,
        factories,
        record_codec,
        config.preserve_unknown_records,
    ))
}

fn check_against_cache(cache: &IdentifierLocationCache, chunk: &InMemoryChunk) -> usize {
    let mut mismatches = 0;
    for (location, machine) in chunk.entries() {
        let id = machine.id();
        match cache.location_of(id) {
            Some(cached) if cached == location => {}
            Some(cached) => {
                error!(target: "machinestore::integrity", id = %id, stored = %location, cached = %cached, "Identifier cache places machine elsewhere");
                mismatches += 1;
            }
            None => {
                warn!(target: "machinestore::integrity", id = %id, location = %location, "Loaded machine is missing from the identifier cache");
                mismatches += 1;
            }
        }
    }
    mismatches
}
