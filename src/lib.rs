//! Machinestore - chunk-scoped machine storage for voxel worlds
//!
//! Machines are stateful, location-bound objects that live inside chunks.
//! Machinestore loads a chunk's machines when the chunk is first touched,
//! serves lookups by location or by stable id, and writes the chunk back as a
//! binary index plus a record blob when the host unloads it.
//!
//! # Quick Start
//!
//! ```ignore
//! use machinestore::{
//!     ChunkMachineStorage, FileCacheBackend, FilePartitionStore, Location, MachineRegistry,
//!     StorageConfig,
//! };
//!
//! let mut registry = MachineRegistry::new();
//! registry.register("furnace", Furnace::restore)?;
//!
//! let mut storage = ChunkMachineStorage::open(
//!     StorageConfig::default(),
//!     registry,
//!     FilePartitionStore::new("data/machines"),
//!     FileCacheBackend::in_dir("data"),
//! )?;
//!
//! storage.save(&Location::block("world", 37, 64, -6), Box::new(furnace))?;
//! storage.flush_all()?;
//! ```
//!
//! # Crates
//!
//! - `machinestore-core`: ids, locations, the machine/factory traits, errors
//! - `machinestore-durability`: binary index and record codecs, backends
//! - `machinestore-storage`: the cache, chunks and the orchestrator

pub use machinestore_core::{
    BlockLocation, CacheEntry, CachePersistence, CacheTable, ChunkCoord, Error, FactoryLookup,
    FormatError, Location, Machine, MachineFactory, MachineId, MachineState, PartitionKey,
    PartitionStore, Result, CHUNK_SIZE,
};
pub use machinestore_durability::{
    decode_records, encode_records, BinaryIndexCodec, ChunkMachineIndex, FileCacheBackend,
    FilePartitionStore, MachineRecord, MachineRecordCodec, MemoryCacheBackend,
    MemoryPartitionStore, DATA_FORMAT_VERSION, INDEX_FORMAT_VERSION,
};
pub use machinestore_storage::{
    ChunkMachineStorage, FlushReport, IdentifierLocationCache, InMemoryChunk, LoadReport,
    MachineRegistry, PartitionEvent, StorageConfig,
};

/// Test support re-exported for downstream crates
pub mod testing {
    pub use machinestore_core::testing::{factory_for, TestMachine};
}
