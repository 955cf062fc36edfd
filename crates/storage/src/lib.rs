//! Chunk-scoped machine storage
//!
//! This crate ties the codecs and backends together:
//! - ChunkMachineStorage: routes access to loaded chunks, lazy loads, and
//!   flushes on partition deactivation
//! - InMemoryChunk: the materialized machines of one partition
//! - IdentifierLocationCache: id ↔ location map spanning all partitions
//! - MachineRegistry: explicit type tag → factory registration
//! - StorageConfig: partition tags and load/flush policy (`machinestore.toml`)
//!
//! # Lookups
//!
//! Machine access by location loads the owning chunk on demand. Occupancy
//! and id queries (`contains`, `location_of`, `id_of`) are answered from the
//! identifier cache and never load a chunk.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod chunk;
pub mod config;
pub mod registry;
pub mod storage;

pub use cache::IdentifierLocationCache;
pub use chunk::{FlushReport, InMemoryChunk, LoadReport, UnresolvedRecord};
pub use config::{StorageConfig, CONFIG_FILE_NAME, DEFAULT_DATA_TAG, DEFAULT_INDEX_TAG};
pub use registry::MachineRegistry;
pub use storage::{ChunkMachineStorage, PartitionEvent};
