//! Core types and traits for machine storage
//!
//! This crate defines the foundational types used throughout the system:
//! - MachineId: Stable machine identifier
//! - Location / BlockLocation: Precise and purified world positions
//! - ChunkCoord / PartitionKey: Chunk grid addressing
//! - Machine / MachineFactory / FactoryLookup: Machine abstraction and rebuild seam
//! - PartitionStore / CachePersistence: Persistence collaborators
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod machine;
pub mod testing;
pub mod traits;
pub mod types;

pub use error::{Error, FormatError, Result};
pub use machine::{FactoryLookup, Machine, MachineFactory, MachineState};
pub use traits::{CacheEntry, CachePersistence, CacheTable, PartitionStore};
pub use types::{BlockLocation, ChunkCoord, Location, MachineId, PartitionKey, CHUNK_SIZE};
