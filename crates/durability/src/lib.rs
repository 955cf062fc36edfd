//! Durability layer for machine storage
//!
//! This crate handles everything that turns chunk state into bytes:
//!
//! - Binary chunk index format (location → type tag, bit-exact layout)
//! - Machine record format (self-describing MessagePack documents)
//! - Data blob framing with per-record failure isolation
//! - Partition stores and identifier cache backends (memory and file)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend; // Partition stores and cache persistence backends
pub mod format; // Binary on-disk formats (index, records, data blob)

// === Re-exports ===
pub use backend::{
    FileCacheBackend, FilePartitionStore, FrameError, MemoryCacheBackend, MemoryPartitionStore,
};
pub use format::{
    decode_records, encode_records, BinaryIndexCodec, ChunkMachineIndex, MachineRecord,
    MachineRecordCodec, DATA_FORMAT_VERSION, INDEX_FORMAT_VERSION,
};
