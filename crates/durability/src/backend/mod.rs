//! Persistence backends for partition bytes and the identifier cache.
//!
//! - `memory`: HashMap-backed stores for tests and embedding hosts
//! - `file`: One checksummed file per partition plus a cache file
//! - `frame`: Shared file framing and write-fsync-rename helper

pub mod file;
pub mod frame;
pub mod memory;

pub use file::{
    FileCacheBackend, FilePartitionStore, CACHE_FILE_MAGIC, CACHE_FILE_NAME, PARTITION_FILE_MAGIC,
};
pub use frame::FrameError;
pub use memory::{MemoryCacheBackend, MemoryPartitionStore};
