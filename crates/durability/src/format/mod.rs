//! On-disk byte formats for chunk machine data.
//!
//! This module centralizes all serialization logic for persisted chunks.
//! Keeping serialization separate from operational logic (when chunks are
//! loaded and flushed) makes format evolution easier to manage.
//!
//! # Module Structure
//!
//! - `index`: Per-chunk location → type tag index (bit-exact binary layout)
//! - `record`: Single machine record (MessagePack document)
//! - `data`: Data blob framing the chunk's records

pub mod data;
pub mod index;
pub mod record;

pub use data::{decode_records, encode_records, DATA_FORMAT_VERSION};
pub use index::{
    BinaryIndexCodec, ChunkMachineIndex, INDEX_FORMAT_VERSION, INDEX_HEADER_SIZE, MAX_BLOCK_Y,
};
pub use record::{MachineRecord, MachineRecordCodec};

use machinestore_core::FormatError;

/// Length of `len` as a u32 length prefix
pub(crate) fn len_u32(len: usize, field: &'static str) -> Result<u32, FormatError> {
    u32::try_from(len).map_err(|_| FormatError::OutOfRange {
        field,
        value: len as i64,
    })
}
