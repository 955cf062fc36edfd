//! Per-chunk machine index: location → type tag.
//!
//! The index is stored under the partition's index tag, separately from the
//! machine data blob. It answers "which machine types live where" without
//! decoding any machine state.
//!
//! # Binary Format (big-endian)
//!
//! ```text
//! version(1) + chunk_x(i32) + chunk_z(i32) + has_machines(1)
//! if has_machines:
//!   entry_count(u32)
//!   entry_count × [
//!     type_len(u32) + type_tag(UTF-8)
//!     + world_len(u32) + world_name(UTF-8)
//!     + rel_x(1, 0-15) + rel_y(1, 0-255) + rel_z(1, 0-15)
//!   ]
//! ```
//!
//! Lengths are byte lengths. An empty index is exactly 10 bytes:
//! `has_machines = 0` and nothing after it.
//!
//! # Compatibility
//!
//! There is none. A version byte other than [`INDEX_FORMAT_VERSION`] is a
//! hard [`FormatError::UnsupportedVersion`]; the decoder does not look at
//! anything past the chunk coordinates in that case.

use super::len_u32;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use machinestore_core::{BlockLocation, ChunkCoord, FormatError, Result, CHUNK_SIZE};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// Current (and only) index format version.
pub const INDEX_FORMAT_VERSION: u8 = 0;

/// Size of the fixed header: version + chunk_x + chunk_z + has_machines.
pub const INDEX_HEADER_SIZE: usize = 10;

/// Highest block Y the one-byte `rel_y` field can hold.
pub const MAX_BLOCK_Y: i32 = u8::MAX as i32;

/// Mapping from machine location to type tag for one chunk.
///
/// Entries are kept ordered so that encoding the same logical index always
/// produces the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMachineIndex {
    chunk: ChunkCoord,
    entries: BTreeMap<BlockLocation, String>,
}

impl ChunkMachineIndex {
    /// Create an empty index for `chunk`
    pub fn new(chunk: ChunkCoord) -> Self {
        Self {
            chunk,
            entries: BTreeMap::new(),
        }
    }

    /// Chunk this index describes
    pub fn chunk(&self) -> ChunkCoord {
        self.chunk
    }

    /// Insert or replace the entry at `location`, returning the old type tag
    pub fn insert(
        &mut self,
        location: BlockLocation,
        type_tag: impl Into<String>,
    ) -> Option<String> {
        self.entries.insert(location, type_tag.into())
    }

    /// Remove the entry at `location`
    pub fn remove(&mut self, location: &BlockLocation) -> Option<String> {
        self.entries.remove(location)
    }

    /// Type tag stored at `location`
    pub fn get(&self, location: &BlockLocation) -> Option<&str> {
        self.entries.get(location).map(String::as_str)
    }

    /// Returns true if an entry exists at `location`
    pub fn contains(&self, location: &BlockLocation) -> bool {
        self.entries.contains_key(location)
    }

    /// Iterate entries in location order
    pub fn iter(&self) -> btree_map::Iter<'_, BlockLocation, String> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the index has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Encoder/decoder for [`ChunkMachineIndex`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryIndexCodec;

impl BinaryIndexCodec {
    /// Encode an index.
    ///
    /// Fails if an entry lies outside the index's chunk or has a Y the
    /// format cannot represent. Nothing is written on failure.
    pub fn encode(&self, index: &ChunkMachineIndex) -> Result<Vec<u8>> {
        for location in index.entries.keys() {
            check_encodable(index.chunk, location)?;
        }

        let mut buf = Vec::with_capacity(INDEX_HEADER_SIZE + index.len() * 32);
        buf.write_u8(INDEX_FORMAT_VERSION)?;
        buf.write_i32::<BigEndian>(index.chunk.x)?;
        buf.write_i32::<BigEndian>(index.chunk.z)?;

        if index.is_empty() {
            buf.write_u8(0)?;
            return Ok(buf);
        }

        buf.write_u8(1)?;
        buf.write_u32::<BigEndian>(len_u32(index.len(), "entry_count")?)?;
        for (location, type_tag) in &index.entries {
            write_str(&mut buf, type_tag, "type_tag")?;
            write_str(&mut buf, &location.world, "world_name")?;
            let (rel_x, y, rel_z) = location.relative();
            buf.write_u8(rel_x)?;
            buf.write_u8(y as u8)?;
            buf.write_u8(rel_z)?;
        }
        Ok(buf)
    }

    /// Decode an index.
    ///
    /// Either returns the complete index or an error; a partially populated
    /// index is never observable.
    pub fn decode(&self, bytes: &[u8]) -> std::result::Result<ChunkMachineIndex, FormatError> {
        let mut cursor = bytes;

        let version = cursor
            .read_u8()
            .map_err(|_| FormatError::Truncated { field: "version" })?;
        if version != INDEX_FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion {
                expected: INDEX_FORMAT_VERSION,
                actual: version,
            });
        }

        let chunk_x = cursor
            .read_i32::<BigEndian>()
            .map_err(|_| FormatError::Truncated { field: "chunk_x" })?;
        let chunk_z = cursor
            .read_i32::<BigEndian>()
            .map_err(|_| FormatError::Truncated { field: "chunk_z" })?;
        let chunk = ChunkCoord::new(chunk_x, chunk_z);
        let mut index = ChunkMachineIndex::new(chunk);

        let has_machines = match cursor.read_u8() {
            Ok(0) => false,
            Ok(1) => true,
            Ok(other) => {
                return Err(FormatError::OutOfRange {
                    field: "has_machines",
                    value: other as i64,
                })
            }
            Err(_) => {
                return Err(FormatError::Truncated {
                    field: "has_machines",
                })
            }
        };

        if has_machines {
            let count = cursor.read_u32::<BigEndian>().map_err(|_| FormatError::Truncated {
                field: "entry_count",
            })?;

            // No preallocation from `count`: it comes straight off the wire.
            for _ in 0..count {
                let type_tag = read_str(&mut cursor, "type_tag")?;
                let world = read_str(&mut cursor, "world_name")?;
                let rel_x = read_rel(&mut cursor, "rel_x")?;
                let y = cursor
                    .read_u8()
                    .map_err(|_| FormatError::Truncated { field: "rel_y" })?;
                let rel_z = read_rel(&mut cursor, "rel_z")?;

                let x = chunk.absolute_x(rel_x).ok_or(FormatError::OutOfRange {
                    field: "chunk_x",
                    value: chunk_x as i64,
                })?;
                let z = chunk.absolute_z(rel_z).ok_or(FormatError::OutOfRange {
                    field: "chunk_z",
                    value: chunk_z as i64,
                })?;

                let location = BlockLocation::new(world, x, y as i32, z);
                if index.entries.insert(location.clone(), type_tag).is_some() {
                    return Err(FormatError::Malformed(format!(
                        "duplicate index entry at {}",
                        location
                    )));
                }
            }
        }

        if !cursor.is_empty() {
            return Err(FormatError::TrailingBytes(cursor.len()));
        }
        Ok(index)
    }
}

fn check_encodable(chunk: ChunkCoord, location: &BlockLocation) -> Result<()> {
    if location.chunk() != chunk {
        return Err(FormatError::Malformed(format!(
            "{} is outside chunk {}",
            location, chunk
        ))
        .into());
    }
    if !(0..=MAX_BLOCK_Y).contains(&location.y) {
        return Err(FormatError::OutOfRange {
            field: "rel_y",
            value: location.y as i64,
        }
        .into());
    }
    Ok(())
}

fn write_str(buf: &mut Vec<u8>, s: &str, field: &'static str) -> Result<()> {
    buf.write_u32::<BigEndian>(len_u32(s.len(), field)?)?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn read_str(cursor: &mut &[u8], field: &'static str) -> std::result::Result<String, FormatError> {
    let len = cursor
        .read_u32::<BigEndian>()
        .map_err(|_| FormatError::Truncated { field })? as usize;
    if cursor.len() < len {
        return Err(FormatError::Truncated { field });
    }
    let (raw, rest) = cursor.split_at(len);
    *cursor = rest;
    String::from_utf8(raw.to_vec()).map_err(|_| FormatError::InvalidUtf8 { field })
}

fn read_rel(cursor: &mut &[u8], field: &'static str) -> std::result::Result<u8, FormatError> {
    let value = cursor
        .read_u8()
        .map_err(|_| FormatError::Truncated { field })?;
    if value as i32 >= CHUNK_SIZE {
        return Err(FormatError::OutOfRange {
            field,
            value: value as i64,
        });
    }
    Ok(value)
}
