//! Chunk data blob: the framed list of machine records.
//!
//! # Binary Format (big-endian)
//!
//! ```text
//! version(1) + record_count(u32) + record_count × [ len(u32) + record ]
//! ```
//!
//! Each record is framed on its own so that a record which cannot be
//! decoded or materialized can be skipped without losing its neighbours.
//! Frame-level damage (bad version, truncation, trailing bytes) is a
//! [`FormatError`] for the whole blob.

use super::len_u32;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use machinestore_core::{FormatError, Result};

/// Current (and only) data blob format version.
pub const DATA_FORMAT_VERSION: u8 = 0;

/// Frame already encoded records into a data blob
pub fn encode_records<'a, I>(records: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let records: Vec<&[u8]> = records.into_iter().collect();
    let payload: usize = records.iter().map(|r| r.len() + 4).sum();

    let mut buf = Vec::with_capacity(5 + payload);
    buf.write_u8(DATA_FORMAT_VERSION)?;
    buf.write_u32::<BigEndian>(len_u32(records.len(), "record_count")?)?;
    for record in records {
        buf.write_u32::<BigEndian>(len_u32(record.len(), "record_len")?)?;
        buf.extend_from_slice(record);
    }
    Ok(buf)
}

/// Split a data blob into its record frames
pub fn decode_records(bytes: &[u8]) -> std::result::Result<Vec<Vec<u8>>, FormatError> {
    let mut cursor = bytes;

    let version = cursor
        .read_u8()
        .map_err(|_| FormatError::Truncated { field: "version" })?;
    if version != DATA_FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion {
            expected: DATA_FORMAT_VERSION,
            actual: version,
        });
    }

    let count = cursor
        .read_u32::<BigEndian>()
        .map_err(|_| FormatError::Truncated {
            field: "record_count",
        })?;

    let mut records = Vec::new();
    for _ in 0..count {
        let len = cursor
            .read_u32::<BigEndian>()
            .map_err(|_| FormatError::Truncated { field: "record_len" })? as usize;
        if cursor.len() < len {
            return Err(FormatError::Truncated { field: "record" });
        }
        let (record, rest) = cursor.split_at(len);
        records.push(record.to_vec());
        cursor = rest;
    }

    if !cursor.is_empty() {
        return Err(FormatError::TrailingBytes(cursor.len()));
    }
    Ok(records)
}
