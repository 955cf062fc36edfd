//! Checksummed file framing and crash-safe writes.
//!
//! Every file written by the file-backed stores is wrapped in the same frame:
//!
//! ```text
//! magic(4) + version(1) + payload_len(u32 BE) + payload + crc32(u32 BE)
//! ```
//!
//! The CRC covers everything before it. Files are replaced with
//! write-fsync-rename, so a reader sees either the old file or the new one.

use crate::format::len_u32;
use byteorder::{BigEndian, ReadBytesExt};
use machinestore_core::FormatError;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Current frame version.
pub const FRAME_VERSION: u8 = 1;

/// Bytes of framing around the payload.
pub const FRAME_OVERHEAD: usize = 4 + 1 + 4 + 4;

/// Errors found while unwrapping a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Data too short to contain a frame
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Expected minimum size
        expected: usize,
        /// Actual size
        actual: usize,
    },

    /// Magic bytes do not match
    #[error("invalid frame magic bytes")]
    InvalidMagic,

    /// Unsupported frame version
    #[error("unsupported frame version: {0}")]
    UnsupportedVersion(u8),

    /// Declared payload length disagrees with the file size
    #[error("frame length mismatch: declared {declared}, available {available}")]
    LengthMismatch {
        /// Length written in the header
        declared: usize,
        /// Bytes actually present
        available: usize,
    },

    /// CRC32 checksum mismatch
    #[error("frame checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// CRC stored in the file
        stored: u32,
        /// CRC computed from the data
        computed: u32,
    },
}

impl From<FrameError> for machinestore_core::Error {
    fn from(e: FrameError) -> Self {
        machinestore_core::Error::Persistence(e.to_string())
    }
}

/// Wrap `payload` in a frame tagged with `magic`
///
/// Fails if the payload is too long for the u32 length field.
pub fn seal(magic: &[u8; 4], payload: &[u8]) -> Result<Vec<u8>, FormatError> {
    let len = len_u32(payload.len(), "payload_len")?;
    let mut buf = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    buf.extend_from_slice(magic);
    buf.push(FRAME_VERSION);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(payload);

    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_be_bytes());
    Ok(buf)
}

/// Validate a frame and return its payload
pub fn open<'a>(magic: &[u8; 4], data: &'a [u8]) -> Result<&'a [u8], FrameError> {
    if data.len() < FRAME_OVERHEAD {
        return Err(FrameError::TooShort {
            expected: FRAME_OVERHEAD,
            actual: data.len(),
        });
    }

    if &data[0..4] != magic {
        return Err(FrameError::InvalidMagic);
    }
    if data[4] != FRAME_VERSION {
        return Err(FrameError::UnsupportedVersion(data[4]));
    }

    let mut len_bytes = &data[5..9];
    let declared = len_bytes.read_u32::<BigEndian>().unwrap_or_default() as usize;
    let available = data.len() - FRAME_OVERHEAD;
    if declared != available {
        return Err(FrameError::LengthMismatch {
            declared,
            available,
        });
    }

    let crc_offset = data.len() - 4;
    let mut crc_bytes = &data[crc_offset..];
    let stored = crc_bytes.read_u32::<BigEndian>().unwrap_or_default();
    let computed = crc32fast::hash(&data[..crc_offset]);
    if stored != computed {
        return Err(FrameError::ChecksumMismatch { stored, computed });
    }

    Ok(&data[9..crc_offset])
}

/// Replace `path` with `bytes` using write-fsync-rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&temp_path, path)?;

    // Sync parent directory
    if let Some(parent) = path.parent() {
        if parent.exists() {
            File::open(parent)?.sync_all()?;
        }
    }
    Ok(())
}

/// Read a whole file, mapping "not found" to `None`
pub fn read_optional(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
