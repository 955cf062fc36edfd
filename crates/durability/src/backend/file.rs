//! File-backed persistence backends.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   <world>/
//!     c.<x>.<z>.mdat     one file per partition, all tags together
//!   machine_cache.bin    identifier cache table (FileCacheBackend)
//! ```
//!
//! A partition file holds every tag of its partition in one checksummed
//! frame (magic `MSTP`), so committing the index/data pair is a single
//! atomic rename. The payload is:
//!
//! ```text
//! section_count(u32) + section_count × [ tag_len(u32) + tag + len(u32) + bytes ]
//! ```

use super::frame::{self, write_atomic};
use crate::format::len_u32;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use machinestore_core::{
    CachePersistence, CacheTable, Error, FormatError, PartitionKey, PartitionStore, Result,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Magic bytes for partition files.
pub const PARTITION_FILE_MAGIC: &[u8; 4] = b"MSTP";

/// Magic bytes for the identifier cache file.
pub const CACHE_FILE_MAGIC: &[u8; 4] = b"MSTC";

/// Default file name for the identifier cache.
pub const CACHE_FILE_NAME: &str = "machine_cache.bin";

/// Partition store writing one file per partition under a root directory
#[derive(Debug, Clone)]
pub struct FilePartitionStore {
    root: PathBuf,
}

impl FilePartitionStore {
    /// Create a store rooted at `root`. Directories are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `partition`
    pub fn partition_path(&self, partition: &PartitionKey) -> Result<PathBuf> {
        validate_world_name(&partition.world)?;
        Ok(self.root.join(&partition.world).join(format!(
            "c.{}.{}.mdat",
            partition.chunk.x, partition.chunk.z
        )))
    }

    fn read_sections(&self, path: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
        match frame::read_optional(path)? {
            None => Ok(BTreeMap::new()),
            Some(data) => {
                let payload = frame::open(PARTITION_FILE_MAGIC, &data)?;
                Ok(decode_sections(payload)?)
            }
        }
    }

    fn write_sections(&self, path: &Path, sections: &BTreeMap<String, Vec<u8>>) -> Result<()> {
        let payload = encode_sections(sections)?;
        write_atomic(path, &frame::seal(PARTITION_FILE_MAGIC, &payload)?)?;
        Ok(())
    }
}

impl PartitionStore for FilePartitionStore {
    fn get(&self, partition: &PartitionKey, tag: &str) -> Result<Option<Vec<u8>>> {
        let path = self.partition_path(partition)?;
        Ok(self.read_sections(&path)?.remove(tag))
    }

    fn set(&mut self, partition: &PartitionKey, tag: &str, bytes: Vec<u8>) -> Result<()> {
        self.commit(partition, vec![(tag.to_string(), bytes)])
    }

    fn commit(&mut self, partition: &PartitionKey, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
        let path = self.partition_path(partition)?;
        let mut sections = self.read_sections(&path)?;
        let tags = entries.len();
        for (tag, bytes) in entries {
            sections.insert(tag, bytes);
        }
        self.write_sections(&path, &sections)?;
        debug!(target: "machinestore::durability", partition = %partition, tags, path = %path.display(), "Partition file committed");
        Ok(())
    }
}

/// Cache backend storing the whole table in one MessagePack file
#[derive(Debug, Clone)]
pub struct FileCacheBackend {
    path: PathBuf,
}

impl FileCacheBackend {
    /// Store the table at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store the table as [`CACHE_FILE_NAME`] inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(CACHE_FILE_NAME))
    }

    /// Path of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CachePersistence for FileCacheBackend {
    fn save(&mut self, table: &CacheTable) -> Result<()> {
        let payload = rmp_serde::to_vec_named(table)
            .map_err(|e| Error::Persistence(format!("failed to encode cache table: {}", e)))?;
        write_atomic(&self.path, &frame::seal(CACHE_FILE_MAGIC, &payload)?)?;
        debug!(target: "machinestore::durability", entries = table.len(), path = %self.path.display(), "Identifier cache saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<CacheTable>> {
        let Some(data) = frame::read_optional(&self.path)? else {
            return Ok(None);
        };
        let payload = frame::open(CACHE_FILE_MAGIC, &data)?;
        let table = rmp_serde::from_slice(payload)
            .map_err(|e| Error::Persistence(format!("failed to decode cache table: {}", e)))?;
        Ok(Some(table))
    }
}

fn validate_world_name(world: &str) -> Result<()> {
    let bad = world.is_empty()
        || world == "."
        || world == ".."
        || world.contains(|c| matches!(c, '/' | '\\' | '\0'));
    if bad {
        return Err(Error::precondition(format!(
            "world name {:?} cannot be used as a directory name",
            world
        )));
    }
    Ok(())
}

fn encode_sections(sections: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.write_u32::<BigEndian>(len_u32(sections.len(), "section_count")?)?;
    for (tag, bytes) in sections {
        buf.write_u32::<BigEndian>(len_u32(tag.len(), "section_tag")?)?;
        buf.extend_from_slice(tag.as_bytes());
        buf.write_u32::<BigEndian>(len_u32(bytes.len(), "section_data")?)?;
        buf.extend_from_slice(bytes);
    }
    Ok(buf)
}

fn decode_sections(payload: &[u8]) -> std::result::Result<BTreeMap<String, Vec<u8>>, FormatError> {
    let mut cursor = payload;
    let count = cursor
        .read_u32::<BigEndian>()
        .map_err(|_| FormatError::Truncated {
            field: "section_count",
        })?;

    let mut sections = BTreeMap::new();
    for _ in 0..count {
        let tag = take(&mut cursor, "section_tag")?;
        let tag = String::from_utf8(tag.to_vec()).map_err(|_| FormatError::InvalidUtf8 {
            field: "section_tag",
        })?;
        let bytes = take(&mut cursor, "section_data")?;
        sections.insert(tag, bytes.to_vec());
    }

    if !cursor.is_empty() {
        return Err(FormatError::TrailingBytes(cursor.len()));
    }
    Ok(sections)
}

fn take<'a>(
    cursor: &mut &'a [u8],
    field: &'static str,
) -> std::result::Result<&'a [u8], FormatError> {
    let len = cursor
        .read_u32::<BigEndian>()
        .map_err(|_| FormatError::Truncated { field })? as usize;
    if cursor.len() < len {
        return Err(FormatError::Truncated { field });
    }
    let (head, rest) = cursor.split_at(len);
    *cursor = rest;
    Ok(head)
}
