//! Core types for machine storage
//!
//! This module defines the foundational types:
//! - MachineId: Stable identifier assigned to a machine at creation
//! - Location: Precise world position as reported by the host engine
//! - BlockLocation: Purified (block-granular) location used as a storage key
//! - ChunkCoord: Position of a 16x16 partition in the chunk grid
//! - PartitionKey: World + chunk coordinate, identifies one partition

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Side length of a chunk in blocks.
///
/// Part of the index wire format: relative coordinates are stored as
/// `block & (CHUNK_SIZE - 1)`, so this MUST NOT change.
pub const CHUNK_SIZE: i32 = 16;

/// Unique identifier for a machine
///
/// A MachineId is a wrapper around a UUID v4. It is assigned once when the
/// machine is created and never reused, so it stays valid across moves and
/// across chunk load/unload cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MachineId(Uuid);

impl MachineId {
    /// Create a new random MachineId using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a MachineId from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse a MachineId from a string representation
    ///
    /// Returns None if the string is not a valid UUID.
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the raw bytes of this MachineId
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for MachineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A precise position in a named world.
///
/// This is what the host engine hands over (entity positions, click points).
/// It is never used as a key directly; call [`Location::purify`] first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// World name
    pub world: String,
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Z coordinate
    pub z: f64,
}

impl Location {
    /// Create a new location
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// Create a location sitting exactly on a block corner
    pub fn block(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self::new(world, x as f64, y as f64, z as f64)
    }

    /// Reduce this location to block granularity.
    ///
    /// Each axis is floored, so `(-0.5, 64.9, 3.2)` purifies to `(-1, 64, 3)`.
    pub fn purify(&self) -> BlockLocation {
        BlockLocation {
            world: self.world.clone(),
            x: self.x.floor() as i32,
            y: self.y.floor() as i32,
            z: self.z.floor() as i32,
        }
    }
}

impl From<BlockLocation> for Location {
    fn from(loc: BlockLocation) -> Self {
        Location::block(loc.world, loc.x, loc.y, loc.z)
    }
}

impl From<&BlockLocation> for Location {
    fn from(loc: &BlockLocation) -> Self {
        Location::block(loc.world.clone(), loc.x, loc.y, loc.z)
    }
}

/// A block-granular location in a named world.
///
/// This is the key type for every lookup and every persisted entry.
/// Ordering is world, then x, y, z, which keeps encoded indexes deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockLocation {
    /// World name
    pub world: String,
    /// Block X
    pub x: i32,
    /// Block Y
    pub y: i32,
    /// Block Z
    pub z: i32,
}

impl BlockLocation {
    /// Create a new block location
    pub fn new(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// The chunk containing this block
    pub fn chunk(&self) -> ChunkCoord {
        ChunkCoord::containing(self.x, self.z)
    }

    /// The partition (world + chunk) containing this block
    pub fn partition(&self) -> PartitionKey {
        PartitionKey::new(self.world.clone(), self.chunk())
    }

    /// Coordinates relative to the owning chunk's origin.
    ///
    /// X and Z are in `0..CHUNK_SIZE`; Y is passed through unchanged.
    pub fn relative(&self) -> (u8, i32, u8) {
        (
            (self.x & (CHUNK_SIZE - 1)) as u8,
            self.y,
            (self.z & (CHUNK_SIZE - 1)) as u8,
        )
    }
}

impl fmt::Display for BlockLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{},{},{}", self.world, self.x, self.y, self.z)
    }
}

/// Position of a partition in the chunk grid.
///
/// Computed with floor division, so block `-1` belongs to chunk `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkCoord {
    /// Chunk X
    pub x: i32,
    /// Chunk Z
    pub z: i32,
}

impl ChunkCoord {
    /// Create a new chunk coordinate
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The chunk containing block column `(block_x, block_z)`
    pub fn containing(block_x: i32, block_z: i32) -> Self {
        Self {
            x: block_x >> 4,
            z: block_z >> 4,
        }
    }

    /// Absolute block X for a chunk-relative X, or None on overflow
    pub fn absolute_x(&self, rel_x: u8) -> Option<i32> {
        self.x
            .checked_mul(CHUNK_SIZE)
            .and_then(|origin| origin.checked_add(rel_x as i32))
    }

    /// Absolute block Z for a chunk-relative Z, or None on overflow
    pub fn absolute_z(&self, rel_z: u8) -> Option<i32> {
        self.z
            .checked_mul(CHUNK_SIZE)
            .and_then(|origin| origin.checked_add(rel_z as i32))
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.z)
    }
}

/// Identifies one partition: a chunk in a specific world.
///
/// The host engine's chunk handles are per world, so the orchestrator keys
/// its table of loaded chunks by this rather than by [`ChunkCoord`] alone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    /// World name
    pub world: String,
    /// Chunk coordinate within the world
    pub chunk: ChunkCoord,
}

impl PartitionKey {
    /// Create a new partition key
    pub fn new(world: impl Into<String>, chunk: ChunkCoord) -> Self {
        Self {
            world: world.into(),
            chunk,
        }
    }

    /// Returns true if `location` lies inside this partition
    pub fn contains(&self, location: &BlockLocation) -> bool {
        location.world == self.world && location.chunk() == self.chunk
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.world, self.chunk)
    }
}
