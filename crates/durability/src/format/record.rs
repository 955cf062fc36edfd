//! Machine record serialization
//!
//! A record is one machine's persisted form: identifier, type tag, location
//! and state. Records are MessagePack maps with named fields (`uuid`,
//! `type`, `loc`, `state`), so they stay readable by tools that know nothing
//! about the machine types involved.
//!
//! Decoding is split in two steps. [`MachineRecordCodec::decode`] only checks
//! structure; [`MachineRecordCodec::materialize`] resolves the type tag
//! through a [`FactoryLookup`] and builds the machine. A record whose type has
//! no factory fails with [`Error::UnknownType`] and is never fabricated.

use machinestore_core::{
    BlockLocation, Error, FactoryLookup, Machine, MachineId, MachineState, Result,
};
use serde::{Deserialize, Serialize};

/// Persisted form of a machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineRecord {
    /// Machine identifier
    #[serde(rename = "uuid")]
    pub id: MachineId,
    /// Type tag naming the factory
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Block the machine occupies
    #[serde(rename = "loc")]
    pub location: BlockLocation,
    /// Opaque state document
    pub state: MachineState,
}

impl MachineRecord {
    /// Capture a machine's current state
    pub fn from_machine(machine: &dyn Machine) -> Self {
        Self {
            id: machine.id(),
            type_tag: machine.type_tag().to_string(),
            location: machine.location().clone(),
            state: machine.state(),
        }
    }
}

/// Encoder/decoder for [`MachineRecord`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MachineRecordCodec;

impl MachineRecordCodec {
    /// Serialize a machine's current state
    pub fn encode(&self, machine: &dyn Machine) -> Result<Vec<u8>> {
        self.encode_record(&MachineRecord::from_machine(machine))
    }

    /// Serialize an already captured record
    pub fn encode_record(&self, record: &MachineRecord) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(record)
            .map_err(|e| Error::Record(format!("failed to encode machine {}: {}", record.id, e)))
    }

    /// Parse a record without resolving its type
    pub fn decode(&self, bytes: &[u8]) -> Result<MachineRecord> {
        rmp_serde::from_slice(bytes)
            .map_err(|e| Error::Record(format!("failed to decode machine record: {}", e)))
    }

    /// Rebuild a machine through the factory registered for its type tag
    pub fn materialize(
        &self,
        record: MachineRecord,
        factories: &dyn FactoryLookup,
    ) -> Result<Box<dyn Machine>> {
        let factory = factories
            .resolve(&record.type_tag)
            .ok_or_else(|| Error::UnknownType {
                type_tag: record.type_tag.clone(),
            })?;
        factory.create(record.location, record.id, record.state)
    }
}
