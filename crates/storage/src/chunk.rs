//! Materialized view of one partition's machines
//!
//! An [`InMemoryChunk`] exists only while its partition is loaded. It owns the
//! live machines of the partition plus the raw records that could not be
//! materialized, keyed by block location. The binary index is not stored
//! separately: [`InMemoryChunk::index`] derives it from the live state, so the
//! index and data written on flush always describe the same set of machines.

use machinestore_core::{
    BlockLocation, Error, FactoryLookup, Machine, MachineId, PartitionKey, Result,
};
use machinestore_durability::{
    encode_records, BinaryIndexCodec, ChunkMachineIndex, MachineRecord, MachineRecordCodec,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{error, warn};

/// A persisted record that could not be turned into a machine.
///
/// Kept byte-for-byte so it can be written back unchanged on flush.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedRecord {
    /// Machine identifier from the record
    pub id: MachineId,
    /// Type tag from the record
    pub type_tag: String,
    /// Encoded record
    pub bytes: Vec<u8>,
}

/// Outcome of loading (or re-activating) a partition.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    /// Partition that was activated
    pub partition: PartitionKey,
    /// Generation of the chunk serving the partition
    pub generation: u64,
    /// True if the partition was already loaded and nothing was read
    pub already_loaded: bool,
    /// Machines materialized
    pub machines: usize,
    /// Records whose type tag has no registered factory
    pub unresolved: Vec<(BlockLocation, String)>,
    /// Records that could not be decoded or materialized for other reasons
    pub failed_records: usize,
    /// Decoded records the chunk did not keep, by id and recorded location
    pub dropped: Vec<(MachineId, BlockLocation)>,
    /// Index entries with no matching record
    pub missing_records: Vec<BlockLocation>,
    /// Records that disagree with the index (absent from it or different type)
    pub inconsistent: usize,
    /// Machines whose identifier cache entry points somewhere else
    pub cache_mismatches: usize,
}

impl LoadReport {
    pub(crate) fn empty(partition: PartitionKey, generation: u64) -> Self {
        Self {
            partition,
            generation,
            already_loaded: false,
            machines: 0,
            unresolved: Vec::new(),
            failed_records: 0,
            dropped: Vec::new(),
            missing_records: Vec::new(),
            inconsistent: 0,
            cache_mismatches: 0,
        }
    }

    /// Report for a partition that was already loaded
    pub fn already_loaded(chunk: &InMemoryChunk) -> Self {
        Self {
            already_loaded: true,
            machines: chunk.len(),
            ..Self::empty(chunk.partition().clone(), chunk.generation())
        }
    }

    /// Returns true if every persisted record became a machine and agreed
    /// with the index
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
            && self.failed_records == 0
            && self.missing_records.is_empty()
            && self.inconsistent == 0
            && self.cache_mismatches == 0
    }
}

/// Outcome of flushing a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    /// Partition that was flushed
    pub partition: PartitionKey,
    /// Generation of the chunk that was discarded
    pub generation: u64,
    /// Machines written
    pub machines: usize,
    /// Raw unresolved records written back
    pub unresolved: usize,
    /// False when the chunk was empty and had never been persisted
    pub committed: bool,
    /// Size of the encoded index
    pub index_bytes: usize,
    /// Size of the encoded data blob
    pub data_bytes: usize,
}

/// The loaded, mutable view of one partition.
#[derive(Debug)]
pub struct InMemoryChunk {
    partition: PartitionKey,
    generation: u64,
    persisted: bool,
    machines: BTreeMap<BlockLocation, Box<dyn Machine>>,
    unresolved: BTreeMap<BlockLocation, UnresolvedRecord>,
}

impl InMemoryChunk {
    /// Create an empty chunk for a partition with no persisted machines
    pub fn new(partition: PartitionKey, generation: u64) -> Self {
        Self {
            partition,
            generation,
            persisted: false,
            machines: BTreeMap::new(),
            unresolved: BTreeMap::new(),
        }
    }

    /// Create an empty chunk that replaces unreadable persisted data.
    ///
    /// It counts as persisted, so flushing it overwrites the old bytes even
    /// when nothing was saved into it.
    pub fn superseding(partition: PartitionKey, generation: u64) -> Self {
        Self {
            persisted: true,
            ..Self::new(partition, generation)
        }
    }

    /// Build a chunk from a decoded index and the record frames of its data
    /// blob.
    ///
    /// Failures are isolated per record: a record that cannot be decoded,
    /// lies outside the partition, or has no factory is reported and
    /// skipped, and the rest of the chunk still loads. With
    /// `preserve_unresolved` set, records that decode but cannot be
    /// materialized are kept raw and written back on flush.
    pub fn materialize(
        partition: PartitionKey,
        generation: u64,
        index: &ChunkMachineIndex,
        records: Vec<Vec<u8>>,
        factories: &dyn FactoryLookup,
        codec: &MachineRecordCodec,
        preserve_unresolved: bool,
    ) -> (Self, LoadReport) {
        let mut chunk = Self::new(partition.clone(), generation);
        chunk.persisted = true;
        let mut report = LoadReport::empty(partition, generation);
        let mut seen = BTreeSet::new();

        for bytes in records {
            let record = match codec.decode(&bytes) {
                Ok(record) => record,
                Err(e) => {
                    warn!(target: "machinestore::codec", partition = %chunk.partition, error = %e, "Skipping undecodable machine record");
                    report.failed_records += 1;
                    continue;
                }
            };

            let location = record.location.clone();
            if !chunk.partition.contains(&location) {
                warn!(target: "machinestore::codec", partition = %chunk.partition, location = %location, id = %record.id, "Skipping machine record outside its partition");
                report.failed_records += 1;
                report.dropped.push((record.id, location));
                continue;
            }
            if !seen.insert(location.clone()) {
                warn!(target: "machinestore::codec", location = %location, id = %record.id, "Skipping second machine record at one location");
                report.failed_records += 1;
                report.dropped.push((record.id, location));
                continue;
            }

            match index.get(&location) {
                Some(tag) if tag == record.type_tag => {}
                Some(tag) => {
                    error!(target: "machinestore::integrity", location = %location, index_type = tag, record_type = %record.type_tag, "Index and record disagree on machine type");
                    report.inconsistent += 1;
                }
                None => {
                    error!(target: "machinestore::integrity", location = %location, id = %record.id, "Machine record has no index entry");
                    report.inconsistent += 1;
                }
            }

            let id = record.id;
            let type_tag = record.type_tag.clone();
            match codec.materialize(record, factories) {
                Ok(machine) => {
                    chunk.machines.insert(location, machine);
                    report.machines += 1;
                }
                Err(e) => {
                    if let Error::UnknownType { type_tag } = &e {
                        warn!(target: "machinestore::codec", location = %location, id = %id, type_tag = %type_tag, "No factory registered for machine type");
                        report.unresolved.push((location.clone(), type_tag.clone()));
                    } else {
                        warn!(target: "machinestore::codec", location = %location, id = %id, error = %e, "Machine factory failed");
                        report.failed_records += 1;
                    }
                    if preserve_unresolved {
                        chunk.unresolved.insert(
                            location,
                            UnresolvedRecord {
                                id,
                                type_tag,
                                bytes,
                            },
                        );
                    } else {
                        report.dropped.push((id, location));
                    }
                }
            }
        }

        for (location, tag) in index.iter() {
            if !seen.contains(location) {
                error!(target: "machinestore::integrity", location = %location, type_tag = %tag, "Index entry has no machine record");
                report.missing_records.push(location.clone());
            }
        }

        (chunk, report)
    }

    /// Partition served by this chunk
    pub fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    /// Generation tag of this instance
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true if the chunk was built from persisted data
    pub fn was_persisted(&self) -> bool {
        self.persisted
    }

    /// Get the machine at `location`
    pub fn get_machine(&self, location: &BlockLocation) -> Option<&dyn Machine> {
        self.machines.get(location).map(|m| m.as_ref())
    }

    /// Get the machine at `location` for mutation
    pub fn get_machine_mut(
        &mut self,
        location: &BlockLocation,
    ) -> Option<&mut (dyn Machine + 'static)> {
        self.machines.get_mut(location).map(|m| m.as_mut())
    }

    /// Insert or replace the machine at `location`.
    ///
    /// Anything previously at the location, including an unresolved record,
    /// is evicted. Returns the replaced machine.
    pub fn save_machine(
        &mut self,
        location: BlockLocation,
        machine: Box<dyn Machine>,
    ) -> Result<Option<Box<dyn Machine>>> {
        if !self.partition.contains(&location) {
            return Err(Error::precondition(format!(
                "{} does not belong to partition {}",
                location, self.partition
            )));
        }
        self.unresolved.remove(&location);
        Ok(self.machines.insert(location, machine))
    }

    /// Remove whatever is stored at `location`.
    ///
    /// Returns the removed machine; an unresolved record at the location is
    /// discarded as well.
    pub fn remove_machine(&mut self, location: &BlockLocation) -> Option<Box<dyn Machine>> {
        self.unresolved.remove(location);
        self.machines.remove(location)
    }

    /// Machines in location order
    pub fn machines(&self) -> impl Iterator<Item = &dyn Machine> {
        self.machines.values().map(|m| m.as_ref())
    }

    /// Machines with the location they are stored under
    pub fn entries(&self) -> impl Iterator<Item = (&BlockLocation, &dyn Machine)> {
        self.machines.iter().map(|(l, m)| (l, m.as_ref()))
    }

    /// Raw records kept for unregistered types
    pub fn unresolved(&self) -> impl Iterator<Item = (&BlockLocation, &UnresolvedRecord)> {
        self.unresolved.iter()
    }

    /// Returns true if a machine or an unresolved record sits at `location`
    pub fn holds(&self, location: &BlockLocation) -> bool {
        self.machines.contains_key(location) || self.unresolved.contains_key(location)
    }

    /// Number of live machines
    pub fn len(&self) -> usize {
        self.machines.len()
    }

    /// Number of raw unresolved records
    pub fn unresolved_count(&self) -> usize {
        self.unresolved.len()
    }

    /// Returns true if neither machines nor unresolved records are held
    pub fn is_empty(&self) -> bool {
        self.machines.is_empty() && self.unresolved.is_empty()
    }

    /// Index describing the current contents
    pub fn index(&self) -> ChunkMachineIndex {
        let mut index = ChunkMachineIndex::new(self.partition.chunk);
        for (location, machine) in &self.machines {
            index.insert(location.clone(), machine.type_tag());
        }
        for (location, record) in &self.unresolved {
            index.insert(location.clone(), record.type_tag.as_str());
        }
        index
    }

    /// Encode the chunk into its index and data blobs.
    ///
    /// Records are written in index order under the location they are
    /// stored at, even if a machine reports a different location.
    pub fn encode(
        &self,
        index_codec: &BinaryIndexCodec,
        record_codec: &MachineRecordCodec,
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        let index = self.index();
        let index_bytes = index_codec.encode(&index)?;

        let mut encoded: Vec<Vec<u8>> = Vec::with_capacity(index.len());
        for (location, _) in index.iter() {
            if let Some(machine) = self.machines.get(location) {
                let mut record = MachineRecord::from_machine(machine.as_ref());
                record.location = location.clone();
                encoded.push(record_codec.encode_record(&record)?);
            } else if let Some(record) = self.unresolved.get(location) {
                encoded.push(record.bytes.clone());
            }
        }
        let data_bytes = encode_records(encoded.iter().map(Vec::as_slice))?;

        Ok((index_bytes, data_bytes))
    }
}
