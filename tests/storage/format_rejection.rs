//! Unreadable persisted data fails the load loudly.

use crate::common::*;
use machinestore::{
    BinaryIndexCodec, ChunkCoord, ChunkMachineIndex, Error, FormatError, MemoryCacheBackend,
    MemoryPartitionStore, PartitionKey, PartitionStore, INDEX_FORMAT_VERSION,
};

fn partition() -> PartitionKey {
    PartitionKey::new("world", ChunkCoord::new(0, 0))
}

fn store_with(tag: &str, bytes: Vec<u8>) -> MemoryPartitionStore {
    let mut store = MemoryPartitionStore::new();
    store.set(&partition(), tag, bytes).unwrap();
    store
}

#[test]
fn codec_rejects_foreign_version_without_partial_result() {
    let mut index = ChunkMachineIndex::new(ChunkCoord::new(0, 0));
    index.insert(machinestore::BlockLocation::new("world", 1, 1, 1), "furnace");
    let mut bytes = BinaryIndexCodec.encode(&index).unwrap();
    bytes[0] = INDEX_FORMAT_VERSION + 1;

    assert_eq!(
        BinaryIndexCodec.decode(&bytes),
        Err(FormatError::UnsupportedVersion {
            expected: INDEX_FORMAT_VERSION,
            actual: INDEX_FORMAT_VERSION + 1,
        })
    );
}

#[test]
fn bad_index_version_fails_activation() {
    let mut bytes = BinaryIndexCodec
        .encode(&ChunkMachineIndex::new(ChunkCoord::new(0, 0)))
        .unwrap();
    bytes[0] = 0xFF;

    let mut storage = reopen(
        store_with("machine_index_tag", bytes),
        MemoryCacheBackend::new(),
        &["furnace"],
    );

    let err = storage.on_partition_activated(&partition()).unwrap_err();
    assert!(matches!(err, Error::Format(FormatError::UnsupportedVersion { .. })));
    assert!(!storage.is_loaded(&partition()));
}

#[test]
fn truncated_index_fails_activation() {
    let mut storage = reopen(
        store_with("machine_index_tag", vec![INDEX_FORMAT_VERSION, 0, 0]),
        MemoryCacheBackend::new(),
        &["furnace"],
    );

    assert!(matches!(
        storage.on_partition_activated(&partition()),
        Err(Error::Format(FormatError::Truncated { .. }))
    ));
}

#[test]
fn bad_data_blob_fails_activation() {
    let mut storage = reopen(
        store_with("machine_data_tag", vec![9, 0, 0, 0, 0]),
        MemoryCacheBackend::new(),
        &["furnace"],
    );

    assert!(matches!(
        storage.on_partition_activated(&partition()),
        Err(Error::Format(FormatError::UnsupportedVersion { actual: 9, .. }))
    ));
    assert!(!storage.is_loaded(&partition()));
}

#[test]
fn failed_load_never_overwrites_persisted_bytes() {
    let original = vec![0xFF, 1, 2, 3];
    let mut storage = reopen(
        store_with("machine_index_tag", original.clone()),
        MemoryCacheBackend::new(),
        &["furnace"],
    );

    assert!(storage.get(&loc(1, 1, 1)).is_err());
    assert!(storage.save(&loc(1, 1, 1), furnace(1, 1, 1).boxed()).is_err());
    storage.flush_all().unwrap();

    assert_eq!(
        storage
            .partition_store()
            .get(&partition(), "machine_index_tag")
            .unwrap(),
        Some(original)
    );
    assert!(!storage.contains(&loc(1, 1, 1)));
}

#[test]
fn missing_index_loads_empty_chunk() {
    let mut storage = memory_storage();
    let report = storage.on_partition_activated(&partition()).unwrap();

    assert!(report.is_clean());
    assert_eq!(report.machines, 0);
    assert!(storage.is_loaded(&partition()));
    assert!(storage.get_by_chunk(&partition()).unwrap().is_empty());
}

#[test]
fn unreadable_partition_can_be_served_empty() {
    let machine = furnace(1, 1, 1);
    let mut seeded = memory_storage();
    seeded.save(&at(&machine), machine.clone().boxed()).unwrap();
    seeded.flush_all().unwrap();

    let unreadable = vec![0xFF, 1, 2, 3];
    let mut partitions = seeded.partition_store().clone();
    partitions
        .set(&partition(), "machine_index_tag", unreadable.clone())
        .unwrap();
    let mut storage = reopen(partitions, seeded.cache_backend().clone(), &["furnace"]);
    assert!(storage.on_partition_activated(&partition()).is_err());

    let report = storage.activate_empty(&partition());
    assert!(report.is_clean());
    assert_eq!(report.machines, 0);
    assert!(storage.is_loaded(&partition()));
    assert!(!storage.contains(&at(&machine)));
    assert!(storage.get(&at(&machine)).unwrap().is_none());

    // Untouched until the chunk is flushed
    assert_eq!(
        storage
            .partition_store()
            .get(&partition(), "machine_index_tag")
            .unwrap(),
        Some(unreadable)
    );

    let replacement = furnace(2, 2, 2);
    storage
        .save(&at(&replacement), replacement.clone().boxed())
        .unwrap();
    let flushed = storage
        .on_partition_deactivated(&partition())
        .unwrap()
        .unwrap();
    assert!(flushed.committed);

    let report = storage.on_partition_activated(&partition()).unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(report.machines, 1);
    assert_eq!(storage.id_of(&at(&replacement)), Some(replacement.id));
}

#[test]
fn empty_activation_overwrites_on_flush_even_when_unused() {
    let mut storage = reopen(
        store_with("machine_data_tag", vec![9, 0, 0, 0, 0]),
        MemoryCacheBackend::new(),
        &["furnace"],
    );
    assert!(storage.on_partition_activated(&partition()).is_err());

    storage.activate_empty(&partition());
    let flushed = storage
        .on_partition_deactivated(&partition())
        .unwrap()
        .unwrap();
    assert!(flushed.committed);
    assert_eq!(flushed.machines, 0);

    let report = storage.on_partition_activated(&partition()).unwrap();
    assert!(report.is_clean());
    assert!(storage.get_by_chunk(&partition()).unwrap().is_empty());
}

#[test]
fn empty_activation_keeps_a_loaded_chunk() {
    let mut storage = memory_storage();
    let machine = furnace(3, 3, 3);
    storage.save(&at(&machine), machine.clone().boxed()).unwrap();
    let generation = storage.generation_of(&partition());

    let report = storage.activate_empty(&partition());
    assert!(report.already_loaded);
    assert_eq!(storage.generation_of(&partition()), generation);
    assert!(storage.get(&at(&machine)).unwrap().is_some());
}
