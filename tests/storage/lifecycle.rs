//! Partition activation, flush and eviction.

use crate::common::*;
use machinestore::testing::TestMachine;
use machinestore::{
    decode_records, BinaryIndexCodec, ChunkCoord, ChunkMachineStorage, Error,
    MemoryCacheBackend, PartitionEvent, PartitionKey, PartitionStore, StorageConfig,
};
use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;

#[test]
fn redundant_activation_keeps_the_same_chunk() {
    let mut storage = memory_storage();
    let machine = furnace(1, 10, 1);
    let partition = machine.location.partition();

    let first = storage.on_partition_activated(&partition).unwrap();
    storage.save(&at(&machine), machine.clone().boxed()).unwrap();
    let second = storage.on_partition_activated(&partition).unwrap();

    assert_eq!(first.generation, second.generation);
    assert!(second.already_loaded);
    assert_eq!(second.machines, 1);
    // Nothing was re-read, so the unsaved-to-disk machine is still there.
    assert_eq!(
        storage.get(&at(&machine)).unwrap().map(|m| m.id()),
        Some(machine.id)
    );
}

#[test]
fn save_replaces_machine_at_same_location() {
    let mut storage = memory_storage();
    let first = furnace(3, 3, 3);
    let second = TestMachine::new("pump", first.location.clone(), json!({"rate": 2}));
    let partition = first.location.partition();

    storage.save(&at(&first), first.clone().boxed()).unwrap();
    storage.save(&at(&second), second.clone().boxed()).unwrap();

    let machines = storage.get_by_chunk(&partition).unwrap();
    assert_eq!(machines.len(), 1);
    assert_eq!(machines[0].id(), second.id);

    assert!(storage.location_of(first.id).is_none());
    assert_eq!(storage.id_of(&at(&first)), Some(second.id));
}

#[test]
fn deactivation_persists_saved_machine_without_explicit_flush() {
    let mut storage = memory_storage();
    let machine = furnace(20, 40, 20);
    let partition = machine.location.partition();

    storage.save(&at(&machine), machine.clone().boxed()).unwrap();
    let report = storage.on_partition_deactivated(&partition).unwrap().unwrap();
    assert!(report.committed);
    assert_eq!(report.machines, 1);
    assert!(!storage.is_loaded(&partition));

    let store = storage.partition_store();
    let index = BinaryIndexCodec
        .decode(&store.get(&partition, "machine_index_tag").unwrap().unwrap())
        .unwrap();
    let records = decode_records(&store.get(&partition, "machine_data_tag").unwrap().unwrap())
        .unwrap();

    assert_eq!(index.get(&machine.location), Some("furnace"));
    assert_eq!(records.len(), 1);
    let record = machinestore::MachineRecordCodec.decode(&records[0]).unwrap();
    assert_eq!(record.id, machine.id);
    assert_eq!(record.state, machine.state);
}

#[test]
fn in_place_mutation_survives_unload() {
    let mut storage = memory_storage();
    let machine = furnace(-1, 0, -1);
    let partition = machine.location.partition();
    storage.save(&at(&machine), machine.clone().boxed()).unwrap();

    let live = storage.get_mut(&at(&machine)).unwrap().unwrap();
    live.as_any_mut()
        .downcast_mut::<TestMachine>()
        .unwrap()
        .state = json!({"fuel": 0, "smelting": "iron_ore"});

    storage.on_partition_deactivated(&partition).unwrap();
    let reloaded = storage.get(&at(&machine)).unwrap().unwrap();
    assert_eq!(reloaded.state(), json!({"fuel": 0, "smelting": "iron_ore"}));
}

#[test]
fn partitions_are_independent() {
    let mut storage = memory_storage();
    let here = furnace(0, 0, 0);
    let there = furnace(16, 0, 0);
    storage.save(&at(&here), here.clone().boxed()).unwrap();
    storage.save(&at(&there), there.clone().boxed()).unwrap();

    storage
        .on_partition_deactivated(&here.location.partition())
        .unwrap();

    assert!(!storage.is_loaded(&here.location.partition()));
    assert!(storage.is_loaded(&there.location.partition()));
    assert_eq!(storage.loaded_partitions(), vec![there.location.partition()]);
}

#[test]
fn worlds_with_the_same_chunk_do_not_collide() {
    let mut storage = memory_storage();
    let overworld = furnace(5, 5, 5);
    let nether = TestMachine::new(
        "furnace",
        machinestore::BlockLocation::new("world_nether", 5, 5, 5),
        json!({}),
    );
    storage.save(&at(&overworld), overworld.clone().boxed()).unwrap();
    storage.save(&at(&nether), nether.clone().boxed()).unwrap();

    assert_eq!(storage.loaded_partitions().len(), 2);
    assert_eq!(storage.id_of(&at(&overworld)), Some(overworld.id));
    assert_eq!(storage.id_of(&at(&nether)), Some(nether.id));
}

#[test]
fn events_drive_the_lifecycle() {
    let mut storage = memory_storage();
    let machine = furnace(8, 8, 8);
    let partition = machine.location.partition();

    storage
        .handle_event(PartitionEvent::Activated(partition.clone()))
        .unwrap();
    storage.save(&at(&machine), machine.clone().boxed()).unwrap();
    storage
        .handle_event(PartitionEvent::Deactivated(partition.clone()))
        .unwrap();

    assert!(!storage.is_loaded(&partition));
    assert_eq!(storage.partition_store().commit_count(), 1);
}

#[test]
fn flush_all_evicts_everything_and_saves_cache() {
    let mut storage = memory_storage();
    for x in [0, 16, 32] {
        let machine = furnace(x, 1, 0);
        storage.save(&at(&machine), machine.boxed()).unwrap();
    }
    assert_eq!(storage.loaded_partitions().len(), 3);

    storage.flush_all().unwrap();

    assert!(storage.loaded_partitions().is_empty());
    assert_eq!(storage.partition_store().commit_count(), 3);
    assert_eq!(storage.cache_backend().save_count(), 1);
}

#[test]
fn failed_commit_keeps_chunk_loaded() {
    init_tracing();
    let switch = Rc::new(Cell::new(true));
    let partitions = FlakyPartitionStore {
        fail_commits: Rc::clone(&switch),
        ..Default::default()
    };
    let mut storage = ChunkMachineStorage::open(
        StorageConfig::default(),
        registry(&["furnace"]),
        partitions,
        MemoryCacheBackend::new(),
    )
    .unwrap();

    let machine = furnace(4, 4, 4);
    let partition = machine.location.partition();
    storage.save(&at(&machine), machine.clone().boxed()).unwrap();

    let err = storage.on_partition_deactivated(&partition).unwrap_err();
    assert!(matches!(err, Error::Persistence(_)));
    assert!(storage.is_loaded(&partition));
    assert!(storage.get(&at(&machine)).unwrap().is_some());

    // flush_all still saves the cache and reports the failure
    assert!(storage.flush_all().is_err());
    assert!(storage.is_loaded(&partition));
    assert_eq!(storage.cache_backend().save_count(), 1);

    switch.set(false);
    storage.flush_all().unwrap();
    assert!(!storage.is_loaded(&partition));
    assert!(storage
        .partition_store()
        .get(&partition, "machine_data_tag")
        .unwrap()
        .is_some());
}

#[test]
fn location_mismatch_is_not_an_error() {
    let mut storage = memory_storage();
    let machine = furnace(100, 64, 100);
    let stored_at = loc(101, 64, 100);

    storage.save(&stored_at, machine.clone().boxed()).unwrap();

    assert_eq!(storage.id_of(&stored_at), Some(machine.id));
    assert!(storage.id_of(&at(&machine)).is_none());

    // The caller's location wins on reload as well.
    let partition = PartitionKey::new("world", ChunkCoord::new(6, 6));
    storage.on_partition_deactivated(&partition).unwrap();
    let reloaded = storage.get(&stored_at).unwrap().unwrap();
    assert_eq!(reloaded.id(), machine.id);
    assert_eq!(reloaded.location(), &stored_at.purify());
}
