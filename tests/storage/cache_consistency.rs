//! Identifier cache stays in step with saves, removals and unloads.

use crate::common::*;
use machinestore::{BlockLocation, MachineId};

#[test]
fn save_records_location_and_remove_clears_it() {
    let mut storage = memory_storage();
    let machine = furnace(12, 70, -30);
    let id = machine.id;

    storage.save(&at(&machine), machine.clone().boxed()).unwrap();
    assert_eq!(storage.location_of(id), Some(&machine.location));
    assert_eq!(storage.id_of(&at(&machine)), Some(id));
    assert!(storage.contains(&at(&machine)));

    storage.remove(&at(&machine)).unwrap();
    assert!(storage.location_of(id).is_none());
    assert!(!storage.contains(&at(&machine)));
}

#[test]
fn cache_queries_do_not_load_chunks() {
    let mut storage = memory_storage();
    let machine = furnace(50, 1, 50);
    let partition = machine.location.partition();
    storage.save(&at(&machine), machine.clone().boxed()).unwrap();
    storage.on_partition_deactivated(&partition).unwrap();

    assert!(storage.contains(&at(&machine)));
    assert_eq!(storage.location_of(machine.id), Some(&machine.location));
    assert_eq!(storage.keys().count(), 1);
    assert!(!storage.is_loaded(&partition));
}

#[test]
fn moving_a_machine_updates_both_directions() {
    let mut storage = memory_storage();
    let machine = furnace(0, 5, 0);
    let id = machine.id;
    storage.save(&at(&machine), machine.clone().boxed()).unwrap();

    let moved = storage.remove(&at(&machine)).unwrap().unwrap();
    let target = loc(40, 5, 40);
    storage.save(&target, moved).unwrap();

    assert_eq!(storage.location_of(id), Some(&BlockLocation::new("world", 40, 5, 40)));
    assert!(storage.id_of(&at(&machine)).is_none());
    assert_eq!(storage.id_of(&target), Some(id));
}

#[test]
fn cache_entries_outlive_their_chunk() {
    let mut storage = memory_storage();
    let ids: Vec<MachineId> = (0..4)
        .map(|i| {
            let machine = furnace(i * 16, 0, 0);
            let id = machine.id;
            storage.save(&at(&machine), machine.boxed()).unwrap();
            id
        })
        .collect();

    storage.flush_all().unwrap();
    assert!(storage.loaded_partitions().is_empty());

    for (i, id) in ids.iter().enumerate() {
        let expected = BlockLocation::new("world", i as i32 * 16, 0, 0);
        assert_eq!(storage.location_of(*id), Some(&expected));
    }
}

#[test]
fn cache_survives_restart() {
    let mut storage = memory_storage();
    let machine = furnace(-100, 30, 77);
    storage.save(&at(&machine), machine.clone().boxed()).unwrap();
    storage.flush_all().unwrap();

    let mut restarted = reopen(
        storage.partition_store().clone(),
        storage.cache_backend().clone(),
        &["furnace"],
    );

    assert_eq!(restarted.location_of(machine.id), Some(&machine.location));
    let report = restarted
        .on_partition_activated(&machine.location.partition())
        .unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(
        restarted.get_by_id(machine.id).unwrap().map(|m| m.id()),
        Some(machine.id)
    );
}

#[test]
fn saving_elsewhere_without_removing_moves_the_machine() {
    let mut storage = memory_storage();
    let machine = furnace(0, 5, 0);
    storage.save(&at(&machine), machine.clone().boxed()).unwrap();

    let target = loc(40, 5, 40);
    storage.save(&target, machine.clone().boxed()).unwrap();

    // The copy in the old chunk is evicted
    assert!(storage.get(&at(&machine)).unwrap().is_none());

    storage.flush_all().unwrap();
    assert_eq!(
        storage.location_of(machine.id),
        Some(&BlockLocation::new("world", 40, 5, 40))
    );
    assert!(!storage.contains(&at(&machine)));
}

#[test]
fn stale_copy_in_another_chunk_does_not_steal_the_cache() {
    let mut storage = memory_storage();
    let machine = furnace(0, 5, 0);
    let old_partition = machine.location.partition();
    storage.save(&at(&machine), machine.clone().boxed()).unwrap();
    storage.on_partition_deactivated(&old_partition).unwrap();

    let target = loc(40, 5, 40);
    storage.save(&target, machine.clone().boxed()).unwrap();

    // The persisted copy comes back with the old chunk
    storage.on_partition_activated(&old_partition).unwrap();
    storage.flush_all().unwrap();

    assert_eq!(
        storage.location_of(machine.id),
        Some(&BlockLocation::new("world", 40, 5, 40))
    );
    assert_eq!(storage.id_of(&target), Some(machine.id));
}
