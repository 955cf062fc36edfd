//! Restart over file-backed collaborators.

use crate::common::*;
use machinestore::{
    ChunkMachineStorage, FileCacheBackend, FilePartitionStore, StorageConfig,
};
use tempfile::TempDir;

type FileStorage = ChunkMachineStorage<FilePartitionStore, FileCacheBackend>;

fn open(dir: &TempDir) -> FileStorage {
    init_tracing();
    ChunkMachineStorage::open(
        StorageConfig::default(),
        registry(&["furnace"]),
        FilePartitionStore::new(dir.path().join("partitions")),
        FileCacheBackend::in_dir(dir.path()),
    )
    .unwrap()
}

#[test]
fn machines_and_cache_survive_restart() {
    let dir = TempDir::new().unwrap();
    let machines: Vec<_> = [(37, 64, -6), (0, 0, 0), (-17, 255, 300)]
        .into_iter()
        .map(|(x, y, z)| furnace(x, y, z))
        .collect();

    {
        let mut storage = open(&dir);
        for machine in &machines {
            storage.save(&at(machine), machine.clone().boxed()).unwrap();
        }
        storage.flush_all().unwrap();
    }

    let mut storage = open(&dir);
    assert_eq!(storage.keys().count(), machines.len());
    for machine in &machines {
        assert_eq!(storage.location_of(machine.id), Some(&machine.location));
        let got = storage.get(&at(machine)).unwrap().expect("machine reloaded");
        assert_eq!(got.id(), machine.id);
        assert_eq!(got.state(), machine.state);
    }
}

#[test]
fn partition_files_follow_chunk_layout() {
    let dir = TempDir::new().unwrap();
    let mut storage = open(&dir);
    let machine = furnace(37, 64, -6);
    storage.save(&at(&machine), machine.clone().boxed()).unwrap();
    storage.flush_all().unwrap();

    assert!(dir.path().join("partitions/world/c.2.-1.mdat").exists());
    assert!(dir.path().join("machine_cache.bin").exists());
}

#[test]
fn corrupt_partition_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let machine = furnace(1, 1, 1);
    {
        let mut storage = open(&dir);
        storage.save(&at(&machine), machine.clone().boxed()).unwrap();
        storage.flush_all().unwrap();
    }

    let path = dir.path().join("partitions/world/c.0.0.mdat");
    let mut bytes = std::fs::read(&path).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();

    let mut storage = open(&dir);
    assert!(storage.get(&at(&machine)).is_err());
    assert!(!storage.is_loaded(&machine.location.partition()));
    // Cache still knows where the machine was
    assert!(storage.contains(&at(&machine)));
}
