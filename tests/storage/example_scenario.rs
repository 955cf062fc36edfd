//! The chunk (2, -1) furnace scenario, end to end.

use crate::common::*;
use machinestore::{
    BinaryIndexCodec, BlockLocation, ChunkCoord, ChunkMachineIndex, PartitionKey, PartitionStore,
};

#[test]
fn index_for_chunk_2_minus_1_roundtrips() {
    let mut index = ChunkMachineIndex::new(ChunkCoord::new(2, -1));
    // Relative (5, 64, 10) in chunk (2, -1)
    index.insert(BlockLocation::new("world", 2 * 16 + 5, 64, -16 + 10), "furnace");

    let bytes = BinaryIndexCodec.encode(&index).unwrap();
    let decoded = BinaryIndexCodec.decode(&bytes).unwrap();

    assert_eq!(decoded.chunk().x, 2);
    assert_eq!(decoded.chunk().z, -1);
    assert_eq!(decoded.len(), 1);
    let (location, tag) = decoded.iter().next().unwrap();
    assert_eq!(location, &BlockLocation::new("world", 37, 64, -6));
    assert_eq!(tag, "furnace");
}

#[test]
fn furnace_at_37_64_minus_6_lands_in_chunk_2_minus_1() {
    let mut storage = memory_storage();
    let machine = furnace(37, 64, -6);
    let id = machine.id;
    let partition = PartitionKey::new("world", ChunkCoord::new(2, -1));

    storage.save(&at(&machine), machine.clone().boxed()).unwrap();
    assert!(storage.is_loaded(&partition));

    storage.on_partition_deactivated(&partition).unwrap();

    let index_bytes = storage
        .partition_store()
        .get(&partition, "machine_index_tag")
        .unwrap()
        .expect("index written");
    let index = BinaryIndexCodec.decode(&index_bytes).unwrap();
    assert_eq!(index.chunk(), ChunkCoord::new(2, -1));
    assert_eq!(index.get(&BlockLocation::new("world", 37, 64, -6)), Some("furnace"));

    let got = storage.get(&loc(37, 64, -6)).unwrap().expect("furnace reloaded");
    assert_eq!(got.id(), id);
    assert_eq!(got.state(), machine.state);
}
