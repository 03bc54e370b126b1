//! Spec §8 scenarios 3 and 4: growing a file's cluster chain across a
//! boundary, then truncating down and back up.

use std::cell::RefCell;
use std::rc::Rc;

use fatx::fat::ClusterEntry;
use fatx::{Device, MemDevice, OpenOptions, Volume};

fn make_volume() -> Volume {
    let partition_size = 64 * 1024 * 1024u64;
    let device: Rc<RefCell<dyn Device>> = Rc::new(RefCell::new(MemDevice::new(
        (4096 + partition_size) as usize,
    )));
    let options = OpenOptions::new(0, partition_size).sector_size(512);
    // sectors_per_cluster = 16384 / 512 = 32, matching spec's bytes_per_cluster = 16384.
    Volume::format(device, options, 32).unwrap()
}

/// Surfaces the crate's `log` call sites (spec §10.1) under `RUST_LOG`;
/// harmless no-op otherwise.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn chain_from(vol: &mut Volume, first: u32) -> Vec<u32> {
    let mut chain = vec![first];
    let mut current = first;
    while let ClusterEntry::Data(next) = vol.fat_entry(current).unwrap() {
        chain.push(next);
        current = next;
    }
    chain
}

#[test]
fn grow_across_cluster_boundary() {
    init_logging();
    let mut vol = make_volume();
    assert_eq!(vol.bytes_per_cluster(), 16384);
    vol.create_file("/big").unwrap();

    let data = vec![0xABu8; 20000];
    vol.write("/big", 0, &data).unwrap();

    let attr = vol.get_attr("/big").unwrap();
    assert_eq!(attr.file_size, 20000);
    let chain = chain_from(&mut vol, attr.first_cluster);
    assert_eq!(chain.len(), 2);

    let mut buf = vec![0u8; 20000];
    vol.read("/big", 0, &mut buf).unwrap();
    assert_eq!(buf, data);
}

#[test]
fn truncate_down_then_grow_past_old_chain() {
    init_logging();
    let mut vol = make_volume();
    vol.create_file("/big").unwrap();
    vol.write("/big", 0, &vec![0xABu8; 20000]).unwrap();

    vol.truncate("/big", 4).unwrap();
    let attr = vol.get_attr("/big").unwrap();
    assert_eq!(attr.file_size, 4);
    let chain = chain_from(&mut vol, attr.first_cluster);
    assert_eq!(chain.len(), 1);

    vol.write("/big", 50000, &[0x00]).unwrap();
    let attr = vol.get_attr("/big").unwrap();
    assert_eq!(attr.file_size, 50001);
    let chain = chain_from(&mut vol, attr.first_cluster);
    assert_eq!(chain.len(), 4); // ceil(50001 / 16384) == 4
}
