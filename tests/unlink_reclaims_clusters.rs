//! Spec §8 scenario 6: unlink frees every cluster in a file's chain and
//! the directory slot becomes skippable.

use std::cell::RefCell;
use std::rc::Rc;

use fatx::fat::ClusterEntry;
use fatx::{Device, MemDevice, OpenOptions, Volume};

fn make_volume() -> Volume {
    let partition_size = 16 * 1024 * 1024u64;
    let device: Rc<RefCell<dyn Device>> = Rc::new(RefCell::new(MemDevice::new(
        (4096 + partition_size) as usize,
    )));
    let options = OpenOptions::new(0, partition_size).sector_size(512);
    Volume::format(device, options, 32).unwrap()
}

/// Surfaces the crate's `log` call sites (spec §10.1) under `RUST_LOG`;
/// harmless no-op otherwise.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn unlink_reclaims_every_cluster_in_the_chain() {
    init_logging();
    let mut vol = make_volume();
    vol.create_file("/a").unwrap();
    vol.write("/a", 0, &vec![0x11u8; 33000]).unwrap();

    let attr = vol.get_attr("/a").unwrap();
    let mut chain = vec![attr.first_cluster];
    let mut current = attr.first_cluster;
    while let ClusterEntry::Data(next) = vol.fat_entry(current).unwrap() {
        chain.push(next);
        current = next;
    }
    assert!(chain.len() >= 2);

    vol.unlink("/a").unwrap();
    for cluster in &chain {
        assert_eq!(vol.fat_entry(*cluster).unwrap(), ClusterEntry::Available);
    }

    assert!(vol.list_dir("/").unwrap().is_empty());
}
