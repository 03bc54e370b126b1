//! Spec §8 scenario 5: a root directory that outgrows its first cluster.

use std::cell::RefCell;
use std::rc::Rc;

use fatx::fat::ClusterEntry;
use fatx::{Device, MemDevice, OpenOptions, Volume};

fn make_volume() -> Volume {
    let partition_size = 32 * 1024 * 1024u64;
    let device: Rc<RefCell<dyn Device>> = Rc::new(RefCell::new(MemDevice::new(
        (4096 + partition_size) as usize,
    )));
    let options = OpenOptions::new(0, partition_size).sector_size(512);
    Volume::format(device, options, 32).unwrap() // bytes_per_cluster = 16384, 256 entries/cluster
}

/// Surfaces the crate's `log` call sites (spec §10.1) under `RUST_LOG`;
/// harmless no-op otherwise.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn root_directory_grows_to_a_second_cluster_past_256_entries() {
    init_logging();
    let mut vol = make_volume();
    for i in 0..257 {
        vol.create_file(&format!("/f{i}")).unwrap();
    }

    let listing = vol.list_dir("/").unwrap();
    assert_eq!(listing.len(), 257);
    for i in 0..257 {
        assert!(listing
            .iter()
            .any(|a| a.filename == format!("f{i}").as_bytes()));
    }

    let root = vol.root_cluster();
    match vol.fat_entry(root).unwrap() {
        ClusterEntry::Data(next) => {
            assert_eq!(vol.fat_entry(next).unwrap(), ClusterEntry::End);
        }
        other => panic!("expected root chain to grow to a second cluster, got {other:?}"),
    }
}
