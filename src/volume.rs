//! The mounted volume: backing device + geometry + the FAT engine, tying
//! the layers together behind the operation surface exposed to the mount
//! layer (spec §3 "Volume", §6).
//!
//! Grounded on the teacher crate's `fs::FileSystem` (owns the device, the
//! BPB-derived geometry, and the FAT manager; exposes geometry accessors
//! the higher `vfs`/`dir` layers call into), generalized since FATX
//! volumes carry their own partition offset/size and sector size instead
//! of trusting a fixed FAT32 BPB.

use std::cell::RefCell;
use std::fs::OpenOptions as StdOpenOptions;
use std::path::Path;
use std::rc::Rc;

use log::{error, info};

use crate::device::{Device, FileDevice};
use crate::dirent::ENTRY_SIZE;
use crate::error::{Error, Result};
use crate::fat::{Fat, FatVariant};
use crate::superblock::{Superblock, SUPERBLOCK_SIZE};

/// Derived quantities fixed at open time (spec §3 "Volume").
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub partition_offset: u64,
    pub partition_size: u64,
    pub sector_size: u32,
    pub sectors_per_cluster: u32,
    pub bytes_per_cluster: u32,
    pub total_sectors: u64,
    pub total_clusters: u32,
    pub root_cluster: u32,
    pub fat_offset: u64,
    pub fat_byte_size: u64,
    pub cluster_region_offset: u64,
    pub variant: FatVariant,
}

impl Geometry {
    fn derive(
        partition_offset: u64,
        partition_size: u64,
        sector_size: u32,
        sectors_per_cluster: u32,
        root_cluster: u32,
        fat_variant_override: Option<FatVariant>,
    ) -> Result<Self> {
        let bytes_per_cluster = sector_size
            .checked_mul(sectors_per_cluster)
            .ok_or_else(|| {
                Error::InvalidArgument("sector_size * sectors_per_cluster overflows".into())
            })?;
        let total_sectors = partition_size / sector_size as u64;

        let fat_offset = partition_offset + SUPERBLOCK_SIZE as u64;
        // First pass assuming FAT16 to estimate total_clusters, then settle
        // on the variant the cluster count actually implies (spec §3). A
        // caller-pinned `OpenOptions::fat_variant` short-circuits the
        // convergence loop to a single pass at that fixed variant.
        let mut total_clusters =
            ((partition_size - SUPERBLOCK_SIZE as u64) / bytes_per_cluster as u64) as u32;
        let mut variant =
            fat_variant_override.unwrap_or_else(|| FatVariant::for_total_clusters(total_clusters));
        loop {
            let fat_byte_size = Fat::fat_byte_size(total_clusters, variant);
            let data_region = partition_size - SUPERBLOCK_SIZE as u64 - fat_byte_size;
            let recomputed = (data_region / bytes_per_cluster as u64) as u32;
            let recomputed_variant =
                fat_variant_override.unwrap_or_else(|| FatVariant::for_total_clusters(recomputed));
            if recomputed == total_clusters && recomputed_variant == variant {
                total_clusters = recomputed;
                break;
            }
            total_clusters = recomputed;
            variant = recomputed_variant;
        }
        let fat_byte_size = Fat::fat_byte_size(total_clusters, variant);
        let cluster_region_offset = fat_offset + fat_byte_size;

        // The reserved-entry count is the fixed constant `1` (the root
        // cluster always occupies FAT index 1, never a caller-chosen
        // value), matching `FATX_FAT_RESERVED_ENTRIES_COUNT` in the
        // original implementation.
        if root_cluster > total_clusters {
            return Err(Error::InvalidArgument(format!(
                "root cluster {root_cluster} is beyond the FAT"
            )));
        }

        Ok(Self {
            partition_offset,
            partition_size,
            sector_size,
            sectors_per_cluster,
            bytes_per_cluster,
            total_sectors,
            total_clusters,
            root_cluster,
            fat_offset,
            fat_byte_size,
            cluster_region_offset,
            variant,
        })
    }

    pub fn fat_variant(&self) -> FatVariant {
        self.variant
    }

    /// `cluster_region_offset + (cluster - reserved_count) * bytes_per_cluster`
    /// (spec §4.1), where `reserved_count` is the root cluster index.
    pub fn cluster_byte_offset(&self, cluster: u32) -> Result<u64> {
        if cluster < self.root_cluster {
            return Err(Error::Corrupt(format!(
                "cluster {cluster} precedes the root cluster {}",
                self.root_cluster
            )));
        }
        let offset = self.cluster_region_offset
            + (cluster - self.root_cluster) as u64 * self.bytes_per_cluster as u64;
        if offset + self.bytes_per_cluster as u64 > self.partition_offset + self.partition_size {
            error!("cluster {cluster} maps past the end of the partition (offset {offset:#x})");
            return Err(Error::Corrupt(format!(
                "cluster {cluster} maps past the end of the partition"
            )));
        }
        Ok(offset)
    }

    pub fn entries_per_cluster(&self) -> u32 {
        self.bytes_per_cluster / ENTRY_SIZE as u32
    }
}

/// Open/format configuration (spec §10.3 "OpenOptions"). `sectors_per_cluster`
/// and `fat_variant` only take effect on [`Volume::format`]/[`Volume::format_file`],
/// where they override the value the caller passed positionally / the
/// variant the cluster count would otherwise imply; `Volume::open`/[`Volume::open_file`]
/// always read geometry from the on-disk superblock and ignore them.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub partition_offset: u64,
    pub partition_size: u64,
    pub sector_size: u32,
    pub sectors_per_cluster: Option<u32>,
    pub fat_variant: Option<FatVariant>,
}

impl OpenOptions {
    pub fn new(partition_offset: u64, partition_size: u64) -> Self {
        Self {
            partition_offset,
            partition_size,
            sector_size: 512,
            sectors_per_cluster: None,
            fat_variant: None,
        }
    }

    pub fn sector_size(mut self, sector_size: u32) -> Self {
        self.sector_size = sector_size;
        self
    }

    /// Format-only override for the cluster size, in sectors (spec §10.3).
    pub fn sectors_per_cluster(mut self, sectors_per_cluster: u32) -> Self {
        self.sectors_per_cluster = Some(sectors_per_cluster);
        self
    }

    /// Format-only override pinning the FAT entry width instead of letting
    /// it follow from the computed cluster count (spec §10.3).
    pub fn fat_variant(mut self, fat_variant: FatVariant) -> Self {
        self.fat_variant = Some(fat_variant);
        self
    }
}

pub struct Volume {
    pub(crate) device: Rc<RefCell<dyn Device>>,
    pub(crate) superblock: Superblock,
    pub(crate) geometry: Geometry,
    pub(crate) fat: Fat,
}

#[derive(Debug, Clone, Copy)]
pub struct VolumeStat {
    pub volume_id: u32,
    pub bytes_total: u64,
    pub bytes_free: u64,
    pub bytes_per_cluster: u32,
    pub fat_variant: FatVariant,
}

impl Volume {
    /// Open a FATX partition on a plain file / block device node.
    pub fn open_file(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let file = StdOpenOptions::new().read(true).write(true).open(path)?;
        Self::open(Rc::new(RefCell::new(FileDevice::new(file))), options)
    }

    pub fn open(device: Rc<RefCell<dyn Device>>, options: OpenOptions) -> Result<Self> {
        let superblock = {
            let mut dev = device.borrow_mut();
            Superblock::read(&mut *dev, options.partition_offset)?
        };
        let geometry = Geometry::derive(
            options.partition_offset,
            options.partition_size,
            options.sector_size,
            superblock.sectors_per_cluster,
            superblock.root_cluster,
            None,
        )?;
        let variant = geometry.fat_variant();
        let fat = Fat::new(
            Rc::clone(&device),
            variant,
            geometry.fat_offset,
            geometry.total_clusters,
            geometry.root_cluster,
        );
        info!(
            "opened FATX volume id={:#010x} sectors_per_cluster={} clusters={}",
            superblock.volume_id, superblock.sectors_per_cluster, geometry.total_clusters
        );
        Ok(Self {
            device,
            superblock,
            geometry,
            fat,
        })
    }

    /// Format a fresh FATX partition and open it.
    pub fn format_file(
        path: impl AsRef<Path>,
        options: OpenOptions,
        sectors_per_cluster: u32,
    ) -> Result<Self> {
        let file = StdOpenOptions::new().read(true).write(true).open(path)?;
        Self::format(
            Rc::new(RefCell::new(FileDevice::new(file))),
            options,
            sectors_per_cluster,
        )
    }

    pub fn format(
        device: Rc<RefCell<dyn Device>>,
        options: OpenOptions,
        sectors_per_cluster: u32,
    ) -> Result<Self> {
        // `OpenOptions::sectors_per_cluster`/`fat_variant` are format-only
        // overrides (spec §10.3): when set, they take precedence over the
        // positional argument / the derived variant.
        let sectors_per_cluster = options.sectors_per_cluster.unwrap_or(sectors_per_cluster);
        let superblock = Superblock::format(sectors_per_cluster, None)?;
        {
            let mut dev = device.borrow_mut();
            superblock.write(&mut *dev, options.partition_offset)?;
        }
        let geometry = Geometry::derive(
            options.partition_offset,
            options.partition_size,
            options.sector_size,
            sectors_per_cluster,
            superblock.root_cluster,
            options.fat_variant,
        )?;
        init_fat_region(&device, &geometry)?;

        let variant = geometry.fat_variant();
        let fat = Fat::new(
            Rc::clone(&device),
            variant,
            geometry.fat_offset,
            geometry.total_clusters,
            geometry.root_cluster,
        );
        info!(
            "formatted FATX volume sectors_per_cluster={sectors_per_cluster} clusters={}",
            geometry.total_clusters
        );
        Ok(Self {
            device,
            superblock,
            geometry,
            fat,
        })
    }

    pub fn root_cluster(&self) -> u32 {
        self.geometry.root_cluster
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.geometry.bytes_per_cluster
    }

    /// Read N items from the data-cluster region.
    pub(crate) fn read_cluster_bytes(
        &mut self,
        cluster: u32,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<()> {
        let base = self.geometry.cluster_byte_offset(cluster)?;
        self.device.borrow_mut().read_at(base + offset as u64, buf)
    }

    pub(crate) fn write_cluster_bytes(
        &mut self,
        cluster: u32,
        offset: u32,
        buf: &[u8],
    ) -> Result<()> {
        let base = self.geometry.cluster_byte_offset(cluster)?;
        self.device.borrow_mut().write_at(base + offset as u64, buf)
    }

    /// Allocate a cluster via the FAT engine and, if requested, zero its
    /// data region (spec §4.3 `alloc_cluster`).
    pub(crate) fn alloc_cluster(&mut self, zeroing: bool) -> Result<u32> {
        let cluster = self.fat.alloc_cluster()?;
        if zeroing {
            let zeros = vec![0u8; self.geometry.bytes_per_cluster as usize];
            self.write_cluster_bytes(cluster, 0, &zeros)?;
        }
        Ok(cluster)
    }

    /// Flush the dirty FAT cache window (spec §4.3 `flush`); called by
    /// public operations at consistency points (spec §5).
    pub fn flush(&mut self) -> Result<()> {
        self.fat.flush()
    }

    /// Classify a single FAT entry (spec §3's classification table),
    /// for tooling that wants to walk a file's chain directly.
    pub fn fat_entry(&mut self, cluster: u32) -> Result<crate::fat::ClusterEntry> {
        self.fat.read_entry(cluster)
    }

    /// Scan the whole FAT to compute free space (spec §11 `stat`).
    pub fn stat(&mut self) -> Result<VolumeStat> {
        let mut free = 0u64;
        let first = self.geometry.root_cluster;
        let last = first + self.geometry.total_clusters;
        for cluster in first..last {
            if matches!(
                self.fat.read_entry(cluster)?,
                crate::fat::ClusterEntry::Available
            ) {
                free += 1;
            }
        }
        Ok(VolumeStat {
            volume_id: self.superblock.volume_id,
            bytes_total: self.geometry.partition_size,
            bytes_free: free * self.geometry.bytes_per_cluster as u64,
            bytes_per_cluster: self.geometry.bytes_per_cluster,
            fat_variant: self.geometry.fat_variant(),
        })
    }
}

/// Format-path FAT initialization (spec §4.3 "Initialization"): zero the
/// whole FAT in fixed-size chunks, write the media marker at index 0,
/// mark the root cluster end-of-chain, and fill the root directory's
/// cluster with the end-of-dir sentinel.
fn init_fat_region(device: &Rc<RefCell<dyn Device>>, geometry: &Geometry) -> Result<()> {
    const MEDIA_MARKER: u32 = 0xFFFF_FFF8;

    let chunk_size = (16 * 1024).max(geometry.fat_byte_size / 256) as usize;
    let zeros = vec![0u8; chunk_size];
    let mut written = 0u64;
    while written < geometry.fat_byte_size {
        let this_chunk = chunk_size.min((geometry.fat_byte_size - written) as usize);
        device
            .borrow_mut()
            .write_at(geometry.fat_offset + written, &zeros[..this_chunk])?;
        written += this_chunk as u64;
    }

    let variant = geometry.fat_variant();
    let mut fat = Fat::new(
        Rc::clone(device),
        variant,
        geometry.fat_offset,
        geometry.total_clusters,
        geometry.root_cluster,
    );
    fat.write_entry(0, MEDIA_MARKER)?;
    fat.mark_end(geometry.root_cluster)?;
    fat.flush()?;

    let root_offset = geometry.cluster_byte_offset(geometry.root_cluster)?;
    let entries_per_cluster = geometry.entries_per_cluster();
    let sentinel = crate::dirent::end_of_dir_slot();
    let mut dev = device.borrow_mut();
    dev.write_at(root_offset, &sentinel)?;
    for i in 1..entries_per_cluster {
        dev.write_at(
            root_offset + i as u64 * ENTRY_SIZE as u64,
            &[0u8; ENTRY_SIZE],
        )?;
    }
    Ok(())
}
