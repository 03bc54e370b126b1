//! The 4 KiB on-disk header fixing volume geometry (spec §3, §4.2).
//!
//! Grounded on the teacher crate's `bpb::BIOSParameterBlock` (read/validate
//! at partition offset 0, derive geometry), simplified to FATX's much
//! smaller, mostly-padding header.

use log::error;

use crate::device::Device;
use crate::error::{Error, Result};

pub const SUPERBLOCK_SIZE: usize = 4096;
pub const SIGNATURE: u32 = 0x5854_4146; // "FATX" read as a little-endian u32

const SECTORS_PER_CLUSTER_VALUES: [u32; 11] = [1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 1024];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub signature: u32,
    pub volume_id: u32,
    pub sectors_per_cluster: u32,
    pub root_cluster: u32,
    pub reserved: u16,
}

impl Superblock {
    /// Read and validate the superblock at `partition_offset` on `device`.
    ///
    /// Does not yet know `total_clusters` (that depends on the superblock
    /// itself plus the caller's declared partition size), so the
    /// root-cluster-in-range invariant is checked by the caller once
    /// geometry is fully derived.
    pub fn read(device: &mut dyn Device, partition_offset: u64) -> Result<Self> {
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        device.read_at(partition_offset, &mut buf)?;

        let signature = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if signature != SIGNATURE {
            error!("superblock signature mismatch: {signature:#010x}");
            return Err(Error::Corrupt(format!(
                "bad superblock signature {signature:#010x}"
            )));
        }

        let volume_id = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let sectors_per_cluster = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let root_cluster = u32::from_le_bytes(buf[12..16].try_into().unwrap());
        let reserved = u16::from_le_bytes(buf[16..18].try_into().unwrap());

        if !SECTORS_PER_CLUSTER_VALUES.contains(&sectors_per_cluster) {
            error!("invalid sectors_per_cluster {sectors_per_cluster}");
            return Err(Error::Corrupt(format!(
                "sectors_per_cluster {sectors_per_cluster} is not a valid power of two in [1, 1024]"
            )));
        }

        Ok(Self {
            signature,
            volume_id,
            sectors_per_cluster,
            root_cluster,
            reserved,
        })
    }

    /// Synthesize a fresh superblock for formatting.
    ///
    /// `volume_id` is derived from a low-resolution wallclock source; on
    /// platforms where that's unavailable a deterministic fallback
    /// (`0xFFFF_FFFF`) is acceptable (spec §4.2).
    pub fn format(sectors_per_cluster: u32, volume_id: Option<u32>) -> Result<Self> {
        if !SECTORS_PER_CLUSTER_VALUES.contains(&sectors_per_cluster) {
            return Err(Error::InvalidArgument(format!(
                "sectors_per_cluster {sectors_per_cluster} is not a valid power of two in [1, 1024]"
            )));
        }
        let volume_id = volume_id.unwrap_or_else(Self::wallclock_volume_id);
        Ok(Self {
            signature: SIGNATURE,
            volume_id,
            sectors_per_cluster,
            root_cluster: 1,
            reserved: 0,
        })
    }

    fn wallclock_volume_id() -> u32 {
        use std::time::{SystemTime, UNIX_EPOCH};
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => (d.as_secs() as u32) ^ d.subsec_nanos(),
            Err(_) => 0xFFFF_FFFF,
        }
    }

    /// Serialize and write at `partition_offset`, padding with 0xFF.
    pub fn write(&self, device: &mut dyn Device, partition_offset: u64) -> Result<()> {
        let mut buf = [0xFFu8; SUPERBLOCK_SIZE];
        buf[0..4].copy_from_slice(&self.signature.to_le_bytes());
        buf[4..8].copy_from_slice(&self.volume_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.sectors_per_cluster.to_le_bytes());
        buf[12..16].copy_from_slice(&self.root_cluster.to_le_bytes());
        buf[16..18].copy_from_slice(&self.reserved.to_le_bytes());
        device.write_at(partition_offset, &buf)?;
        Ok(())
    }
}
