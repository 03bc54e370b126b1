//! The File Allocation Table: cached reads/writes, cluster classification,
//! allocation with a persistent search cursor, and chain maintenance
//! (spec §3, §4.3).
//!
//! Grounded on the teacher crate's `fat::FatManager` (free-cluster scan +
//! recycle list) and `block_cache::BlockCache` (dirty-flagged sliding
//! window flushed on miss), adapted to FATX's entry classification scheme
//! (available/data/reserved/bad/media/end) instead of FAT32's cluster
//! chain semantics, and to a cache window sized in entries rather than
//! fixed 512-byte blocks. Device ownership follows the teacher's
//! `Arc<dyn BlockDevice>` sharing pattern, using `Rc<RefCell<_>>` in place
//! of `Arc<RwLock<_>>` since the core is single-threaded (spec §5).

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, error, trace};

use crate::device::Device;
use crate::error::{Error, Result};

/// Cache window size, in entries (spec §4.3 / §9: "on the order of 1024").
pub const CACHE_WINDOW_ENTRIES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatVariant {
    Fat16,
    Fat32,
}

impl FatVariant {
    pub fn entry_width(self) -> u32 {
        match self {
            FatVariant::Fat16 => 2,
            FatVariant::Fat32 => 4,
        }
    }

    /// FAT type is chosen from the volume's total cluster count (spec §3).
    pub fn for_total_clusters(total_clusters: u32) -> Self {
        if total_clusters < 0xFFF0 {
            FatVariant::Fat16
        } else {
            FatVariant::Fat32
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterEntry {
    Available,
    Data(u32),
    Reserved,
    Bad,
    Media,
    End,
    /// A raw value in the reserved marker range (`>= 0xfffffff0`) that
    /// isn't one of the five named markers (spec §4.3 `classify`; see
    /// `fatx_fat.c`'s `FATX_CLUSTER_INVALID`).
    Invalid,
}

fn classify(raw: u32) -> ClusterEntry {
    match raw {
        0x0000_0000 => ClusterEntry::Available,
        0xFFFF_FFF0 => ClusterEntry::Reserved,
        0xFFFF_FFF7 => ClusterEntry::Bad,
        0xFFFF_FFF8 => ClusterEntry::Media,
        0xFFFF_FFFF => ClusterEntry::End,
        v if v >= 0xFFFF_FFF0 => ClusterEntry::Invalid,
        v => ClusterEntry::Data(v),
    }
}

/// Sign-extend a 16-bit raw entry to 32 bits before classification, per
/// spec §3, so both variants share one classifier.
fn sign_extend_16(raw: u16) -> u32 {
    raw as i16 as i32 as u32
}

pub struct Fat {
    device: Rc<RefCell<dyn Device>>,
    variant: FatVariant,
    fat_offset: u64,
    total_clusters: u32,
    root_cluster: u32,

    window_start: u32,
    window: Vec<u8>,
    dirty: bool,
    loaded: bool,

    alloc_cursor: u32,
}

impl Fat {
    pub fn new(
        device: Rc<RefCell<dyn Device>>,
        variant: FatVariant,
        fat_offset: u64,
        total_clusters: u32,
        root_cluster: u32,
    ) -> Self {
        Self {
            device,
            variant,
            fat_offset,
            total_clusters,
            root_cluster,
            window_start: 0,
            window: vec![0u8; CACHE_WINDOW_ENTRIES * 4],
            dirty: false,
            loaded: false,
            alloc_cursor: root_cluster,
        }
    }

    /// Total on-disk byte size of the FAT region, rounded up to 4 KiB
    /// (spec §3).
    pub fn fat_byte_size(total_clusters: u32, variant: FatVariant) -> u64 {
        let raw = (total_clusters as u64 + 1) * variant.entry_width() as u64;
        raw.div_ceil(4096) * 4096
    }

    pub fn variant(&self) -> FatVariant {
        self.variant
    }

    fn in_range(&self, index: u32) -> bool {
        index < self.total_clusters + self.root_cluster
    }

    fn ensure_window(&mut self, index: u32) -> Result<()> {
        let window_entries = CACHE_WINDOW_ENTRIES as u32;
        let needed_start = (index / window_entries) * window_entries;
        if self.loaded && needed_start == self.window_start {
            return Ok(());
        }
        self.flush()?;

        trace!("FAT cache miss at entry {index}, refilling window at {needed_start}");
        let byte_width = self.variant.entry_width();
        let byte_offset = self.fat_offset + needed_start as u64 * byte_width as u64;
        self.window.fill(0);
        self.device
            .borrow_mut()
            .read_at(byte_offset, &mut self.window)?;
        self.window_start = needed_start;
        self.loaded = true;
        Ok(())
    }

    fn slot(&self, index: u32) -> usize {
        ((index - self.window_start) * self.variant.entry_width()) as usize
    }

    fn read_raw(&mut self, index: u32) -> Result<u32> {
        if !self.in_range(index) {
            return Err(Error::InvalidArgument(format!(
                "cluster index {index} out of range"
            )));
        }
        self.ensure_window(index)?;
        let off = self.slot(index);
        Ok(match self.variant {
            FatVariant::Fat16 => {
                let raw = u16::from_le_bytes(self.window[off..off + 2].try_into().unwrap());
                sign_extend_16(raw)
            }
            FatVariant::Fat32 => u32::from_le_bytes(self.window[off..off + 4].try_into().unwrap()),
        })
    }

    fn write_raw(&mut self, index: u32, value: u32) -> Result<()> {
        if !self.in_range(index) {
            return Err(Error::InvalidArgument(format!(
                "cluster index {index} out of range"
            )));
        }
        self.ensure_window(index)?;
        let off = self.slot(index);
        match self.variant {
            FatVariant::Fat16 => {
                self.window[off..off + 2].copy_from_slice(&(value as u16).to_le_bytes());
            }
            FatVariant::Fat32 => {
                self.window[off..off + 4].copy_from_slice(&value.to_le_bytes());
            }
        }
        self.dirty = true;
        Ok(())
    }

    pub fn read_entry(&mut self, index: u32) -> Result<ClusterEntry> {
        let raw = self.read_raw(index)?;
        match classify(raw) {
            ClusterEntry::Invalid => {
                error!("FAT entry {index} classified as invalid (raw={raw:#010x})");
                Err(Error::Corrupt(format!(
                    "FAT entry {index} has an invalid raw value {raw:#010x}"
                )))
            }
            entry => Ok(entry),
        }
    }

    pub fn write_entry(&mut self, index: u32, value: u32) -> Result<()> {
        self.write_raw(index, value)
    }

    /// End-of-chain sentinel, canonical per variant (spec §9): `0xFFFF` for
    /// 16-bit entries, `0xFFFF_FFFF` for 32-bit.
    fn end_sentinel(&self) -> u32 {
        match self.variant {
            FatVariant::Fat16 => 0xFFFF,
            FatVariant::Fat32 => 0xFFFF_FFFF,
        }
    }

    pub fn mark_end(&mut self, index: u32) -> Result<()> {
        let v = self.end_sentinel();
        self.write_raw(index, v)
    }

    pub fn next_cluster(&mut self, index: u32) -> Result<u32> {
        match self.read_entry(index)? {
            ClusterEntry::Data(next) => Ok(next),
            other => Err(Error::Corrupt(format!(
                "cluster {index} is not a chained data entry (got {other:?})"
            ))),
        }
    }

    /// Linear scan from the persistent search cursor, wrapping once (spec
    /// §4.3 "Allocation search cursor"). Marks the new cluster end-of-chain
    /// and returns it; zero-filling its data area (spec's "optionally
    /// zero-fill") is the caller's job since only the volume layer knows
    /// the data-region offset — see `Volume::alloc_cluster`.
    pub fn alloc_cluster(&mut self) -> Result<u32> {
        let first_cluster = self.root_cluster;
        let last_cluster = self.root_cluster + self.total_clusters;
        if last_cluster <= first_cluster {
            return Err(Error::NoSpace);
        }

        let start = self.alloc_cursor.clamp(first_cluster, last_cluster - 1);
        let mut cursor = start;
        loop {
            if matches!(self.read_entry(cursor)?, ClusterEntry::Available) {
                self.write_entry(cursor, self.end_sentinel())?;
                self.alloc_cursor = cursor + 1;
                if self.alloc_cursor >= last_cluster {
                    self.alloc_cursor = first_cluster;
                }
                debug!(
                    "allocated cluster {cursor}, cursor now at {}",
                    self.alloc_cursor
                );
                return Ok(cursor);
            }
            cursor += 1;
            if cursor >= last_cluster {
                cursor = first_cluster;
            }
            if cursor == start {
                error!("FAT allocation scan wrapped with no free cluster");
                return Err(Error::NoSpace);
            }
        }
    }

    /// Walk `first`'s chain, resetting every visited entry to available.
    /// Tolerates premature termination: the last cluster returned from
    /// `next_cluster` is still freed (spec §4.3).
    pub fn free_chain(&mut self, first: u32) -> Result<()> {
        let mut current = first;
        loop {
            let entry = self.read_entry(current)?;
            self.write_entry(current, 0)?;
            match entry {
                ClusterEntry::Data(next) => current = next,
                _ => break,
            }
        }
        Ok(())
    }

    /// Attach `new` after `tail`. `tail` must currently be end-of-chain.
    pub fn attach(&mut self, tail: u32, new: u32) -> Result<()> {
        if !matches!(self.read_entry(tail)?, ClusterEntry::End) {
            return Err(Error::Corrupt(format!(
                "attach: cluster {tail} is not end-of-chain"
            )));
        }
        self.write_entry(tail, new)?;
        self.mark_end(new)?;
        Ok(())
    }

    /// Count clusters in a chain starting at `first` (spec §4.7's
    /// truncate/grow use this to decide how many more clusters are
    /// needed).
    pub fn chain_length(&mut self, first: u32) -> Result<u32> {
        let mut count = 1;
        let mut current = first;
        loop {
            match self.read_entry(current)? {
                ClusterEntry::Data(next) => {
                    current = next;
                    count += 1;
                }
                _ => return Ok(count),
            }
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.dirty {
            let byte_width = self.variant.entry_width();
            let byte_offset = self.fat_offset + self.window_start as u64 * byte_width as u64;
            self.device
                .borrow_mut()
                .write_at(byte_offset, &self.window)?;
            self.dirty = false;
        }
        Ok(())
    }
}

impl Drop for Fat {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
