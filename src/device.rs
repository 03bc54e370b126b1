//! Device I/O: seek + read + write on the backing device, in absolute byte
//! offsets. Everything above this layer (superblock, FAT, clusters) is
//! expressed in terms of [`Device::read_at`] / [`Device::write_at`].
//!
//! Grounded on the teacher crate's `block_device::BlockDevice` trait and its
//! `std`-frontend `BlockFile` (`device.rs` in the `fat32-fs-std` example),
//! generalized from fixed block-sized I/O to arbitrary byte ranges since
//! FATX has no analogous "block size must divide every read" constraint.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::Result;

/// Synchronous byte-addressable backing store for a FATX volume.
///
/// All operations are synchronous and return a device-error on failure
/// (spec §4.1); there is no async suspension (spec §5).
pub trait Device {
    /// Read exactly `buf.len()` bytes starting at absolute offset `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write exactly `buf.len()` bytes starting at absolute offset `offset`.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;
}

/// A [`Device`] backed by an open [`std::fs::File`] (or block device node).
pub struct FileDevice {
    file: File,
}

impl FileDevice {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

impl Device for FileDevice {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }
}

/// An in-memory [`Device`], used in tests in place of a disk image.
pub struct MemDevice {
    data: Vec<u8>,
}

impl MemDevice {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Device for MemDevice {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            return Err(crate::error::Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "read past end of device",
            )));
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            return Err(crate::error::Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "write past end of device",
            )));
        }
        self.data[start..end].copy_from_slice(buf);
        Ok(())
    }
}
