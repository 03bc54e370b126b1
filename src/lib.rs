//! Userspace driver and library for the FATX on-disk filesystem: a
//! FAT-family format used on consumer console storage (spec §1).
//!
//! This crate implements the on-disk engine only — device I/O,
//! superblock, FAT, directories, path resolution, file operations, and
//! the retail disk formatter. The POSIX-style mount glue, CLI frontend,
//! GUI partition browser, and host 64-bit seek shim are external
//! collaborators against the [`volume::Volume`] operation surface, not
//! part of this crate.

pub mod datetime;
pub mod device;
pub mod dir;
pub mod dirent;
pub mod error;
pub mod fat;
pub mod file;
pub mod format;
pub mod path;
pub mod superblock;
pub mod volume;

pub use device::{Device, FileDevice, MemDevice};
pub use dirent::Attr;
pub use error::{Error, Result};
pub use volume::{OpenOptions, Volume, VolumeStat};
