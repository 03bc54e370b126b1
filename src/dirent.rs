//! The 64-byte packed directory entry and its codec to/from the in-memory
//! attribute record (spec §3, §4.5).
//!
//! Grounded on the teacher crate's `entry::ShortDirEntry` (packed on-disk
//! layout, explicit little-endian field access, attribute bit constants),
//! simplified to FATX's single 64-byte record (no long-name entries).

use log::warn;

use crate::datetime::Timestamp;
use crate::error::{Error, Result};

pub const ENTRY_SIZE: usize = 64;
pub const MAX_NAME_LEN: usize = 42;

pub const ATTR_READ_ONLY: u8 = 1 << 0;
pub const ATTR_SYSTEM: u8 = 1 << 1;
pub const ATTR_HIDDEN: u8 = 1 << 2;
pub const ATTR_VOLUME_LABEL: u8 = 1 << 3;
pub const ATTR_DIRECTORY: u8 = 1 << 4;

pub const FILENAME_DELETED: u8 = 0xE5;
pub const FILENAME_END_FF: u8 = 0xFF;
pub const FILENAME_END_00: u8 = 0x00;

fn is_end_marker(len: u8) -> bool {
    len == FILENAME_END_FF || len == FILENAME_END_00
}

/// In-memory view of a 64-byte on-disk directory entry slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// A live entry with a decoded attribute record.
    Live(Attr),
    /// A deleted entry (filename length byte `0xE5`).
    Deleted,
    /// The end-of-directory sentinel; no further entry in this cluster
    /// chain is meaningful.
    EndOfDir,
}

/// Logical attribute record: the decoded contents of a directory entry.
///
/// `filename` is the raw on-disk bytes (spec §3: "42 bytes filename
/// (raw...)"), not a UTF-8 string — the format places no encoding
/// constraint on it, and decoding through `String` would replace
/// non-UTF-8 bytes with U+FFFD and break the pack/unpack round-trip
/// (spec §8 property 6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub filename: Vec<u8>,
    pub attributes: u8,
    pub first_cluster: u32,
    pub file_size: u32,
    pub modified: Timestamp,
    pub created: Timestamp,
    pub accessed: Timestamp,
}

impl Attr {
    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }
}

/// Parse a raw 64-byte slot. Fails with `Error::Corrupt` if the filename
/// length byte is neither a valid length (1-42), `0xE5`, nor a
/// terminator (spec §4.5).
pub fn decode(raw: &[u8; ENTRY_SIZE]) -> Result<Slot> {
    let name_len = raw[0];
    if is_end_marker(name_len) {
        return Ok(Slot::EndOfDir);
    }
    if name_len == FILENAME_DELETED {
        return Ok(Slot::Deleted);
    }
    if name_len as usize > MAX_NAME_LEN {
        warn!("directory slot filename length byte {name_len:#04x} is not a valid length, 0xE5, or a terminator");
        return Err(Error::Corrupt(format!(
            "invalid directory entry filename length byte {name_len:#04x}"
        )));
    }

    let len = name_len as usize;
    let filename = raw[2..2 + len].to_vec();
    let attributes = raw[1];
    let first_cluster = u32::from_le_bytes(raw[44..48].try_into().unwrap());
    let file_size = u32::from_le_bytes(raw[48..52].try_into().unwrap());
    let modified_time = u16::from_le_bytes(raw[52..54].try_into().unwrap());
    let modified_date = u16::from_le_bytes(raw[54..56].try_into().unwrap());
    let created_time = u16::from_le_bytes(raw[56..58].try_into().unwrap());
    let created_date = u16::from_le_bytes(raw[58..60].try_into().unwrap());
    let accessed_time = u16::from_le_bytes(raw[60..62].try_into().unwrap());
    let accessed_date = u16::from_le_bytes(raw[62..64].try_into().unwrap());

    Ok(Slot::Live(Attr {
        filename,
        attributes,
        first_cluster,
        file_size,
        modified: Timestamp::from_packed(modified_date, modified_time),
        created: Timestamp::from_packed(created_date, created_time),
        accessed: Timestamp::from_packed(accessed_date, accessed_time),
    }))
}

/// Serialize a live attribute record into a fresh 64-byte slot.
pub fn encode(attr: &Attr) -> [u8; ENTRY_SIZE] {
    let mut raw = [0u8; ENTRY_SIZE];
    let name_bytes = attr.filename.as_slice();
    let len = name_bytes.len().min(MAX_NAME_LEN);
    raw[0] = len as u8;
    raw[1] = attr.attributes;
    raw[2..2 + len].copy_from_slice(&name_bytes[..len]);
    raw[44..48].copy_from_slice(&attr.first_cluster.to_le_bytes());
    raw[48..52].copy_from_slice(&attr.file_size.to_le_bytes());
    raw[52..54].copy_from_slice(&attr.modified.pack_time().to_le_bytes());
    raw[54..56].copy_from_slice(&attr.modified.pack_date().to_le_bytes());
    raw[56..58].copy_from_slice(&attr.created.pack_time().to_le_bytes());
    raw[58..60].copy_from_slice(&attr.created.pack_date().to_le_bytes());
    raw[60..62].copy_from_slice(&attr.accessed.pack_time().to_le_bytes());
    raw[62..64].copy_from_slice(&attr.accessed.pack_date().to_le_bytes());
    raw
}

pub fn deleted_slot() -> [u8; ENTRY_SIZE] {
    let mut raw = [0u8; ENTRY_SIZE];
    raw[0] = FILENAME_DELETED;
    raw
}

pub fn end_of_dir_slot() -> [u8; ENTRY_SIZE] {
    let mut raw = [0u8; ENTRY_SIZE];
    raw[0] = FILENAME_END_FF;
    raw
}
