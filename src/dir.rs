//! Directory engine: cursor-based iteration, slot allocation, deletion,
//! and terminator management over cluster-chained directories (spec §4.4).
//!
//! Grounded on the teacher crate's `dir::Dir` trait and `VirtFile`
//! directory-scanning methods (`find_by_sfn`, `empty_entry_index`,
//! `ls_with_attr`): a directory is addressed purely by cluster-index
//! arithmetic, never by an owned object, matching spec §9's "raw-pointer
//! directory graph" note.

use log::warn;

use crate::dirent::{self, Attr, ENTRY_SIZE};
use crate::error::{Error, Result};
use crate::fat::ClusterEntry;
use crate::volume::Volume;

/// A transient directory position: (current cluster, entry index within
/// that cluster). Not an owned object — spec §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirCursor {
    pub cluster: u32,
    pub index: u32,
}

impl DirCursor {
    pub fn at_head(cluster: u32) -> Self {
        Self { cluster, index: 0 }
    }
}

/// Outcome of reading one directory slot (spec §4.4 table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Success(Attr),
    Deleted,
    EndOfDir,
}

impl Volume {
    fn read_raw_slot(&mut self, cursor: DirCursor) -> Result<[u8; ENTRY_SIZE]> {
        let mut raw = [0u8; ENTRY_SIZE];
        self.read_cluster_bytes(cursor.cluster, cursor.index * ENTRY_SIZE as u32, &mut raw)?;
        Ok(raw)
    }

    fn write_raw_slot(&mut self, cursor: DirCursor, raw: &[u8; ENTRY_SIZE]) -> Result<()> {
        self.write_cluster_bytes(cursor.cluster, cursor.index * ENTRY_SIZE as u32, raw)
    }

    /// Read the slot at `cursor` (spec §4.4 "read").
    pub(crate) fn dir_read(&mut self, cursor: DirCursor) -> Result<ReadOutcome> {
        let raw = self.read_raw_slot(cursor)?;
        match dirent::decode(&raw)? {
            dirent::Slot::Live(attr) => Ok(ReadOutcome::Success(attr)),
            dirent::Slot::Deleted => Ok(ReadOutcome::Deleted),
            dirent::Slot::EndOfDir => Ok(ReadOutcome::EndOfDir),
        }
    }

    /// Advance the cursor by one slot, following the FAT across cluster
    /// boundaries (spec §4.4 "Advance policy").
    pub(crate) fn dir_advance(&mut self, cursor: DirCursor) -> Result<DirCursor> {
        let entries_per_cluster = self.geometry.entries_per_cluster();
        let next_index = cursor.index + 1;
        if next_index < entries_per_cluster {
            return Ok(DirCursor {
                cluster: cursor.cluster,
                index: next_index,
            });
        }

        match self.fat.read_entry(cursor.cluster)? {
            ClusterEntry::Data(next) => Ok(DirCursor {
                cluster: next,
                index: 0,
            }),
            ClusterEntry::End => Err(Error::Corrupt(
                "end of cluster chain reached before end-of-dir".into(),
            )),
            other => Err(Error::Corrupt(format!(
                "directory chain cluster classified as {other:?}"
            ))),
        }
    }

    pub(crate) fn dir_write_attr(&mut self, cursor: DirCursor, attr: &Attr) -> Result<()> {
        let raw = dirent::encode(attr);
        self.write_raw_slot(cursor, &raw)
    }

    pub(crate) fn dir_mark_deleted(&mut self, cursor: DirCursor) -> Result<()> {
        self.write_raw_slot(cursor, &dirent::deleted_slot())
    }

    fn dir_mark_end(&mut self, cursor: DirCursor) -> Result<()> {
        self.write_raw_slot(cursor, &dirent::end_of_dir_slot())
    }

    /// Find a slot the caller may immediately overwrite (spec §4.4 "Slot
    /// allocation for new entries").
    pub(crate) fn dir_alloc_slot(&mut self, head: u32) -> Result<DirCursor> {
        let mut cursor = DirCursor::at_head(head);
        loop {
            match self.dir_read(cursor)? {
                ReadOutcome::Deleted => return Ok(cursor),
                ReadOutcome::Success(_) => {
                    cursor = self.dir_advance(cursor)?;
                }
                ReadOutcome::EndOfDir => {
                    let entries_per_cluster = self.geometry.entries_per_cluster();
                    if cursor.index + 1 < entries_per_cluster {
                        let new_cursor = DirCursor {
                            cluster: cursor.cluster,
                            index: cursor.index + 1,
                        };
                        self.dir_mark_end(new_cursor)?;
                        return Ok(cursor);
                    }
                    let new_cluster = self.alloc_cluster(false)?;
                    self.fat.attach(cursor.cluster, new_cluster)?;
                    self.dir_mark_end(DirCursor::at_head(new_cluster))?;
                    return Ok(cursor);
                }
            }
        }
    }

    /// Iterate a directory's live entries, skipping deleted slots and
    /// stopping at end-of-dir (spec §6 "list directory").
    pub fn read_dir(&mut self, head: u32) -> Result<ReadDir<'_>> {
        Ok(ReadDir {
            volume: self,
            state: IterState::At(DirCursor::at_head(head)),
        })
    }

    /// Fail with `NotEmpty` if any live entry is found before end-of-dir
    /// (spec §4.7 "Remove directory").
    pub(crate) fn dir_is_empty(&mut self, head: u32) -> Result<bool> {
        let mut cursor = DirCursor::at_head(head);
        loop {
            match self.dir_read(cursor)? {
                ReadOutcome::EndOfDir => return Ok(true),
                ReadOutcome::Deleted => {
                    cursor = self.dir_advance(cursor)?;
                }
                ReadOutcome::Success(attr) => {
                    if attr.filename == b"." || attr.filename == b".." {
                        warn!(
                            "directory entry uses reserved name {:?}",
                            String::from_utf8_lossy(&attr.filename)
                        );
                    }
                    return Ok(false);
                }
            }
        }
    }
}

enum IterState {
    At(DirCursor),
    Failed(Error),
    Done,
}

/// Iterator over `(name, attributes)` pairs of a directory (spec §6,
/// §11's "readdir iterator surface").
pub struct ReadDir<'v> {
    volume: &'v mut Volume,
    state: IterState,
}

impl Iterator for ReadDir<'_> {
    type Item = Result<Attr>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let cursor = match std::mem::replace(&mut self.state, IterState::Done) {
                IterState::At(cursor) => cursor,
                IterState::Failed(e) => return Some(Err(e)),
                IterState::Done => return None,
            };
            match self.volume.dir_read(cursor) {
                Ok(ReadOutcome::EndOfDir) => return None,
                Ok(ReadOutcome::Deleted) => match self.volume.dir_advance(cursor) {
                    Ok(next) => self.state = IterState::At(next),
                    Err(e) => return Some(Err(e)),
                },
                Ok(ReadOutcome::Success(attr)) => {
                    self.state = match self.volume.dir_advance(cursor) {
                        Ok(next) => IterState::At(next),
                        Err(e) => IterState::Failed(e),
                    };
                    return Some(Ok(attr));
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::device::{Device, MemDevice};
    use crate::dirent::ENTRY_SIZE;
    use crate::volume::OpenOptions;

    use super::*;

    fn make_volume() -> Volume {
        let partition_size = 4 * 1024 * 1024u64;
        let total = 4096 + partition_size;
        let device: Rc<RefCell<dyn Device>> = Rc::new(RefCell::new(MemDevice::new(total as usize)));
        let options = OpenOptions::new(0, partition_size).sector_size(512);
        Volume::format(device, options, 8).unwrap()
    }

    #[test]
    fn an_invalid_filename_length_byte_surfaces_as_corrupt() {
        let mut vol = make_volume();
        let cursor = DirCursor::at_head(vol.root_cluster());
        let mut raw = [0u8; ENTRY_SIZE];
        raw[0] = 43; // > MAX_NAME_LEN, and not 0x00/0xE5/0xFF
        vol.write_raw_slot(cursor, &raw).unwrap();

        assert!(matches!(vol.dir_read(cursor), Err(Error::Corrupt(_))));
    }
}
