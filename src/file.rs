//! File operations: offset-to-cluster mapping, read, write, truncate,
//! create, unlink, mkdir, rmdir, rename, utime (spec §4.7).
//!
//! Grounded on the teacher crate's `file::File`/`vfs::VirtFile` read/write
//! loops (cluster-at-a-time copy, crossing cluster boundaries by
//! following the FAT), adapted to FATX's simpler flat 64-byte dirents (no
//! cluster-chain struct wrapping a `VirtFile`; operations work directly
//! off a directory cursor plus first-cluster index).

use log::{debug, info};

use crate::datetime::Timestamp;
use crate::dir::DirCursor;
use crate::dirent::{Attr, ATTR_DIRECTORY, MAX_NAME_LEN};
use crate::error::{Error, Result};
use crate::fat::ClusterEntry;
use crate::path::{basename, dirname};
use crate::volume::Volume;

impl Volume {
    /// Map a byte offset within a cluster chain to a cluster index,
    /// counted from `first` (spec §4.7 "Offset-to-cluster mapping").
    ///
    /// With `grow` set, an end-of-chain reached before `index` clusters
    /// have been walked allocates and attaches a fresh cluster instead of
    /// failing — used by write and truncate.
    fn cluster_at(&mut self, first: u32, index: u32, grow: bool) -> Result<u32> {
        let mut current = first;
        for _ in 0..index {
            match self.fat.read_entry(current)? {
                ClusterEntry::Data(next) => current = next,
                ClusterEntry::End if grow => {
                    let new = self.alloc_cluster(true)?;
                    self.fat.attach(current, new)?;
                    current = new;
                }
                other => {
                    return Err(Error::Corrupt(format!(
                        "unexpected FAT entry {other:?} while walking a cluster chain"
                    )))
                }
            }
        }
        Ok(current)
    }

    /// Read up to `buf.len()` bytes from `path` at `offset`. Returns the
    /// number of bytes actually read (0 at EOF) (spec §4.7 "Read").
    pub fn read(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let resolved = self.resolve(path)?;
        let attr = resolved
            .attr
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        let file_size = attr.file_size as u64;
        if offset > file_size {
            return Err(Error::InvalidArgument(format!(
                "read offset {offset} exceeds file size {file_size}"
            )));
        }
        if offset == file_size {
            return Ok(0);
        }

        let bpc = self.geometry.bytes_per_cluster as u64;
        let to_read = buf.len().min((file_size - offset) as usize);
        let mut done = 0usize;
        let mut cluster = self.cluster_at(attr.first_cluster, (offset / bpc) as u32, false)?;
        let mut within = (offset % bpc) as u32;

        while done < to_read {
            let in_cluster = (bpc as u32 - within) as usize;
            let chunk = in_cluster.min(to_read - done);
            self.read_cluster_bytes(cluster, within, &mut buf[done..done + chunk])?;
            done += chunk;
            within += chunk as u32;
            if within >= bpc as u32 && done < to_read {
                cluster = self.fat.next_cluster(cluster)?;
                within = 0;
            }
        }
        Ok(done)
    }

    /// Write `data` to `path` at `offset`, growing the file and its
    /// cluster chain as needed (spec §4.7 "Write").
    pub fn write(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
        let resolved = self.resolve(path)?;
        let cursor = resolved.cursor;
        let mut attr = resolved
            .attr
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        if attr.is_directory() {
            return Err(Error::NotADirectory(path.to_string()));
        }

        let mut file_size = attr.file_size as u64;
        if offset > file_size {
            self.truncate_to(cursor, &mut attr, offset)?;
            file_size = offset;
        }

        let bpc = self.geometry.bytes_per_cluster as u64;
        let mut cluster = self.cluster_at(attr.first_cluster, (offset / bpc) as u32, true)?;
        let mut within = (offset % bpc) as u32;
        let mut done = 0usize;

        while done < data.len() {
            let in_cluster = (bpc as u32 - within) as usize;
            let chunk = in_cluster.min(data.len() - done);
            self.write_cluster_bytes(cluster, within, &data[done..done + chunk])?;
            done += chunk;
            within += chunk as u32;
            if within >= bpc as u32 && done < data.len() {
                cluster = match self.fat.read_entry(cluster)? {
                    ClusterEntry::Data(next) => next,
                    ClusterEntry::End => {
                        let new = self.alloc_cluster(true)?;
                        self.fat.attach(cluster, new)?;
                        new
                    }
                    other => {
                        return Err(Error::Corrupt(format!(
                            "unexpected FAT entry {other:?} while extending a file"
                        )))
                    }
                };
                within = 0;
            }
        }

        let new_end = offset + done as u64;
        if new_end > file_size {
            attr.file_size = new_end as u32;
            let now = Timestamp::now();
            attr.modified = now;
            attr.accessed = now;
            self.dir_write_attr(cursor, &attr)?;
        }
        self.flush()?;
        Ok(done)
    }

    /// Shared truncate implementation given an already-resolved cursor and
    /// attribute record (spec §4.7 "Truncate to length L").
    fn truncate_to(&mut self, cursor: DirCursor, attr: &mut Attr, new_len: u64) -> Result<()> {
        let bpc = self.geometry.bytes_per_cluster as u64;
        let needed_clusters = if new_len == 0 {
            1
        } else {
            new_len.div_ceil(bpc).max(1)
        };

        let last = self.cluster_at(attr.first_cluster, (needed_clusters - 1) as u32, true)?;
        if let ClusterEntry::Data(next) = self.fat.read_entry(last)? {
            self.fat.free_chain(next)?;
        }
        self.fat.mark_end(last)?;

        attr.file_size = new_len as u32;
        let now = Timestamp::now();
        attr.modified = now;
        self.dir_write_attr(cursor, attr)?;
        Ok(())
    }

    pub fn truncate(&mut self, path: &str, new_len: u64) -> Result<()> {
        let resolved = self.resolve(path)?;
        let mut attr = resolved
            .attr
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        if attr.is_directory() {
            return Err(Error::NotADirectory(path.to_string()));
        }
        self.truncate_to(resolved.cursor, &mut attr, new_len)?;
        self.flush()?;
        Ok(())
    }

    pub fn get_attr(&mut self, path: &str) -> Result<Attr> {
        let resolved = self.resolve(path)?;
        match resolved.attr {
            Some(attr) => Ok(attr),
            None => Ok(Attr {
                filename: Vec::new(),
                attributes: ATTR_DIRECTORY,
                first_cluster: self.root_cluster(),
                file_size: 0,
                modified: Timestamp::now(),
                created: Timestamp::now(),
                accessed: Timestamp::now(),
            }),
        }
    }

    fn check_new_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("empty filename".into()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(Error::NameTooLong {
                name: name.to_string(),
                len: name.len(),
            });
        }
        Ok(())
    }

    fn exists(&mut self, dir_head: u32, name: &str) -> Result<bool> {
        for entry in self.read_dir(dir_head)? {
            if entry?.filename == name.as_bytes() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Create a zero-length file (spec §4.7 "Create file").
    pub fn create_file(&mut self, path: &str) -> Result<()> {
        let name = basename(path);
        Self::check_new_name(name)?;
        let dir_head = self.resolve_parent_dir(path)?;
        if self.exists(dir_head, name)? {
            return Err(Error::AlreadyExists(path.to_string()));
        }

        // FAT allocation before the directory slot write: an orphaned
        // cluster is the worst-case crash outcome (spec §5).
        let first_cluster = self.alloc_cluster(true)?;
        let cursor = self.dir_alloc_slot(dir_head)?;
        let now = Timestamp::now();
        let attr = Attr {
            filename: name.as_bytes().to_vec(),
            attributes: 0,
            first_cluster,
            file_size: 0,
            modified: now,
            created: now,
            accessed: now,
        };
        self.dir_write_attr(cursor, &attr)?;
        self.flush()?;
        debug!("created file {path} at cluster {first_cluster}");
        Ok(())
    }

    /// Create a directory with a fresh end-of-dir sentinel (spec §4.7
    /// "Create directory").
    pub fn create_dir(&mut self, path: &str) -> Result<()> {
        let name = basename(path);
        Self::check_new_name(name)?;
        let dir_head = self.resolve_parent_dir(path)?;
        if self.exists(dir_head, name)? {
            return Err(Error::AlreadyExists(path.to_string()));
        }

        let first_cluster = self.alloc_cluster(false)?;
        let sentinel = crate::dirent::end_of_dir_slot();
        self.write_cluster_bytes(first_cluster, 0, &sentinel)?;

        let cursor = self.dir_alloc_slot(dir_head)?;
        let now = Timestamp::now();
        let attr = Attr {
            filename: name.as_bytes().to_vec(),
            attributes: ATTR_DIRECTORY,
            first_cluster,
            file_size: 0,
            modified: now,
            created: now,
            accessed: now,
        };
        self.dir_write_attr(cursor, &attr)?;
        self.flush()?;
        info!("created directory {path} at cluster {first_cluster}");
        Ok(())
    }

    /// Unlink a file: free its chain, then mark the slot deleted (spec
    /// §4.7 "Unlink", ordering per spec §5).
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let resolved = self.resolve(path)?;
        let attr = resolved
            .attr
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        if attr.is_directory() {
            return Err(Error::NotADirectory(path.to_string()));
        }
        self.fat.free_chain(attr.first_cluster)?;
        self.dir_mark_deleted(resolved.cursor)?;
        self.flush()?;
        Ok(())
    }

    /// Remove an empty directory (spec §4.7 "Remove directory").
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let resolved = self.resolve(path)?;
        let attr = resolved
            .attr
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        if !attr.is_directory() {
            return Err(Error::NotADirectory(path.to_string()));
        }
        if !self.dir_is_empty(attr.first_cluster)? {
            return Err(Error::NotEmpty(path.to_string()));
        }
        self.fat.free_chain(attr.first_cluster)?;
        self.dir_mark_deleted(resolved.cursor)?;
        self.flush()?;
        Ok(())
    }

    /// Same-directory rename only (spec §4.7 "Rename"); cross-directory
    /// rename is rejected explicitly rather than silently corrupting the
    /// volume (spec §9).
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        if dirname(from) != dirname(to) {
            return Err(Error::InvalidArgument(
                "rename across directories is not supported".into(),
            ));
        }
        let new_name = basename(to);
        Self::check_new_name(new_name)?;

        let resolved = self.resolve(from)?;
        let mut attr = resolved
            .attr
            .ok_or_else(|| Error::NotFound(from.to_string()))?;

        let dir_head = self.resolve_parent_dir(from)?;
        if new_name.as_bytes() != attr.filename.as_slice() && self.exists(dir_head, new_name)? {
            return Err(Error::AlreadyExists(to.to_string()));
        }

        attr.filename = new_name.as_bytes().to_vec();
        self.dir_write_attr(resolved.cursor, &attr)?;
        self.flush()?;
        Ok(())
    }

    /// Update `accessed`/`modified`; `created` is immutable after creation
    /// (spec §4.7 "Utime").
    pub fn utime(&mut self, path: &str, accessed: Timestamp, modified: Timestamp) -> Result<()> {
        let resolved = self.resolve(path)?;
        let mut attr = resolved
            .attr
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        attr.accessed = accessed;
        attr.modified = modified;
        self.dir_write_attr(resolved.cursor, &attr)?;
        self.flush()?;
        Ok(())
    }

    /// List `(name, attributes)` pairs of a directory (spec §6 "list
    /// directory").
    pub fn list_dir(&mut self, path: &str) -> Result<Vec<Attr>> {
        let resolved = self.resolve(path)?;
        let head = match &resolved.attr {
            Some(attr) if attr.is_directory() => attr.first_cluster,
            Some(_) => return Err(Error::NotADirectory(path.to_string())),
            None => self.root_cluster(),
        };
        self.read_dir(head)?.collect()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::device::{Device, MemDevice};
    use crate::error::Error;
    use crate::volume::{OpenOptions, Volume};

    fn make_volume() -> Volume {
        let partition_size = 4 * 1024 * 1024u64;
        let total = 4096 + partition_size;
        let device: Rc<RefCell<dyn Device>> = Rc::new(RefCell::new(MemDevice::new(total as usize)));
        let options = OpenOptions::new(0, partition_size).sector_size(512);
        Volume::format(device, options, 8).unwrap()
    }

    #[test]
    fn create_write_read_round_trips_a_small_file() {
        let mut vol = make_volume();
        vol.create_file("/hello.txt").unwrap();
        let written = vol.write("/hello.txt", 0, b"hello fatx").unwrap();
        assert_eq!(written, 10);

        let mut buf = [0u8; 10];
        let read = vol.read("/hello.txt", 0, &mut buf).unwrap();
        assert_eq!(read, 10);
        assert_eq!(&buf, b"hello fatx");

        let attr = vol.get_attr("/hello.txt").unwrap();
        assert_eq!(attr.file_size, 10);
    }

    #[test]
    fn write_across_a_cluster_boundary_grows_the_chain() {
        let mut vol = make_volume();
        vol.create_file("/big.bin").unwrap();
        let bpc = vol.bytes_per_cluster() as usize;
        let data = vec![0xAB; bpc + 100];
        vol.write("/big.bin", 0, &data).unwrap();

        let mut buf = vec![0u8; bpc + 100];
        vol.read("/big.bin", 0, &mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn read_at_eof_returns_zero_bytes() {
        let mut vol = make_volume();
        vol.create_file("/empty.txt").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(vol.read("/empty.txt", 0, &mut buf).unwrap(), 0);
    }

    #[test]
    fn read_past_eof_is_an_error() {
        let mut vol = make_volume();
        vol.create_file("/empty.txt").unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(
            vol.read("/empty.txt", 100, &mut buf),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn truncate_down_shrinks_and_frees_whole_clusters() {
        let mut vol = make_volume();
        vol.create_file("/f.bin").unwrap();
        let bpc = vol.bytes_per_cluster() as u64;
        vol.write("/f.bin", 0, &vec![7u8; (bpc + 10) as usize])
            .unwrap();
        let free_before = vol.stat().unwrap().bytes_free;

        vol.truncate("/f.bin", 2).unwrap();
        assert_eq!(vol.get_attr("/f.bin").unwrap().file_size, 2);
        let free_after = vol.stat().unwrap().bytes_free;
        assert!(free_after > free_before);

        let mut buf = [0u8; 2];
        vol.read("/f.bin", 0, &mut buf).unwrap();
        assert_eq!(buf, [7, 7]);
    }

    #[test]
    fn truncate_up_within_the_same_cluster_extends_the_reported_size() {
        let mut vol = make_volume();
        vol.create_file("/f.bin").unwrap();
        vol.write("/f.bin", 0, &[1, 2, 3]).unwrap();
        vol.truncate("/f.bin", 2).unwrap();
        vol.truncate("/f.bin", 3).unwrap();
        assert_eq!(vol.get_attr("/f.bin").unwrap().file_size, 3);
    }

    #[test]
    fn write_past_end_truncates_the_gap_to_exactly_the_offset() {
        let mut vol = make_volume();
        vol.create_file("/f.bin").unwrap();
        vol.write("/f.bin", 0, &[9, 9]).unwrap();
        vol.write("/f.bin", 10, &[1, 2, 3]).unwrap();
        assert_eq!(vol.get_attr("/f.bin").unwrap().file_size, 13);

        let mut buf = [0u8; 13];
        vol.read("/f.bin", 0, &mut buf).unwrap();
        assert_eq!(&buf[0..2], &[9, 9]);
        assert_eq!(&buf[2..10], &[0u8; 8]);
        assert_eq!(&buf[10..13], &[1, 2, 3]);
    }

    #[test]
    fn mkdir_list_and_rmdir() {
        let mut vol = make_volume();
        vol.create_dir("/sub").unwrap();
        vol.create_file("/sub/a.txt").unwrap();

        let listing = vol.list_dir("/sub").unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].filename, b"a.txt");

        assert!(matches!(vol.rmdir("/sub"), Err(Error::NotEmpty(_))));
        vol.unlink("/sub/a.txt").unwrap();
        vol.rmdir("/sub").unwrap();
        assert!(matches!(vol.get_attr("/sub"), Err(Error::NotFound(_))));
    }

    #[test]
    fn create_existing_name_fails() {
        let mut vol = make_volume();
        vol.create_file("/dup.txt").unwrap();
        assert!(matches!(
            vol.create_file("/dup.txt"),
            Err(Error::AlreadyExists(_))
        ));
    }

    #[test]
    fn name_too_long_is_rejected() {
        let mut vol = make_volume();
        let name = format!("/{}", "a".repeat(43));
        assert!(matches!(
            vol.create_file(&name),
            Err(Error::NameTooLong { .. })
        ));
    }

    #[test]
    fn rename_within_same_directory() {
        let mut vol = make_volume();
        vol.create_file("/old.txt").unwrap();
        vol.rename("/old.txt", "/new.txt").unwrap();
        assert!(matches!(vol.get_attr("/old.txt"), Err(Error::NotFound(_))));
        assert_eq!(vol.get_attr("/new.txt").unwrap().filename, b"new.txt");
    }

    #[test]
    fn rename_across_directories_is_rejected() {
        let mut vol = make_volume();
        vol.create_dir("/sub").unwrap();
        vol.create_file("/old.txt").unwrap();
        assert!(matches!(
            vol.rename("/old.txt", "/sub/old.txt"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn unlink_frees_the_clusters() {
        let mut vol = make_volume();
        vol.create_file("/f.bin").unwrap();
        let bpc = vol.bytes_per_cluster() as usize;
        vol.write("/f.bin", 0, &vec![1u8; bpc + 10]).unwrap();
        let before = vol.stat().unwrap().bytes_free;
        vol.unlink("/f.bin").unwrap();
        let after = vol.stat().unwrap().bytes_free;
        assert!(after > before);
    }
}
