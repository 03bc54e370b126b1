//! Component-wise path resolution from the root cluster to a named entry
//! (spec §4.6).
//!
//! Grounded on the teacher crate's `dir::Dir::find` (component walk over
//! `find_by_name`), simplified to byte-for-byte name comparison (FATX has
//! no long-name/short-name split and spec §1 excludes case folding).

use crate::dir::{DirCursor, ReadOutcome};
use crate::dirent::Attr;
use crate::error::{Error, Result};
use crate::volume::Volume;

/// Result of resolving a path: the matched entry's directory cursor plus
/// its decoded attributes, or `None` for the root (which has no parent
/// entry of its own).
pub struct Resolved {
    pub cursor: DirCursor,
    pub attr: Option<Attr>,
}

fn split_components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

/// POSIX-style basename: trailing-slash stripped, all-slashes -> "/",
/// empty -> ".".
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.is_empty() { "." } else { "/" };
    }
    match trimmed.rfind('/') {
        Some(i) => &trimmed[i + 1..],
        None => trimmed,
    }
}

/// POSIX-style dirname: trailing-slash stripped, all-slashes -> "/",
/// empty -> ".".
pub fn dirname(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.is_empty() { "." } else { "/" };
    }
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(i) => &trimmed[..i],
        None => ".",
    }
}

impl Volume {
    /// Find the live entry named `name` in the directory headed at
    /// `dir_head`. Returns `NotFound` on reaching end-of-dir.
    fn find_in_dir(&mut self, dir_head: u32, name: &str) -> Result<(DirCursor, Attr)> {
        let mut cursor = DirCursor::at_head(dir_head);
        loop {
            match self.dir_read(cursor)? {
                ReadOutcome::EndOfDir => {
                    return Err(Error::NotFound(name.to_string()));
                }
                ReadOutcome::Deleted => {
                    cursor = self.dir_advance(cursor)?;
                }
                ReadOutcome::Success(attr) => {
                    if attr.filename == name.as_bytes() {
                        return Ok((cursor, attr));
                    }
                    cursor = self.dir_advance(cursor)?;
                }
            }
        }
    }

    /// Resolve `path` (starting with `/`) to a directory cursor.
    ///
    /// `/` itself resolves to `(root_cluster, 0)` with no attribute entry.
    pub fn resolve(&mut self, path: &str) -> Result<Resolved> {
        let components = split_components(path);
        if components.is_empty() {
            return Ok(Resolved {
                cursor: DirCursor::at_head(self.root_cluster()),
                attr: None,
            });
        }

        let mut dir_head = self.root_cluster();
        let last = components.len() - 1;
        let mut result: Option<(DirCursor, Attr)> = None;

        for (i, component) in components.iter().enumerate() {
            let (cursor, attr) = self.find_in_dir(dir_head, component)?;
            if i != last {
                if !attr.is_directory() {
                    return Err(Error::NotADirectory(component.to_string()));
                }
                dir_head = attr.first_cluster;
            }
            result = Some((cursor, attr));
        }

        let (cursor, attr) = result.unwrap();
        Ok(Resolved {
            cursor,
            attr: Some(attr),
        })
    }

    /// Resolve `path`'s parent directory, returning its head cluster.
    pub fn resolve_parent_dir(&mut self, path: &str) -> Result<u32> {
        let dir = dirname(path);
        if dir == "/" || dir == "." {
            return Ok(self.root_cluster());
        }
        let resolved = self.resolve(dir)?;
        match resolved.attr {
            Some(attr) if attr.is_directory() => Ok(attr.first_cluster),
            Some(_) => Err(Error::NotADirectory(dir.to_string())),
            None => Ok(self.root_cluster()),
        }
    }
}
