//! Memory-mapped staging region
//!
//! A fixed-size `MAP_SHARED` region backed by a hidden file next to the
//! output files, plus a sidecar recording the write cursor as four hex
//! digits. Because both live on disk, a crash loses at most the line being
//! appended: on restart the region is remapped, the cursor is read back and
//! the staged bytes are flushed before new data flows.
//!
//! The sidecar is rewritten in full on every cursor update, so a torn write
//! resolves to either the previous or the new cursor.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::PersistError;

/// Size of every staging region in bytes.
pub const MAX_PERSISTER_BUFFER_SIZE: usize = 64 * 1024;

/// The staging region of one persist job.
pub struct StagingRegion {
    map: MmapMut,
    offset: usize,
    info: File,
    backing_path: PathBuf,
    info_path: PathBuf,
}

impl StagingRegion {
    /// Open or recover the staging region for job `id` under `dir`.
    ///
    /// Returns the region and whether it was restored from a previous run.
    /// A restored region carries the staged-but-unflushed bytes of the
    /// crashed process; the caller must flush them before appending.
    pub fn open(dir: &Path, id: u32) -> Result<(Self, bool), PersistError> {
        let backing_path = dir.join(format!(".{id}"));
        let info_path = dir.join(format!(".{id}.info"));

        let (file, restored) = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(0)
            .open(&backing_path)
        {
            Ok(file) => (file, false),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let file = reopen_backing(&backing_path).map_err(|source| PersistError::Open {
                    path: backing_path.clone(),
                    source,
                })?;
                (file, true)
            }
            Err(source) => {
                return Err(PersistError::Open {
                    path: backing_path,
                    source,
                })
            }
        };

        // Covers both the fresh file and a file truncated by a crash
        // mid-creation.
        file.set_len(MAX_PERSISTER_BUFFER_SIZE as u64)?;
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(PersistError::Mmap)?;
        drop(file);

        let mut info = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&info_path)
            .map_err(|source| PersistError::Open {
                path: info_path.clone(),
                source,
            })?;

        let offset = if restored {
            read_cursor(&mut info).min(MAX_PERSISTER_BUFFER_SIZE)
        } else {
            0
        };

        let mut region = Self {
            map,
            offset,
            info,
            backing_path,
            info_path,
        };
        if !restored {
            region.set_offset(0)?;
        }
        Ok((region, restored))
    }

    /// Current write cursor.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Region capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.map.len()
    }

    /// The staged bytes awaiting a flush.
    pub fn staged(&self) -> &[u8] {
        &self.map[..self.offset]
    }

    /// Append `line` plus a trailing newline.
    ///
    /// Returns `Ok(false)` without writing anything when the line would not
    /// fit; the caller flushes and retries.
    pub fn append(&mut self, line: &[u8]) -> io::Result<bool> {
        let needed = line.len() + 1;
        if self.offset + needed > self.capacity() {
            return Ok(false);
        }
        self.map[self.offset..self.offset + line.len()].copy_from_slice(line);
        self.map[self.offset + line.len()] = b'\n';
        self.set_offset(self.offset + needed)?;
        Ok(true)
    }

    /// Reset the cursor after a flush.
    pub fn reset(&mut self) -> io::Result<()> {
        self.set_offset(0)
    }

    /// Delete the backing file and the cursor sidecar.
    pub fn remove_files(self) -> io::Result<()> {
        let Self {
            map,
            info,
            backing_path,
            info_path,
            ..
        } = self;
        drop(map);
        drop(info);
        fs::remove_file(&backing_path)?;
        fs::remove_file(&info_path)
    }

    fn set_offset(&mut self, offset: usize) -> io::Result<()> {
        self.offset = offset;
        let text = format!("{offset:04x}\n");
        self.info.seek(SeekFrom::Start(0))?;
        self.info.write_all(text.as_bytes())?;
        self.info.set_len(text.len() as u64)
    }
}

/// Reopen an existing backing file.
///
/// The file is created with no permission bits, so when the daemon runs
/// unprivileged the owner has to grant itself access again first.
fn reopen_backing(path: &Path) -> io::Result<File> {
    let reopen = || OpenOptions::new().read(true).write(true).open(path);
    match reopen() {
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
            reopen()
        }
        other => other,
    }
}

/// Parse the 4-hex-digit cursor, falling back to zero on any damage.
fn read_cursor(info: &mut File) -> usize {
    let mut text = String::new();
    if info.seek(SeekFrom::Start(0)).is_err() || info.read_to_string(&mut text).is_err() {
        return 0;
    }
    let first_line = text.lines().next().unwrap_or("");
    usize::from_str_radix(first_line.trim(), 16).unwrap_or(0)
}

#[cfg(test)]
#[path = "staging_test.rs"]
mod staging_test;
