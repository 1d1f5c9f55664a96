//! Rotating output file set
//!
//! Owns the numbered files under one base path: `<base>.0<suffix>` through
//! `<base>.(N-1)<suffix>`. Slot 0 is always the oldest file after a
//! rollover. The current slot index survives restarts through a one-byte
//! sidecar next to the output files.
//!
//! The rotator does not count bytes; the persister marks segment ends with
//! [`Rotator::finish_input`], which closes the current file on the next
//! input.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::error::PersistError;

/// Rotating writer over a fixed set of numbered files.
pub struct Rotator {
    base: PathBuf,
    suffix: String,
    file_size: u32,
    file_num: u32,
    index: Option<u32>,
    need_rotate: bool,
    current: Option<File>,
    info: File,
    info_path: PathBuf,
}

impl Rotator {
    /// Open a rotator for `base`, restoring the slot index from the sidecar
    /// if one exists.
    ///
    /// The parent directory must already exist.
    pub fn new(
        base: impl Into<PathBuf>,
        suffix: impl Into<String>,
        file_size: u32,
        file_num: u32,
        job_id: u32,
    ) -> Result<Self, PersistError> {
        let base = base.into();
        if file_num == 0 || file_num > u8::MAX as u32 {
            return Err(PersistError::InvalidFileParams {
                file_size,
                file_num,
            });
        }
        let parent = base
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| PersistError::InvalidPath(base.clone()))?;

        let info_path = parent.join(format!(".rotator.{job_id}.info"));
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

        let mut byte = [0u8; 1];
        let index = match info.read_exact(&mut byte) {
            Ok(()) => Some(byte[0].min((file_num - 1) as u8) as u32),
            Err(_) => None,
        };

        Ok(Self {
            base,
            suffix: suffix.into(),
            file_size,
            file_num,
            index,
            need_rotate: true,
            current: None,
            info,
            info_path,
        })
    }

    /// Append a finished chunk to the current output file, rotating first if
    /// the previous segment was closed.
    pub fn input(&mut self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        if self.need_rotate || self.current.is_none() {
            self.rotate()?;
            self.need_rotate = false;
        }
        if let Some(file) = self.current.as_mut() {
            file.write_all(bytes)?;
            file.flush()?;
        }
        Ok(())
    }

    /// Mark the current segment complete; the next input opens a new slot.
    pub fn finish_input(&mut self) {
        self.need_rotate = true;
    }

    /// Configured (file_size, file_num).
    pub fn file_info(&self) -> (u32, u32) {
        (self.file_size, self.file_num)
    }

    /// The slot currently being written, if any output happened yet.
    pub fn index(&self) -> Option<u32> {
        self.index
    }

    /// Delete the index sidecar (used when the job is torn down).
    pub fn remove_info_file(&self) -> io::Result<()> {
        match fs::remove_file(&self.info_path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    /// Advance to the next slot, shifting the whole set down when all slots
    /// are taken: slot 0 is removed, every file moves to the slot below, and
    /// the last slot is reopened fresh.
    fn rotate(&mut self) -> io::Result<()> {
        self.current = None;

        let next = match self.index {
            Some(index) if index + 1 >= self.file_num => {
                self.shift_files_down()?;
                self.file_num - 1
            }
            Some(index) => index + 1,
            None => 0,
        };

        let path = self.slot_path(next);
        self.current = Some(File::create(&path)?);
        self.index = Some(next);
        self.persist_index(next)?;

        tracing::debug!(path = %path.display(), slot = next, "rotated to new output file");
        Ok(())
    }

    fn shift_files_down(&self) -> io::Result<()> {
        match fs::remove_file(self.slot_path(0)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err),
            _ => {}
        }
        for slot in 1..self.file_num {
            // A hole in the sequence is tolerated; later files still shift.
            match fs::rename(self.slot_path(slot), self.slot_path(slot - 1)) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err),
                _ => {}
            }
        }
        Ok(())
    }

    fn slot_path(&self, slot: u32) -> PathBuf {
        let mut name = self.base.as_os_str().to_owned();
        name.push(format!(".{}{}", slot, self.suffix));
        PathBuf::from(name)
    }

    fn persist_index(&mut self, index: u32) -> io::Result<()> {
        self.info.seek(SeekFrom::Start(0))?;
        self.info.write_all(&[index as u8])?;
        self.info.sync_data()
    }
}

#[cfg(test)]
#[path = "rotator_test.rs"]
mod rotator_test;
