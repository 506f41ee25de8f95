use std::fs::{File, OpenOptions};
use std::ops::Range;
use std::path::Path;

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::core::error::{Error, ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapMode {
    Read,
    Write,
}

#[derive(Debug)]
enum Mapping {
    Read(Mmap),
    Write(MmapMut),
}

/// A scoped mapping over an exact byte range of a file.
///
/// Releasing is `Drop`: the mapping cannot outlive the operation that
/// acquired it, on any exit path. Regions are never cached or reused —
/// every acquisition is fresh, so a mapping can never dangle past a
/// truncation that happened between operations.
///
/// mmap offsets must be page-aligned; the region maps from the containing
/// page boundary and hides the slack, so offsets on the public surface are
/// relative to the requested range.
#[derive(Debug)]
pub struct MappedRegion {
    mapping: Mapping,
    lead: usize,
    len: usize,
}

impl MappedRegion {
    /// Maps exactly `range` of `path`. The file must already cover the
    /// range — extending is a separate step (`extend_to`), never a side
    /// effect of mapping.
    pub fn acquire(path: &Path, range: Range<u64>, mode: MapMode) -> Result<Self> {
        if range.start >= range.end {
            return Err(Error::new(
                ErrorKind::InvalidRange,
                format!("empty or reversed range {}..{}", range.start, range.end),
            ));
        }
        let file = open(path, mode)?;
        let file_len = file.metadata()?.len();
        if range.end > file_len {
            return Err(Error::new(
                ErrorKind::InvalidRange,
                format!(
                    "range {}..{} exceeds file length {file_len}",
                    range.start, range.end
                ),
            ));
        }
        let lead = (range.start % page_size()) as usize;
        let map_start = range.start - lead as u64;
        let len = (range.end - range.start) as usize;
        let map_len = lead + len;
        let mapping = match mode {
            MapMode::Read => {
                let mmap = unsafe { MmapOptions::new().offset(map_start).len(map_len).map(&file)? };
                Mapping::Read(mmap)
            }
            MapMode::Write => {
                let mmap =
                    unsafe { MmapOptions::new().offset(map_start).len(map_len).map_mut(&file)? };
                Mapping::Write(mmap)
            }
        };
        Ok(MappedRegion { mapping, lead, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, offset: usize) -> Option<u8> {
        self.as_slice().get(offset).copied()
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.mapping {
            Mapping::Read(mmap) => &mmap[self.lead..self.lead + self.len],
            Mapping::Write(mmap) => &mmap[self.lead..self.lead + self.len],
        }
    }

    pub fn put(&mut self, offset: usize, byte: u8) -> Result<()> {
        if offset >= self.len {
            return Err(Error::new(
                ErrorKind::InvalidRange,
                format!("offset {offset} outside region of {} bytes", self.len),
            ));
        }
        self.writable()?[offset] = byte;
        Ok(())
    }

    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= self.len)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidRange,
                    format!(
                        "{} bytes at offset {offset} overflow region of {} bytes",
                        bytes.len(),
                        self.len
                    ),
                )
            })?;
        self.writable()?[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    pub fn as_mut_slice(&mut self) -> Result<&mut [u8]> {
        self.writable()
    }

    /// Forces mapped writes to durable storage. Write mode only.
    pub fn flush(&self) -> Result<()> {
        match &self.mapping {
            Mapping::Write(mmap) => {
                mmap.flush()?;
                Ok(())
            }
            Mapping::Read(_) => Err(Error::new(
                ErrorKind::InvalidInput,
                "flush on a read-mode region",
            )),
        }
    }

    fn writable(&mut self) -> Result<&mut [u8]> {
        match &mut self.mapping {
            Mapping::Write(mmap) => Ok(&mut mmap[self.lead..self.lead + self.len]),
            Mapping::Read(_) => Err(Error::new(
                ErrorKind::InvalidInput,
                "write through a read-mode region",
            )),
        }
    }
}

fn open(path: &Path, mode: MapMode) -> Result<File> {
    let file = match mode {
        MapMode::Read => File::open(path)?,
        MapMode::Write => OpenOptions::new().read(true).write(true).open(path)?,
    };
    Ok(file)
}

#[cfg(unix)]
fn page_size() -> u64 {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as u64 }
}

#[cfg(not(unix))]
fn page_size() -> u64 {
    4096
}

/// Extends `path` to `len` bytes, creating the file if absent. Distinct
/// from mapping: a region is only ever acquired over bytes the file
/// already has.
pub fn extend_to(path: &Path, len: u64) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)?;
    if file.metadata()?.len() < len {
        file.set_len(len)?;
    }
    Ok(())
}

/// Truncates `path` down to `len` bytes and syncs.
pub fn truncate_to(path: &Path, len: u64) -> Result<()> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    if file.metadata()?.len() < len {
        return Err(Error::new(
            ErrorKind::InvalidRange,
            format!("cannot truncate up to {len} bytes"),
        ));
    }
    file.set_len(len)?;
    file.sync_all()?;
    Ok(())
}
