//! Evidence source — read-only memory-mapped view over an image or device.
//!
//! # Access contract
//!
//! The source is opened `O_RDONLY` and mapped with `PROT_READ`; nothing in
//! this crate can mutate evidence bytes.  The total size is probed by
//! seeking to the end of the file descriptor, which works for both regular
//! image files and block devices (where `stat` reports zero).
//!
//! [`SourceMap::segment`] hands out non-owning `&[u8]` views into the map.
//! The requested range is clamped to the source end; an offset past the end
//! is a programmer error and fails with [`SourceError::Bounds`].  The map
//! (and the underlying descriptor) is released by `Drop` on every exit path.
//!
//! `block_size` is carried for custody metadata only — the scan driver
//! defines its own iteration block size.

use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use memmap2::Mmap;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Cannot open source {path}: {source}")]
    Open { path: String, #[source] source: io::Error },
    /// A zero-byte source has nothing to scan; fail before the loop starts.
    #[error("Source {0} is empty")]
    EmptySource(String),
    #[error("Cannot map source {path}: {source}")]
    MapFailed { path: String, #[source] source: io::Error },
    /// Segment request past the end of the source.  Callers derive offsets
    /// from the source size, so this is a bug, not a data condition.
    #[error("Segment offset {offset:#x} exceeds source size {size:#x}")]
    Bounds { offset: u64, size: u64 },
}

/// Custody metadata for the scanned source, embedded in the JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct SourceMetadata {
    pub source:         String,
    pub size_bytes:     u64,
    pub block_size:     u64,
    /// Modification time of the source, seconds since the Unix epoch.
    /// Absent for devices that do not report one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_epoch: Option<i64>,
}

/// Read-only mapped view over a disk image or block device.
#[derive(Debug)]
pub struct SourceMap {
    path:       PathBuf,
    map:        Mmap,
    size:       u64,
    block_size: u64,
}

impl SourceMap {
    /// Open and map the source read-only.
    ///
    /// Fails with [`SourceError::EmptySource`] when the probed size is zero
    /// and with [`SourceError::MapFailed`] when the OS refuses the mapping.
    pub fn open<P: AsRef<Path>>(path: P, block_size: u64) -> Result<Self, SourceError> {
        let path = path.as_ref().to_owned();
        let display = path.display().to_string();

        let mut file = File::open(&path)
            .map_err(|e| SourceError::Open { path: display.clone(), source: e })?;

        // Seek-to-end sizing covers block devices, where metadata len is 0.
        let size = file
            .seek(SeekFrom::End(0))
            .map_err(|e| SourceError::Open { path: display.clone(), source: e })?;
        if size == 0 {
            return Err(SourceError::EmptySource(display));
        }

        // Safety: the mapping is PROT_READ and private; the file handle is
        // held for the lifetime of the map.  Concurrent external writes to
        // the evidence would violate the forensic setup, not memory safety
        // of this process' reads.
        let map = unsafe { Mmap::map(&file) }
            .map_err(|e| SourceError::MapFailed { path: display, source: e })?;

        log::info!("mapped source {} ({} bytes)", path.display(), size);

        Ok(Self { path, map, size, block_size: block_size.max(1) })
    }

    /// Borrowed view of `[offset, min(offset + length, size))`.
    ///
    /// Never copies.  `offset == size` yields an empty slice; `offset > size`
    /// is [`SourceError::Bounds`].
    pub fn segment(&self, offset: u64, length: u64) -> Result<&[u8], SourceError> {
        if offset > self.size {
            return Err(SourceError::Bounds { offset, size: self.size });
        }
        let end = offset.saturating_add(length).min(self.size);
        Ok(&self.map[offset as usize..end as usize])
    }

    #[inline] pub fn size(&self)       -> u64   { self.size }
    #[inline] pub fn block_size(&self) -> u64   { self.block_size }
    #[inline] pub fn path(&self)       -> &Path { &self.path }

    /// Custody descriptor for the report header.
    pub fn metadata(&self) -> SourceMetadata {
        let modified_epoch = std::fs::metadata(&self.path)
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);

        SourceMetadata {
            source: self.path.display().to_string(),
            size_bytes: self.size,
            block_size: self.block_size,
            modified_epoch,
        }
    }
}
