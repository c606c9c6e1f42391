// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The `Reader`/`Writer`/`Checker` roles every segment backend implements
//! (spec.md §4.1), each dispatched over its own tagged enum rather than a
//! virtual base class (see SPEC_FULL.md §9, DESIGN.md).

use enum_dispatch::enum_dispatch;
use std::io::Write;

/// One record recovered while scanning a segment's on-disk bytes in
/// physical order (used by `scan_data` and by rescan/check).
#[derive(Debug, Clone)]
pub struct ScannedRecord {
    /// Physical offset of the record (byte offset for concat/lines/gz,
    /// ordinal for dir/tar/zip)
    pub offset: u64,
    /// Size in bytes
    pub size: u64,
    /// Raw bytes of the record
    pub data: Vec<u8>,
}

/// Opens read-only, holds a shared lock for its own lifetime, answers reads
/// (spec.md §4.1 "Reader").
#[enum_dispatch]
pub trait SegmentReader: Send + Sync {
    /// Returns exactly `size` bytes at `offset`.
    fn read(&self, offset: u64, size: u64) -> crate::Result<Vec<u8>>;

    /// Copies `size` bytes at `offset` to `out`, returning bytes written.
    /// For `lines` segments a trailing newline is appended, matching
    /// `arki/reader.cc`'s `stream()`.
    fn stream(&self, offset: u64, size: u64, out: &mut dyn Write) -> crate::Result<u64>;
}

/// A two-phase append transaction (spec.md §4.1 "Writer").
///
/// Dropping without calling [`AppendTransaction::commit`] rolls back: any
/// bytes written after the pre-append size are discarded and the segment is
/// restored to its exact pre-append size.
pub struct AppendTransaction {
    pub(crate) offset: u64,
    pub(crate) size: u64,
    pub(crate) committed: bool,
    pub(crate) commit_fn: Box<dyn FnMut() -> crate::Result<()> + Send>,
    pub(crate) rollback_fn: Box<dyn FnMut() -> std::io::Result<()> + Send>,
}

impl AppendTransaction {
    /// Offset the new record was written at.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size of the newly written record.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Flushes the write durably and marks the transaction committed.
    pub fn commit(mut self) -> crate::Result<()> {
        (self.commit_fn)()?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for AppendTransaction {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = (self.rollback_fn)() {
                log::warn!("append rollback failed: {e}");
            }
        }
    }
}

/// Opens append-only, holds an append lock, answers `append` (spec.md §4.1
/// "Writer"). Backends that don't support live append (`tar`) simply have
/// no `Writer` constructed for them by the segment manager.
#[enum_dispatch]
pub trait SegmentWriter {
    /// Appends `data`, returning a transaction to commit or roll back.
    fn append(&mut self, data: &[u8]) -> crate::Result<AppendTransaction>;
}

/// A repack transaction: on commit, swaps the freshly written temp segment
/// in for the live one; on drop without commit, the temp file is removed
/// and the live segment is untouched.
pub struct RepackTransaction {
    pub(crate) committed: bool,
    pub(crate) commit_fn: Box<dyn FnMut() -> crate::Result<()> + Send>,
    pub(crate) rollback_fn: Box<dyn FnMut() -> std::io::Result<()> + Send>,
}

impl RepackTransaction {
    /// Swaps the new segment in for the old one.
    pub fn commit(mut self) -> crate::Result<()> {
        (self.commit_fn)()?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for RepackTransaction {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = (self.rollback_fn)() {
                log::warn!("repack rollback failed: {e}");
            }
        }
    }
}

/// Opens for maintenance, answers `check`/`repack`/`remove`/`scan_data`
/// (spec.md §4.1 "Checker").
#[enum_dispatch]
pub trait SegmentChecker {
    /// Walks the segment in physical order, returning each record found.
    fn scan_data(&self) -> crate::Result<Vec<ScannedRecord>>;

    /// Rewrites the segment to contain only `records`, in order, returning
    /// the new physical `(offset, size)` for each input record (same
    /// order) plus a transaction to swap the file in.
    fn repack(&self, records: &[&[u8]]) -> crate::Result<(Vec<(u64, u64)>, RepackTransaction)>;

    /// Removes all files belonging to this segment (data plus side-cars).
    fn remove(&self) -> crate::Result<()>;

    /// Current on-disk logical size (bytes for concat/lines/gz, record
    /// count for dir/tar/zip).
    fn physical_len(&self) -> crate::Result<u64>;
}

/// Default `vm2`-aware streaming helper shared by the byte-oriented
/// backends (concat/lines/gz), grounded on `arki/reader.cc`'s `stream()`:
/// appends a trailing `\n` for line-oriented formats, otherwise streams the
/// bytes verbatim.
pub(crate) fn stream_bytes(data: &[u8], is_lines: bool, out: &mut dyn Write) -> crate::Result<u64> {
    out.write_all(data)?;
    if is_lines {
        out.write_all(b"\n")?;
        Ok(data.len() as u64 + 1)
    } else {
        Ok(data.len() as u64)
    }
}
