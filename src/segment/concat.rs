// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `concat` backend: GRIB/BUFR messages appended end-to-end with no framing
//! (spec.md §3), grounded on `arki/dataset/segment/concat.cc` and
//! `arki/reader.cc`.

use super::backend::{stream_bytes, AppendTransaction, RepackTransaction, ScannedRecord, SegmentChecker, SegmentReader, SegmentWriter};
use crate::lock::FileLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// Read-only handle on a `concat` segment, holding a shared byte-0 lock for
/// its whole lifetime (spec.md §3 "Ownership and lifecycle").
pub struct ConcatReader {
    file: File,
    _lock: FileLock,
}

impl ConcatReader {
    /// Opens `path` read-only and takes the shared reader lock.
    pub fn open(path: &Path) -> crate::Result<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                crate::Error::NotFound(format!("{}: the file has disappeared", path.display()))
            } else {
                crate::Error::Io(e)
            }
        })?;
        let lock = FileLock::lock_shared_read(&file)?;
        Ok(Self { file, _lock: lock })
    }
}

impl SegmentReader for ConcatReader {
    fn read(&self, offset: u64, size: u64) -> crate::Result<Vec<u8>> {
        let mut buf = vec![0u8; size as usize];
        let n = self.file.read_at(&mut buf, offset)?;
        if n as u64 != size {
            return Err(crate::Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("only {n}/{size} bytes read at offset {offset}"),
            )));
        }
        Ok(buf)
    }

    fn stream(&self, offset: u64, size: u64, out: &mut dyn Write) -> crate::Result<u64> {
        let buf = self.read(offset, size)?;
        stream_bytes(&buf, false, out)
    }
}

/// Append-only handle on a `concat` segment, holding the append-byte lock
/// for the duration of each `append` call.
pub struct ConcatWriter {
    path: PathBuf,
    file: File,
}

impl ConcatWriter {
    /// Opens or creates `path` for appending.
    pub fn open(path: &Path) -> crate::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        Ok(Self { path: path.to_path_buf(), file })
    }
}

impl SegmentWriter for ConcatWriter {
    fn append(&mut self, data: &[u8]) -> crate::Result<AppendTransaction> {
        let _lock = FileLock::lock_exclusive_append(&self.file)?;
        let pre_size = self.file.metadata()?.len();

        self.file.seek(SeekFrom::Start(pre_size))?;
        self.file.write_all(data)?;

        let path = self.path.clone();
        let size = data.len() as u64;

        Ok(AppendTransaction {
            offset: pre_size,
            size,
            committed: false,
            commit_fn: {
                let file = self.file.try_clone()?;
                Box::new(move || {
                    file.sync_data()?;
                    Ok(())
                })
            },
            rollback_fn: Box::new(move || {
                let f = OpenOptions::new().write(true).open(&path)?;
                f.set_len(pre_size)
            }),
        })
    }
}

/// Maintenance handle on a `concat` segment.
pub struct ConcatChecker {
    path: PathBuf,
}

impl ConcatChecker {
    /// Builds a checker for `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SegmentChecker for ConcatChecker {
    fn scan_data(&self) -> crate::Result<Vec<ScannedRecord>> {
        // Without a validator, concat cannot self-delimit; `scan_data` in
        // the absence of an index/metadata side-car degrades to "whole
        // file is one record" here and is expected to be driven by a
        // format-aware `Scanner` in the caller for real recovery. The core
        // only needs the byte range.
        let mut file = File::open(&self.path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let size = data.len() as u64;
        Ok(vec![ScannedRecord { offset: 0, size, data }])
    }

    fn repack(&self, records: &[&[u8]]) -> crate::Result<(Vec<(u64, u64)>, RepackTransaction)> {
        let tmp_path = self.path.with_extension("repack-tmp");
        let mut tmp = File::create(&tmp_path)?;

        let mut offsets = Vec::with_capacity(records.len());
        let mut offset = 0u64;
        for record in records {
            tmp.write_all(record)?;
            offsets.push((offset, record.len() as u64));
            offset += record.len() as u64;
        }
        tmp.sync_all()?;
        drop(tmp);

        let live_path = self.path.clone();
        let tmp_for_commit = tmp_path.clone();
        let tmp_for_rollback = tmp_path.clone();

        Ok((
            offsets,
            RepackTransaction {
                committed: false,
                commit_fn: Box::new(move || {
                    std::fs::rename(&tmp_for_commit, &live_path)?;
                    Ok(())
                }),
                rollback_fn: Box::new(move || {
                    if tmp_for_rollback.exists() {
                        std::fs::remove_file(&tmp_for_rollback)?;
                    }
                    Ok(())
                }),
            },
        ))
    }

    fn remove(&self) -> crate::Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        for ext in [".metadata", ".summary"] {
            let side = append_ext(&self.path, ext);
            if side.exists() {
                std::fs::remove_file(side)?;
            }
        }
        Ok(())
    }

    fn physical_len(&self) -> crate::Result<u64> {
        Ok(std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0))
    }
}

pub(crate) fn append_ext(path: &Path, ext: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(ext);
    PathBuf::from(s)
}

#[cfg(any(test, feature = "test-fixtures"))]
impl ConcatChecker {
    /// Truncates the segment at `offset`, simulating a crash mid-write.
    pub fn test_truncate(&self, offset: u64) -> crate::Result<()> {
        let f = OpenOptions::new().write(true).open(&self.path)?;
        f.set_len(offset)?;
        Ok(())
    }

    /// Overwrites one byte inside an existing record, simulating bit rot.
    pub fn test_corrupt(&self, at: u64) -> crate::Result<()> {
        let mut f = OpenOptions::new().write(true).read(true).open(&self.path)?;
        let mut byte = [0u8; 1];
        f.seek(SeekFrom::Start(at))?;
        f.read_exact(&mut byte)?;
        byte[0] ^= 0xFF;
        f.seek(SeekFrom::Start(at))?;
        f.write_all(&byte)?;
        Ok(())
    }

    /// Inserts extra junk bytes between two records, creating a gap.
    pub fn test_make_hole(&self, at: u64, hole_size: u64) -> crate::Result<()> {
        let mut data = std::fs::read(&self.path)?;
        let at = at.min(data.len() as u64) as usize;
        let mut hole = vec![0u8; hole_size as usize];
        data.splice(at..at, hole.drain(..));
        std::fs::write(&self.path, data)?;
        Ok(())
    }
}
