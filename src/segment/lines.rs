// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `lines` backend: VM2 records, each newline-terminated, offsets measured
//! cumulatively including the newline (spec.md §3).

use super::backend::{AppendTransaction, RepackTransaction, ScannedRecord, SegmentChecker, SegmentReader, SegmentWriter};
use super::concat::append_ext;
use crate::lock::FileLock;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// Read-only handle on a `lines` segment.
pub struct LinesReader {
    file: File,
    _lock: FileLock,
}

impl LinesReader {
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

impl SegmentReader for LinesReader {
    fn read(&self, offset: u64, size: u64) -> crate::Result<Vec<u8>> {
        // `size` here is the record's declared length *without* the
        // trailing newline; the newline lives at `offset + size`.
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
        let data = self.read(offset, size)?;
        super::backend::stream_bytes(&data, true, out)
    }
}

/// Append-only handle on a `lines` segment.
pub struct LinesWriter {
    path: PathBuf,
    file: File,
}

impl LinesWriter {
    /// Opens or creates `path` for appending.
    pub fn open(path: &Path) -> crate::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        Ok(Self { path: path.to_path_buf(), file })
    }
}

impl SegmentWriter for LinesWriter {
    fn append(&mut self, data: &[u8]) -> crate::Result<AppendTransaction> {
        let _lock = FileLock::lock_exclusive_append(&self.file)?;
        let pre_size = self.file.metadata()?.len();

        self.file.seek(SeekFrom::Start(pre_size))?;
        self.file.write_all(data)?;
        self.file.write_all(b"\n")?;

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

/// Maintenance handle on a `lines` segment.
pub struct LinesChecker {
    path: PathBuf,
}

impl LinesChecker {
    /// Builds a checker for `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SegmentChecker for LinesChecker {
    fn scan_data(&self) -> crate::Result<Vec<ScannedRecord>> {
        let data = std::fs::read(&self.path)?;
        let mut out = Vec::new();
        let mut start = 0usize;
        for (i, &b) in data.iter().enumerate() {
            if b == b'\n' {
                out.push(ScannedRecord {
                    offset: start as u64,
                    size: (i - start) as u64,
                    data: data[start..i].to_vec(),
                });
                start = i + 1;
            }
        }
        Ok(out)
    }

    fn repack(&self, records: &[&[u8]]) -> crate::Result<(Vec<(u64, u64)>, RepackTransaction)> {
        let tmp_path = self.path.with_extension("repack-tmp");
        let mut tmp = File::create(&tmp_path)?;

        let mut offsets = Vec::with_capacity(records.len());
        let mut offset = 0u64;
        for record in records {
            tmp.write_all(record)?;
            tmp.write_all(b"\n")?;
            offsets.push((offset, record.len() as u64));
            offset += record.len() as u64 + 1;
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

#[cfg(any(test, feature = "test-fixtures"))]
impl LinesChecker {
    /// Truncates the segment at `offset`.
    pub fn test_truncate(&self, offset: u64) -> crate::Result<()> {
        let f = OpenOptions::new().write(true).open(&self.path)?;
        f.set_len(offset)?;
        Ok(())
    }
}
