// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `zip` backend: records are zip members named like `tar` members
//! (spec.md §3). Like `tar`, this core supports it read-only/maintenance
//! only: the central directory makes incremental append impractical
//! without rewriting the whole container, so it is produced only by
//! `repack`.

use super::backend::{RepackTransaction, ScannedRecord, SegmentChecker, SegmentReader};
use crate::lock::FileLock;
use crate::metadata::Format;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

fn ordinal_from_name(name: &str, format: Format) -> Option<u64> {
    name.strip_suffix(&format!(".{format}"))?.parse().ok()
}

/// Read-only handle on a `zip` segment.
pub struct ZipReader {
    path: PathBuf,
    format: Format,
    _lock: FileLock,
}

impl ZipReader {
    /// Opens `path` and takes the shared reader lock.
    pub fn open(path: &Path, format: Format) -> crate::Result<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                crate::Error::NotFound(format!("{}: the file has disappeared", path.display()))
            } else {
                crate::Error::Io(e)
            }
        })?;
        let lock = FileLock::lock_shared_read(&file)?;
        Ok(Self {
            path: path.to_path_buf(),
            format,
            _lock: lock,
        })
    }
}

impl SegmentReader for ZipReader {
    fn read(&self, offset: u64, _size: u64) -> crate::Result<Vec<u8>> {
        let file = File::open(&self.path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(zip_err)?;
        let name = format!("{offset:06}.{}", self.format);
        let mut entry = archive.by_name(&name).map_err(zip_err)?;
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        Ok(data)
    }

    fn stream(&self, offset: u64, size: u64, out: &mut dyn Write) -> crate::Result<u64> {
        let data = self.read(offset, size)?;
        super::backend::stream_bytes(&data, false, out)
    }
}

fn zip_err(e: zip::result::ZipError) -> crate::Error {
    crate::Error::Io(std::io::Error::other(e.to_string()))
}

/// Maintenance handle on a `zip` segment.
pub struct ZipChecker {
    path: PathBuf,
    format: Format,
}

impl ZipChecker {
    /// Builds a checker for `path`.
    #[must_use]
    pub fn new(path: PathBuf, format: Format) -> Self {
        Self { path, format }
    }
}

impl SegmentChecker for ZipChecker {
    fn scan_data(&self) -> crate::Result<Vec<ScannedRecord>> {
        let file = File::open(&self.path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(zip_err)?;
        let mut out = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(zip_err)?;
            let Some(ordinal) = ordinal_from_name(entry.name(), self.format) else {
                continue;
            };
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            out.push(ScannedRecord {
                offset: ordinal,
                size: data.len() as u64,
                data,
            });
        }
        out.sort_by_key(|r| r.offset);
        Ok(out)
    }

    fn repack(&self, records: &[&[u8]]) -> crate::Result<(Vec<(u64, u64)>, RepackTransaction)> {
        let tmp_path = self.path.with_extension("repack-tmp");
        let tmp_file = File::create(&tmp_path)?;
        let mut writer = zip::ZipWriter::new(tmp_file);
        let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let mut offsets = Vec::with_capacity(records.len());
        for (ordinal, record) in records.iter().enumerate() {
            let ordinal = ordinal as u64;
            writer
                .start_file(format!("{ordinal:06}.{}", self.format), options)
                .map_err(zip_err)?;
            writer.write_all(record)?;
            offsets.push((ordinal, record.len() as u64));
        }
        writer.finish().map_err(zip_err)?;

        let live_path = self.path.clone();
        let commit_tmp_path = tmp_path.clone();
        let rollback_tmp_path = tmp_path.clone();

        Ok((
            offsets,
            RepackTransaction {
                committed: false,
                commit_fn: Box::new(move || {
                    std::fs::rename(&commit_tmp_path, &live_path)?;
                    Ok(())
                }),
                rollback_fn: Box::new(move || {
                    if rollback_tmp_path.exists() {
                        std::fs::remove_file(&rollback_tmp_path)?;
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
        Ok(())
    }

    fn physical_len(&self) -> crate::Result<u64> {
        let file = File::open(&self.path)?;
        let archive = zip::ZipArchive::new(file).map_err(zip_err)?;
        Ok(archive.len() as u64)
    }
}
