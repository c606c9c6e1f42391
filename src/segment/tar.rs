// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `tar` backend: members named `NNNNNN.<format>`, offset points at the
//! member's data (spec.md §3). Read-only: this core does not support live
//! append into a tar segment, only maintenance via `repack`.

use super::backend::{RepackTransaction, ScannedRecord, SegmentChecker, SegmentReader};
use crate::lock::FileLock;
use crate::metadata::Format;
use std::fs::File;
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

fn ordinal_from_name(name: &str, format: Format) -> Option<u64> {
    name.strip_suffix(&format!(".{format}"))?.parse().ok()
}

fn build_index(path: &Path, format: Format) -> crate::Result<Vec<(u64, u64, u64)>> {
    let file = File::open(path)?;
    let mut archive = tar::Archive::new(file);
    let mut out = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let Some(ordinal) = ordinal_from_name(&name, format) else {
            continue;
        };
        let file_offset = entry.raw_file_position();
        let size = entry.header().size()?;
        out.push((ordinal, file_offset, size));
    }
    out.sort_by_key(|(o, ..)| *o);
    Ok(out)
}

/// Read-only handle on a `tar` segment.
pub struct TarReader {
    file: File,
    _lock: FileLock,
    index: Vec<(u64, u64, u64)>,
}

impl TarReader {
    /// Opens `path`, takes the shared reader lock and indexes members.
    pub fn open(path: &Path, format: Format) -> crate::Result<Self> {
        let index = build_index(path, format)?;
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                crate::Error::NotFound(format!("{}: the file has disappeared", path.display()))
            } else {
                crate::Error::Io(e)
            }
        })?;
        let lock = FileLock::lock_shared_read(&file)?;
        Ok(Self { file, _lock: lock, index })
    }

    fn locate(&self, ordinal: u64) -> crate::Result<(u64, u64)> {
        self.index
            .iter()
            .find(|(o, ..)| *o == ordinal)
            .map(|(_, off, size)| (*off, *size))
            .ok_or_else(|| crate::Error::NotFound(format!("no tar member for ordinal {ordinal}")))
    }
}

impl SegmentReader for TarReader {
    fn read(&self, offset: u64, size: u64) -> crate::Result<Vec<u8>> {
        let (file_offset, member_size) = self.locate(offset)?;
        let size = if size != 0 { size } else { member_size };
        let mut buf = vec![0u8; size as usize];
        self.file.read_exact_at(&mut buf, file_offset)?;
        Ok(buf)
    }

    fn stream(&self, offset: u64, size: u64, out: &mut dyn Write) -> crate::Result<u64> {
        let data = self.read(offset, size)?;
        super::backend::stream_bytes(&data, false, out)
    }
}

/// Maintenance handle on a `tar` segment.
pub struct TarChecker {
    path: PathBuf,
    format: Format,
}

impl TarChecker {
    /// Builds a checker for `path`.
    #[must_use]
    pub fn new(path: PathBuf, format: Format) -> Self {
        Self { path, format }
    }
}

impl SegmentChecker for TarChecker {
    fn scan_data(&self) -> crate::Result<Vec<ScannedRecord>> {
        let file = File::open(&self.path)?;
        let mut archive = tar::Archive::new(file);
        let mut out = Vec::new();
        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.to_string_lossy().into_owned();
            let Some(ordinal) = ordinal_from_name(&name, self.format) else {
                continue;
            };
            let mut data = Vec::new();
            std::io::Read::read_to_end(&mut entry, &mut data)?;
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
        let mut builder = tar::Builder::new(tmp_file);

        let mut offsets = Vec::with_capacity(records.len());
        for (ordinal, record) in records.iter().enumerate() {
            let ordinal = ordinal as u64;
            let mut header = tar::Header::new_gnu();
            header.set_size(record.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, format!("{ordinal:06}.{}", self.format), *record)?;
            offsets.push((ordinal, record.len() as u64));
        }
        builder.finish()?;
        drop(builder);

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
        Ok(build_index(&self.path, self.format)?.len() as u64)
    }
}
