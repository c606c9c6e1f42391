// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `dir` backend: one file per record inside a directory (spec.md §3), used
//! for ODIM_H5/NetCDF/JPEG, which cannot share a container file. A
//! `.sequence` marker holds the next ordinal. `offset == ordinal`.

use super::backend::{AppendTransaction, RepackTransaction, ScannedRecord, SegmentChecker, SegmentReader, SegmentWriter};
use crate::metadata::Format;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

fn record_name(ordinal: u64, format: Format) -> String {
    format!("{ordinal:06}.{format}")
}

fn read_sequence(dir: &Path) -> crate::Result<u64> {
    match fs::read_to_string(dir.join(".sequence")) {
        Ok(s) => s.trim().parse::<u64>().map_err(|e| crate::Error::Decode(e.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(crate::Error::Io(e)),
    }
}

fn write_sequence(dir: &Path, next: u64) -> crate::Result<()> {
    let tmp = dir.join(".sequence.tmp");
    fs::write(&tmp, next.to_string())?;
    fs::rename(tmp, dir.join(".sequence"))?;
    Ok(())
}

/// Read-only handle on a `dir` segment. `dir` segments are not individually
/// lockable the way a single file is; the directory's membership is fixed
/// by construction (append creates new files, never rewrites existing
/// ones), so no lock is held across reads.
pub struct DirReader {
    dir: PathBuf,
    format: Format,
}

impl DirReader {
    /// Opens `dir` for reading; fails if it does not exist.
    pub fn open(dir: &Path, format: Format) -> crate::Result<Self> {
        if !dir.is_dir() {
            return Err(crate::Error::NotFound(format!("{}: the file has disappeared", dir.display())));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            format,
        })
    }
}

impl SegmentReader for DirReader {
    fn read(&self, offset: u64, size: u64) -> crate::Result<Vec<u8>> {
        let path = self.dir.join(record_name(offset, self.format));
        let data = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                crate::Error::NotFound(format!("{}: the file has disappeared", path.display()))
            } else {
                crate::Error::Io(e)
            }
        })?;
        if size != 0 && data.len() as u64 != size {
            return Err(crate::Error::Consistency(format!(
                "{}: expected {size} bytes, found {}",
                path.display(),
                data.len()
            )));
        }
        Ok(data)
    }

    fn stream(&self, offset: u64, size: u64, out: &mut dyn Write) -> crate::Result<u64> {
        let data = self.read(offset, size)?;
        super::backend::stream_bytes(&data, false, out)
    }
}

/// Append-only handle on a `dir` segment.
pub struct DirWriter {
    dir: PathBuf,
    format: Format,
}

impl DirWriter {
    /// Opens or creates `dir` for appending.
    pub fn open(dir: &Path, format: Format) -> crate::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            format,
        })
    }
}

impl SegmentWriter for DirWriter {
    fn append(&mut self, data: &[u8]) -> crate::Result<AppendTransaction> {
        let ordinal = read_sequence(&self.dir)?;
        let final_path = self.dir.join(record_name(ordinal, self.format));
        let tmp_path = self.dir.join(format!(".tmp-{ordinal:06}"));

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(data)?;
        tmp.sync_all()?;
        drop(tmp);

        let dir = self.dir.clone();
        let commit_final_path = final_path.clone();
        let commit_tmp_path = tmp_path.clone();
        let rollback_tmp_path = tmp_path.clone();

        Ok(AppendTransaction {
            offset: ordinal,
            size: data.len() as u64,
            committed: false,
            commit_fn: Box::new(move || {
                fs::rename(&commit_tmp_path, &commit_final_path)?;
                write_sequence(&dir, ordinal + 1)
            }),
            rollback_fn: Box::new(move || {
                if rollback_tmp_path.exists() {
                    fs::remove_file(&rollback_tmp_path)?;
                }
                Ok(())
            }),
        })
    }
}

/// Maintenance handle on a `dir` segment.
pub struct DirChecker {
    dir: PathBuf,
    format: Format,
}

impl DirChecker {
    /// Builds a checker for `dir`.
    #[must_use]
    pub fn new(dir: PathBuf, format: Format) -> Self {
        Self { dir, format }
    }

    fn record_paths(&self) -> crate::Result<Vec<(u64, PathBuf)>> {
        let mut out = Vec::new();
        if !self.dir.is_dir() {
            return Ok(out);
        }
        let suffix = format!(".{}", self.format);
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(&suffix) {
                if let Ok(ordinal) = stem.parse::<u64>() {
                    out.push((ordinal, entry.path()));
                }
            }
        }
        out.sort_by_key(|(o, _)| *o);
        Ok(out)
    }
}

impl SegmentChecker for DirChecker {
    fn scan_data(&self) -> crate::Result<Vec<ScannedRecord>> {
        let mut out = Vec::new();
        for (ordinal, path) in self.record_paths()? {
            let data = fs::read(&path)?;
            out.push(ScannedRecord {
                offset: ordinal,
                size: data.len() as u64,
                data,
            });
        }
        Ok(out)
    }

    fn repack(&self, records: &[&[u8]]) -> crate::Result<(Vec<(u64, u64)>, RepackTransaction)> {
        let tmp_dir = self.dir.with_extension("repack-tmp");
        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        let mut offsets = Vec::with_capacity(records.len());
        for (ordinal, record) in records.iter().enumerate() {
            let ordinal = ordinal as u64;
            let mut f = File::create(tmp_dir.join(record_name(ordinal, self.format)))?;
            f.write_all(record)?;
            offsets.push((ordinal, record.len() as u64));
        }
        write_sequence(&tmp_dir, records.len() as u64)?;

        let live_dir = self.dir.clone();
        let commit_tmp_dir = tmp_dir.clone();
        let rollback_tmp_dir = tmp_dir.clone();

        Ok((
            offsets,
            RepackTransaction {
                committed: false,
                commit_fn: Box::new(move || {
                    if live_dir.exists() {
                        fs::remove_dir_all(&live_dir)?;
                    }
                    fs::rename(&commit_tmp_dir, &live_dir)?;
                    Ok(())
                }),
                rollback_fn: Box::new(move || {
                    if rollback_tmp_dir.exists() {
                        fs::remove_dir_all(&rollback_tmp_dir)?;
                    }
                    Ok(())
                }),
            },
        ))
    }

    fn remove(&self) -> crate::Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }

    fn physical_len(&self) -> crate::Result<u64> {
        Ok(self.record_paths()?.len() as u64)
    }
}

#[cfg(any(test, feature = "test-fixtures"))]
impl DirChecker {
    /// Removes the last `n` record files, simulating a partial write.
    pub fn test_truncate_records(&self, keep: u64) -> crate::Result<()> {
        for (ordinal, path) in self.record_paths()? {
            if ordinal >= keep {
                fs::remove_file(path)?;
            }
        }
        write_sequence(&self.dir, keep)
    }
}
