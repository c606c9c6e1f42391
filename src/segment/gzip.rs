// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `gz`/`gzidx` backends: records live in a gzip stream; `gzidx`
//! additionally keeps a `.gz.idx` side-car mapping uncompressed-offset
//! blocks to compressed seek points (spec.md §3).
//!
//! Gzip allows concatenating independently-compressed members that
//! decompress back-to-back into one logical stream, so each appended
//! record is written as its own member; the index then only needs to
//! remember where each member's compressed bytes start.

use super::backend::{stream_bytes, AppendTransaction, RepackTransaction, ScannedRecord, SegmentChecker, SegmentReader, SegmentWriter};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

fn idx_path(path: &Path) -> PathBuf {
    super::concat::append_ext(path, ".idx")
}

/// One `.gz.idx` entry: an uncompressed record's offset/size plus the
/// compressed file offset its gzip member starts at.
#[derive(Clone, Copy, Debug)]
struct IdxEntry {
    uncompressed_offset: u64,
    size: u64,
    compressed_offset: u64,
}

fn read_index(path: &Path) -> crate::Result<Vec<IdxEntry>> {
    let text = match std::fs::read_to_string(idx_path(path)) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(crate::Error::Io(e)),
    };
    let mut out = Vec::new();
    for line in text.lines() {
        let mut parts = line.split(' ');
        let u = parts.next().and_then(|s| s.parse().ok());
        let s = parts.next().and_then(|s| s.parse().ok());
        let c = parts.next().and_then(|s| s.parse().ok());
        if let (Some(uncompressed_offset), Some(size), Some(compressed_offset)) = (u, s, c) {
            out.push(IdxEntry {
                uncompressed_offset,
                size,
                compressed_offset,
            });
        }
    }
    Ok(out)
}

fn write_index(path: &Path, entries: &[IdxEntry]) -> crate::Result<()> {
    let mut text = String::new();
    for e in entries {
        text.push_str(&format!("{} {} {}\n", e.uncompressed_offset, e.size, e.compressed_offset));
    }
    std::fs::write(idx_path(path), text)?;
    Ok(())
}

fn decompress_member(file: &File, compressed_offset: u64) -> crate::Result<Vec<u8>> {
    use std::io::{Seek, SeekFrom};
    let mut f = file.try_clone()?;
    f.seek(SeekFrom::Start(compressed_offset))?;
    let mut decoder = flate2::read::GzDecoder::new(f);
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read-only handle on a `gz`/`gzidx` segment.
pub struct GzReader {
    file: File,
    index: Vec<IdxEntry>,
}

impl GzReader {
    /// Opens `path`, loading its `.gz.idx` side-car (or building an
    /// in-memory one by decompressing once, if absent).
    pub fn open(path: &Path) -> crate::Result<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                crate::Error::NotFound(format!("{}: the file has disappeared", path.display()))
            } else {
                crate::Error::Io(e)
            }
        })?;
        let mut index = read_index(path)?;
        if index.is_empty() {
            index = Self::rebuild_index(&file)?;
        }
        Ok(Self { file, index })
    }

    fn rebuild_index(file: &File) -> crate::Result<Vec<IdxEntry>> {
        use std::io::{Seek, SeekFrom};
        let mut out = Vec::new();
        let mut compressed_offset = 0u64;
        let mut uncompressed_offset = 0u64;
        let len = file.metadata()?.len();
        let mut f = file.try_clone()?;
        while compressed_offset < len {
            f.seek(SeekFrom::Start(compressed_offset))?;
            let mut decoder = flate2::read::GzDecoder::new(&mut f);
            let mut buf = Vec::new();
            decoder.read_to_end(&mut buf)?;
            let member_compressed_len = decoder.total_in();
            if member_compressed_len == 0 {
                break;
            }
            out.push(IdxEntry {
                uncompressed_offset,
                size: buf.len() as u64,
                compressed_offset,
            });
            uncompressed_offset += buf.len() as u64;
            compressed_offset += member_compressed_len;
        }
        Ok(out)
    }

    fn locate(&self, offset: u64) -> crate::Result<&IdxEntry> {
        self.index
            .iter()
            .find(|e| e.uncompressed_offset == offset)
            .ok_or_else(|| crate::Error::NotFound(format!("no gzip member at uncompressed offset {offset}")))
    }
}

impl SegmentReader for GzReader {
    fn read(&self, offset: u64, size: u64) -> crate::Result<Vec<u8>> {
        let entry = self.locate(offset)?;
        let data = decompress_member(&self.file, entry.compressed_offset)?;
        if data.len() as u64 != size {
            return Err(crate::Error::Consistency(format!(
                "gz member at {offset}: expected {size} bytes, found {}",
                data.len()
            )));
        }
        Ok(data)
    }

    fn stream(&self, offset: u64, size: u64, out: &mut dyn Write) -> crate::Result<u64> {
        let data = self.read(offset, size)?;
        stream_bytes(&data, false, out)
    }
}

/// Append-only handle on a `gz`/`gzidx` segment.
pub struct GzWriter {
    path: PathBuf,
    file: File,
    index: Vec<IdxEntry>,
}

impl GzWriter {
    /// Opens or creates `path` for appending.
    pub fn open(path: &Path) -> crate::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        let index = read_index(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            index,
        })
    }
}

impl SegmentWriter for GzWriter {
    fn append(&mut self, data: &[u8]) -> crate::Result<AppendTransaction> {
        use std::io::{Seek, SeekFrom};
        let _lock = crate::lock::FileLock::lock_exclusive_append(&self.file)?;

        let pre_compressed_size = self.file.metadata()?.len();
        let pre_uncompressed_size = self.index.last().map_or(0, |e| e.uncompressed_offset + e.size);

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        let member = encoder.finish()?;

        self.file.seek(SeekFrom::Start(pre_compressed_size))?;
        self.file.write_all(&member)?;

        self.index.push(IdxEntry {
            uncompressed_offset: pre_uncompressed_size,
            size: data.len() as u64,
            compressed_offset: pre_compressed_size,
        });

        let path = self.path.clone();
        let index_snapshot = self.index.clone();
        let size = data.len() as u64;

        Ok(AppendTransaction {
            offset: pre_uncompressed_size,
            size,
            committed: false,
            commit_fn: {
                let file = self.file.try_clone()?;
                Box::new(move || {
                    file.sync_data()?;
                    write_index(&path, &index_snapshot)
                })
            },
            rollback_fn: {
                let path = self.path.clone();
                Box::new(move || {
                    let f = OpenOptions::new().write(true).open(&path)?;
                    f.set_len(pre_compressed_size)
                })
            },
        })
    }
}

/// Maintenance handle on a `gz`/`gzidx` segment.
pub struct GzChecker {
    path: PathBuf,
}

impl GzChecker {
    /// Builds a checker for `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SegmentChecker for GzChecker {
    fn scan_data(&self) -> crate::Result<Vec<ScannedRecord>> {
        let file = File::open(&self.path)?;
        let index = GzReader::rebuild_index(&file)?;
        let mut out = Vec::with_capacity(index.len());
        for e in &index {
            let data = decompress_member(&file, e.compressed_offset)?;
            out.push(ScannedRecord {
                offset: e.uncompressed_offset,
                size: e.size,
                data,
            });
        }
        Ok(out)
    }

    fn repack(&self, records: &[&[u8]]) -> crate::Result<(Vec<(u64, u64)>, RepackTransaction)> {
        let tmp_path = self.path.with_extension("repack-tmp");
        let mut tmp = File::create(&tmp_path)?;

        let mut offsets = Vec::with_capacity(records.len());
        let mut index = Vec::with_capacity(records.len());
        let mut uncompressed_offset = 0u64;

        for record in records {
            let compressed_offset = tmp.stream_position()?;
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(record)?;
            let member = encoder.finish()?;
            tmp.write_all(&member)?;

            offsets.push((uncompressed_offset, record.len() as u64));
            index.push(IdxEntry {
                uncompressed_offset,
                size: record.len() as u64,
                compressed_offset,
            });
            uncompressed_offset += record.len() as u64;
        }
        tmp.sync_all()?;
        drop(tmp);

        let live_path = self.path.clone();
        let commit_tmp_path = tmp_path.clone();
        let rollback_tmp_path = tmp_path.clone();

        Ok((
            offsets,
            RepackTransaction {
                committed: false,
                commit_fn: Box::new(move || {
                    std::fs::rename(&commit_tmp_path, &live_path)?;
                    write_index(&live_path, &index)
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
        let idx = idx_path(&self.path);
        if idx.exists() {
            std::fs::remove_file(idx)?;
        }
        Ok(())
    }

    fn physical_len(&self) -> crate::Result<u64> {
        let file = File::open(&self.path)?;
        let index = GzReader::rebuild_index(&file)?;
        Ok(index.last().map_or(0, |e| e.uncompressed_offset + e.size))
    }
}
