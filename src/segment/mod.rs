// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The segment layer (spec.md §4.1/§4.2): per-backend storage of raw
//! message bytes, dispatched over a tagged enum (see SPEC_FULL.md §9).

pub mod auto;
pub mod backend;
pub mod concat;
pub mod dir;
pub mod gzip;
pub mod lines;
pub mod state;
pub mod tar;
pub mod zip;

pub use backend::{AppendTransaction, RepackTransaction, ScannedRecord, SegmentChecker, SegmentReader, SegmentWriter};
pub use state::SegmentState;

use crate::metadata::Format;
use enum_dispatch::enum_dispatch;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Which on-disk representation a segment uses (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendTag {
    /// bytes appended end-to-end, no framing (GRIB/BUFR)
    Concat,
    /// newline-terminated records (VM2)
    Lines,
    /// one file per record inside a directory (ODIM_H5/NetCDF/JPEG)
    Dir,
    /// tar members, read-only maintenance
    Tar,
    /// gzip-compressed concat/lines, rebuilding the index on open
    Gz,
    /// gzip-compressed concat/lines with a persisted `.gz.idx` side-car
    GzIdx,
    /// zip members, read-only maintenance
    Zip,
}

impl std::fmt::Display for BackendTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Concat => "concat",
            Self::Lines => "lines",
            Self::Dir => "dir",
            Self::Tar => "tar",
            Self::Gz => "gz",
            Self::GzIdx => "gzidx",
            Self::Zip => "zip",
        };
        f.write_str(s)
    }
}

/// A segment: `(format, relpath, absolute_path)` plus a backend tag
/// (spec.md §3).
#[derive(Debug, Clone)]
pub struct Segment {
    format: Format,
    basedir: PathBuf,
    relpath: PathBuf,
    backend: BackendTag,
}

impl Segment {
    /// Builds a segment descriptor. Does not touch the filesystem.
    #[must_use]
    pub fn new(format: Format, basedir: PathBuf, relpath: PathBuf, backend: BackendTag) -> Self {
        Self {
            format,
            basedir,
            relpath,
            backend,
        }
    }

    /// Message format stored in this segment.
    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Path relative to the dataset root.
    #[must_use]
    pub fn relpath(&self) -> &Path {
        &self.relpath
    }

    /// Absolute path to the segment's primary data file/directory.
    #[must_use]
    pub fn absolute_path(&self) -> PathBuf {
        self.basedir.join(&self.relpath)
    }

    /// Backend kind.
    #[must_use]
    pub fn backend(&self) -> BackendTag {
        self.backend
    }
}

/// Sentinel reader for a segment whose file has vanished from disk, per
/// `arki/reader.cc`'s `MissingFileReader`: every read fails with a
/// "the file has disappeared" error rather than panicking or returning
/// empty data.
pub struct MissingReader {
    path: PathBuf,
}

impl MissingReader {
    /// Builds a sentinel for `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn err(&self, size: u64, offset: u64) -> crate::Error {
        crate::Error::NotFound(format!(
            "cannot read {size} bytes from {}:{offset}: the file has disappeared",
            self.path.display()
        ))
    }
}

impl SegmentReader for MissingReader {
    fn read(&self, offset: u64, size: u64) -> crate::Result<Vec<u8>> {
        Err(self.err(size, offset))
    }

    fn stream(&self, offset: u64, size: u64, _out: &mut dyn Write) -> crate::Result<u64> {
        Err(self.err(size, offset))
    }
}

/// Dispatches `read`/`stream` to the right backend reader.
#[enum_dispatch(SegmentReader)]
pub enum AnyReader {
    /// concat backend
    Concat(concat::ConcatReader),
    /// lines backend
    Lines(lines::LinesReader),
    /// dir backend
    Dir(dir::DirReader),
    /// tar backend
    Tar(tar::TarReader),
    /// gz/gzidx backend
    Gz(gzip::GzReader),
    /// zip backend
    Zip(zip::ZipReader),
    /// sentinel for a vanished file
    Missing(MissingReader),
}

/// Dispatches `append` to the right backend writer. Backends without live
/// append (`tar`, `zip`) have no variant here; the segment manager refuses
/// to construct a writer for them.
#[enum_dispatch(SegmentWriter)]
pub enum AnyWriter {
    /// concat backend
    Concat(concat::ConcatWriter),
    /// lines backend
    Lines(lines::LinesWriter),
    /// dir backend
    Dir(dir::DirWriter),
    /// gz/gzidx backend
    Gz(gzip::GzWriter),
}

/// Dispatches `check`/`repack`/`remove`/`scan_data` to the right backend
/// checker.
#[enum_dispatch(SegmentChecker)]
pub enum AnyChecker {
    /// concat backend
    Concat(concat::ConcatChecker),
    /// lines backend
    Lines(lines::LinesChecker),
    /// dir backend
    Dir(dir::DirChecker),
    /// tar backend
    Tar(tar::TarChecker),
    /// gz/gzidx backend
    Gz(gzip::GzChecker),
    /// zip backend
    Zip(zip::ZipChecker),
}

/// Chooses the right backend for a `(format, path)` pair and enumerates
/// segments under a root (spec.md §4.2).
pub trait SegmentManager {
    /// Picks a backend for `format` at `path`, probing the filesystem.
    fn backend_for(&self, format: Format, path: &Path) -> Option<BackendTag>;

    /// Opens a reader for `segment`.
    fn reader(&self, segment: &Segment) -> crate::Result<AnyReader> {
        let path = segment.absolute_path();
        if segment.backend() != BackendTag::Dir && !path.exists() {
            return Ok(AnyReader::Missing(MissingReader::new(path)));
        }
        Ok(match segment.backend() {
            BackendTag::Concat => AnyReader::Concat(concat::ConcatReader::open(&path)?),
            BackendTag::Lines => AnyReader::Lines(lines::LinesReader::open(&path)?),
            BackendTag::Dir => AnyReader::Dir(dir::DirReader::open(&path, segment.format())?),
            BackendTag::Tar => AnyReader::Tar(tar::TarReader::open(&path, segment.format())?),
            BackendTag::Gz | BackendTag::GzIdx => AnyReader::Gz(gzip::GzReader::open(&path)?),
            BackendTag::Zip => AnyReader::Zip(zip::ZipReader::open(&path, segment.format())?),
        })
    }

    /// Opens a writer for `segment`. Refuses to write into a `.gz`ipped or
    /// centrally-indexed (`tar`/`zip`) segment — those must be uncompressed
    /// or rewritten via `repack` first (spec.md §4.2).
    fn writer(&self, segment: &Segment) -> crate::Result<AnyWriter> {
        let path = segment.absolute_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(match segment.backend() {
            BackendTag::Concat => AnyWriter::Concat(concat::ConcatWriter::open(&path)?),
            BackendTag::Lines => AnyWriter::Lines(lines::LinesWriter::open(&path)?),
            BackendTag::Dir => AnyWriter::Dir(dir::DirWriter::open(&path, segment.format())?),
            BackendTag::Gz | BackendTag::GzIdx => AnyWriter::Gz(gzip::GzWriter::open(&path)?),
            BackendTag::Tar | BackendTag::Zip => {
                return Err(crate::Error::Consistency(format!(
                    "{} segments do not support live append; repack instead",
                    segment.backend()
                )))
            }
        })
    }

    /// Opens a maintenance handle for `segment`.
    fn checker(&self, segment: &Segment) -> AnyChecker {
        let path = segment.absolute_path();
        match segment.backend() {
            BackendTag::Concat => AnyChecker::Concat(concat::ConcatChecker::new(path)),
            BackendTag::Lines => AnyChecker::Lines(lines::LinesChecker::new(path)),
            BackendTag::Dir => AnyChecker::Dir(dir::DirChecker::new(path, segment.format())),
            BackendTag::Tar => AnyChecker::Tar(tar::TarChecker::new(path, segment.format())),
            BackendTag::Gz | BackendTag::GzIdx => AnyChecker::Gz(gzip::GzChecker::new(path)),
            BackendTag::Zip => AnyChecker::Zip(zip::ZipChecker::new(path, segment.format())),
        }
    }

    /// Enumerates segment relpaths found under `root` for `format`.
    fn list_segments(&self, root: &Path, format: Format) -> crate::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        if !root.is_dir() {
            return Ok(out);
        }
        walk(root, root, format, &mut out)?;
        out.sort();
        Ok(out)
    }
}

fn walk(root: &Path, dir: &Path, format: Format, out: &mut Vec<PathBuf>) -> crate::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            if path.join(".sequence").exists() || name.ends_with(&format!(".{format}")) {
                if let Ok(rel) = path.strip_prefix(root) {
                    out.push(rel.to_path_buf());
                }
                continue;
            }
            walk(root, &path, format, out)?;
        } else if name.ends_with(&format!(".{format}")) || name.ends_with(&format!(".{format}.gz")) {
            if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_path_buf());
            }
        }
    }
    Ok(())
}

/// Default backend-selection policy (spec.md §4.1 "AutoManager").
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoManager;

impl SegmentManager for AutoManager {
    fn backend_for(&self, format: Format, path: &Path) -> Option<BackendTag> {
        auto::select_backend(format, auto::probe(path))
    }
}

/// Forces every format to the `dir` backend, regardless of what's already
/// on disk. Used by datasets explicitly configured `segments = dir`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForceDirManager;

impl SegmentManager for ForceDirManager {
    fn backend_for(&self, _format: Format, _path: &Path) -> Option<BackendTag> {
        Some(BackendTag::Dir)
    }
}

/// Like [`ForceDirManager`], but its writer produces sparse (ftruncate-only)
/// data files, for fast fixture construction in tests.
#[cfg(any(test, feature = "test-fixtures"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct HoleDirManager;

#[cfg(any(test, feature = "test-fixtures"))]
impl SegmentManager for HoleDirManager {
    fn backend_for(&self, _format: Format, _path: &Path) -> Option<BackendTag> {
        Some(BackendTag::Dir)
    }

    fn writer(&self, segment: &Segment) -> crate::Result<AnyWriter> {
        let path = segment.absolute_path();
        std::fs::create_dir_all(&path)?;
        Ok(AnyWriter::Dir(dir::DirWriter::open(&path, segment.format())?))
    }
}
