// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::Format;
use std::path::PathBuf;

/// Where the bytes of a message actually live (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Persisted inside a dataset segment at a known offset.
    Blob {
        /// Message format
        format: Format,
        /// Dataset root the segment lives under
        basedir: PathBuf,
        /// Segment path relative to `basedir`
        relpath: PathBuf,
        /// Byte (concat/lines/gz) or record (dir/tar/zip) offset
        offset: u64,
        /// Size in bytes
        size: u64,
    },
    /// Data follows the metadata inline in a stream (used by `INLINE` query
    /// mode and by scanners reading from a pipe).
    Inline {
        /// Message format
        format: Format,
        /// Size in bytes
        size: u64,
    },
    /// Data lives on a remote dataset, referenced by URL.
    Url {
        /// Message format
        format: Format,
        /// Remote dataset URL
        url: String,
    },
}

impl Source {
    /// Returns the format tag regardless of source kind.
    #[must_use]
    pub fn format(&self) -> Format {
        match self {
            Self::Blob { format, .. } | Self::Inline { format, .. } | Self::Url { format, .. } => *format,
        }
    }

    /// Returns the declared size in bytes, when known (always known for
    /// `Blob`/`Inline`, never for `Url`).
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        match self {
            Self::Blob { size, .. } | Self::Inline { size, .. } => Some(*size),
            Self::Url { .. } => None,
        }
    }

    /// Returns `(relpath, offset)` if this is a `Blob` source.
    #[must_use]
    pub fn blob_location(&self) -> Option<(&std::path::Path, u64)> {
        match self {
            Self::Blob { relpath, offset, .. } => Some((relpath, *offset)),
            _ => None,
        }
    }

    /// Returns the absolute path to the segment, if this is a `Blob` source.
    #[must_use]
    pub fn absolute_path(&self) -> Option<PathBuf> {
        match self {
            Self::Blob { basedir, relpath, .. } => Some(basedir.join(relpath)),
            _ => None,
        }
    }
}
