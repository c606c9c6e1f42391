// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::metadata::Format;
use std::path::PathBuf;

/// Errors that can occur while operating on a dataset, segment or index.
#[derive(Debug)]
pub enum Error {
    /// I/O error, with the path that caused it when known
    Io(std::io::Error),

    /// A segment or record referenced by the index could not be found on disk
    NotFound(String),

    /// The index rejected an insert because its unique tuple already exists
    Duplicate,

    /// The on-disk bytes of a segment are not a well-formed message of its format
    Format {
        /// Format of the offending segment
        format: Format,
        /// Path of the offending segment
        path: PathBuf,
        /// Description of the validation failure
        reason: String,
    },

    /// Index and on-disk segment disagree in a way that cannot be auto-repaired
    Consistency(String),

    /// An append or repack lock could not be acquired
    LockContention(String),

    /// Binary metadata encoding is malformed
    Decode(String),

    /// Binary metadata could not be encoded
    Encode(String),

    /// Underlying SQLite error from the contents index
    Sqlite(rusqlite::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::NotFound(s) => write!(f, "not found: {s}"),
            Self::Duplicate => write!(f, "duplicate: a record with this unique tuple already exists"),
            Self::Format { format, path, reason } => {
                write!(f, "format error: {path:?} is not a well-formed {format} message: {reason}")
            }
            Self::Consistency(s) => write!(f, "consistency error: {s}"),
            Self::LockContention(s) => write!(f, "lock contention: {s}"),
            Self::Decode(s) => write!(f, "decode error: {s}"),
            Self::Encode(s) => write!(f, "encode error: {s}"),
            Self::Sqlite(e) => write!(f, "sqlite error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;
