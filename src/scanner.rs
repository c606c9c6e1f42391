// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Format-specific message scanning and validation, consumed as traits
//! (spec.md §1, §6.4): decoding GRIB/BUFR/VM2/ODIM_H5/NetCDF/JPEG bytes
//! into [`Metadata`] is out of scope for this crate. Callers supply a
//! [`Scanner`] (and optionally a [`Validator`]) implementation for each
//! format they acquire.

use crate::metadata::{Format, Metadata};

/// Splits a byte stream into individual messages and extracts their
/// [`Metadata`], without interpreting message contents beyond what is
/// needed to delimit records and fill in origin/product/level/etc.
pub trait Scanner: Send + Sync {
    /// Format this scanner handles.
    fn format(&self) -> Format;

    /// Splits `data` into consecutive messages, returning each message's
    /// byte range within `data` paired with its extracted metadata (with
    /// an `Inline` source; the caller repoints it at the segment after
    /// appending).
    fn scan(&self, data: &[u8]) -> crate::Result<Vec<(std::ops::Range<usize>, Metadata)>>;
}

/// Confirms that the bytes at a `Source::Blob` location are still a
/// well-formed message of their declared format, used by `check` to
/// distinguish `UNALIGNED` from `CORRUPTED` segments (spec.md §4.6).
pub trait Validator: Send + Sync {
    /// Format this validator handles.
    fn format(&self) -> Format;

    /// Returns `Ok(())` if `data` is a well-formed message, or
    /// `Err(Error::Format { .. })` describing why not.
    fn validate(&self, path: &std::path::Path, data: &[u8]) -> crate::Result<()>;
}

/// A [`Validator`] that accepts any non-empty byte slice, used by tests and
/// by formats that have no cheap structural check.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveValidator {
    format: Option<Format>,
}

impl PermissiveValidator {
    /// Builds a validator that reports `format` but never rejects data.
    #[must_use]
    pub fn new(format: Format) -> Self {
        Self { format: Some(format) }
    }
}

impl Validator for PermissiveValidator {
    fn format(&self) -> Format {
        self.format.unwrap_or(Format::Grib)
    }

    fn validate(&self, path: &std::path::Path, data: &[u8]) -> crate::Result<()> {
        if data.is_empty() {
            return Err(crate::Error::Format {
                format: self.format(),
                path: path.to_path_buf(),
                reason: "empty message".into(),
            });
        }
        Ok(())
    }
}
