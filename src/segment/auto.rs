// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Backend auto-detection (spec.md §4.1 "Backend selection rules",
//! SPEC_FULL.md §11), grounded on `arki/dataset/segment/managers.cc`:
//! selection is driven purely by probing `path`, `path.gz`, `path.tar` and a
//! `.sequence` marker, codified here as one pure function over a
//! [`LayoutProbe`] so it is unit-testable without touching a real
//! filesystem.

use super::BackendTag;
use crate::metadata::Format;
use std::path::Path;

/// What [`probe`] observed about a candidate segment path, independent of
/// any format knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutProbe {
    /// `path` exists and is a regular file
    pub is_file: bool,
    /// `path` exists and is a directory
    pub is_dir: bool,
    /// `path` does not exist at all
    pub is_missing: bool,
    /// `path` has a `.sequence` marker (implies a `dir` segment in progress)
    pub has_sequence_marker: bool,
    /// `path.tar` exists
    pub has_tar_sibling: bool,
    /// `path` itself looks like a `.gz` file by content/suffix
    pub is_gz: bool,
    /// a `path.gz.idx` side-car exists
    pub has_gzidx_sibling: bool,
}

/// Probes the real filesystem for `path`, producing a [`LayoutProbe`].
#[must_use]
pub fn probe(path: &Path) -> LayoutProbe {
    let is_dir = path.is_dir();
    let is_file = !is_dir && path.is_file();
    let is_missing = !is_dir && !is_file;
    LayoutProbe {
        is_file,
        is_dir,
        is_missing,
        has_sequence_marker: path.join(".sequence").exists(),
        has_tar_sibling: path.with_extension("tar").exists() || with_suffix(path, ".tar").exists(),
        is_gz: path.extension().is_some_and(|e| e == "gz"),
        has_gzidx_sibling: with_suffix(path, ".gz.idx").exists(),
    }
}

fn with_suffix(path: &Path, suffix: &str) -> std::path::PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    std::path::PathBuf::from(s)
}

/// Pure backend-selection function (spec.md §4.1).
///
/// `grib`/`bufr` prefer `concat` (optionally `.gz`) for a regular file, or
/// `dir` when a `.sequence` marker is present. `vm2` prefers `lines`,
/// falling back to `gz`/`gzidx` when compressed. Formats that cannot share
/// a container file always use `dir`. A `.tar` sibling always wins for
/// maintenance (read-only). A missing path has no data backend.
#[must_use]
pub fn select_backend(format: Format, probe: LayoutProbe) -> Option<BackendTag> {
    if probe.has_tar_sibling {
        return Some(BackendTag::Tar);
    }

    if format.requires_directory_segment() {
        return Some(BackendTag::Dir);
    }

    if format.is_line_oriented() {
        return if probe.is_gz || probe.has_gzidx_sibling {
            Some(BackendTag::GzIdx)
        } else {
            Some(BackendTag::Lines)
        };
    }

    // grib / bufr
    if probe.is_gz {
        return Some(BackendTag::Gz);
    }
    if probe.is_dir || probe.has_sequence_marker {
        return Some(BackendTag::Dir);
    }
    if probe.is_missing {
        return None;
    }
    Some(BackendTag::Concat)
}

/// Forces every format to the `dir` backend, regardless of probe results.
/// Used by test fixtures that want per-message files for easy inspection.
#[must_use]
pub fn select_backend_force_dir(_format: Format, _probe: LayoutProbe) -> BackendTag {
    BackendTag::Dir
}
