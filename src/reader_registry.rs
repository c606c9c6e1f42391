// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Weak-reference cache of open segment readers, keyed by absolute path
//! (spec.md §3 "reader registry", §4.2). A reader opened once (and its
//! shared lock with it) is reused by concurrent queries instead of
//! reopening the file and re-acquiring the lock for every read; it is
//! dropped once the last `Arc` goes away, and explicitly evicted on repack
//! so stale readers never see a post-repack file through a pre-repack
//! offset table.

use crate::segment::AnyReader;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

/// A cache of live [`AnyReader`]s, one per absolute segment path.
pub struct ReaderRegistry {
    entries: Mutex<HashMap<PathBuf, Weak<AnyReader>>>,
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a live reader for `path`, opening one with `open` if none is
    /// cached or the cached one has already been dropped.
    pub fn get_or_open<F>(&self, path: &Path, open: F) -> crate::Result<Arc<AnyReader>>
    where
        F: FnOnce() -> crate::Result<AnyReader>,
    {
        let mut entries = self.entries.lock().expect("reader registry poisoned");
        if let Some(weak) = entries.get(path) {
            if let Some(reader) = weak.upgrade() {
                return Ok(reader);
            }
        }
        let reader = Arc::new(open()?);
        entries.insert(path.to_path_buf(), Arc::downgrade(&reader));
        Ok(reader)
    }

    /// Drops the cached entry for `path`, forcing the next `get_or_open` to
    /// reopen it. Called after a successful repack, since the offsets a
    /// stale reader resolved against no longer describe the live file.
    pub fn invalidate(&self, path: &Path) {
        self.entries.lock().expect("reader registry poisoned").remove(path);
    }

    /// Drops entries whose readers have already been dropped elsewhere,
    /// keeping the map from growing unboundedly across a long-lived
    /// process. Safe to call periodically; does not affect correctness.
    pub fn compact(&self) {
        self.entries
            .lock()
            .expect("reader registry poisoned")
            .retain(|_, weak| weak.strong_count() > 0);
    }

    /// Number of live entries, including ones whose reader has since been
    /// dropped but not yet compacted. Exposed for tests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("reader registry poisoned").len()
    }

    /// True if the registry holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::MissingReader;

    #[test]
    fn reuses_live_reader() {
        let registry = ReaderRegistry::new();
        let path = PathBuf::from("/tmp/does-not-matter.grib");
        let mut opens = 0;
        let a = registry
            .get_or_open(&path, || {
                opens += 1;
                Ok(AnyReader::Missing(MissingReader::new(path.clone())))
            })
            .unwrap();
        let b = registry
            .get_or_open(&path, || {
                opens += 1;
                Ok(AnyReader::Missing(MissingReader::new(path.clone())))
            })
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(opens, 1);
    }

    #[test]
    fn invalidate_forces_reopen() {
        let registry = ReaderRegistry::new();
        let path = PathBuf::from("/tmp/does-not-matter.grib");
        let mut opens = 0;
        let _a = registry
            .get_or_open(&path, || {
                opens += 1;
                Ok(AnyReader::Missing(MissingReader::new(path.clone())))
            })
            .unwrap();
        registry.invalidate(&path);
        let _b = registry
            .get_or_open(&path, || {
                opens += 1;
                Ok(AnyReader::Missing(MissingReader::new(path.clone())))
            })
            .unwrap();
        assert_eq!(opens, 2);
    }

    #[test]
    fn compact_drops_dead_entries() {
        let registry = ReaderRegistry::new();
        let path = PathBuf::from("/tmp/does-not-matter.grib");
        {
            let _a = registry
                .get_or_open(&path, || Ok(AnyReader::Missing(MissingReader::new(path.clone()))))
                .unwrap();
            assert_eq!(registry.len(), 1);
        }
        registry.compact();
        assert!(registry.is_empty());
    }
}
