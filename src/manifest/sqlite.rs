// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Legacy `index.sqlite` manifest migration (spec.md §6.2, SPEC_FULL.md
//! §11), confirmed against `arki/dataset/index/manifest.cc`: a dataset
//! created by an older arkimet kept its manifest in SQLite; on first open
//! with a plain-text manifest configured, the engine reads the SQLite
//! table once, folds it into the in-memory [`PlainManifest`], flushes that
//! to `MANIFEST`, and deletes `index.sqlite` so the migration never runs
//! twice.

use super::{Entry, Manifest, PlainManifest};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// Migrates `dir/index.sqlite` into `dir/MANIFEST`, if the legacy file is
/// present. Returns the resulting manifest either way (fresh or migrated).
pub fn migrate_if_present(dir: &Path) -> crate::Result<PlainManifest> {
    let legacy_path = dir.join("index.sqlite");
    let manifest_path = dir.join("MANIFEST");
    if !legacy_path.exists() {
        return PlainManifest::open(&manifest_path);
    }

    let entries = read_legacy(&legacy_path)?;
    let mut manifest = PlainManifest::open(&manifest_path)?;
    for entry in entries {
        manifest.insert(entry)?;
    }
    manifest.flush()?;
    std::fs::remove_file(&legacy_path)?;
    log::info!("migrated legacy manifest {} into {}", legacy_path.display(), manifest_path.display());
    Ok(manifest)
}

fn read_legacy(path: &Path) -> crate::Result<Vec<Entry>> {
    let conn = Connection::open(path)?;
    let mut stmt = conn.prepare("SELECT file, mtime, start_time, end_time FROM files")?;
    let rows = stmt.query_map([], |row| {
        let file: String = row.get(0)?;
        let mtime: i64 = row.get(1)?;
        let start: i64 = row.get(2)?;
        let end: i64 = row.get(3)?;
        Ok(Entry {
            relpath: PathBuf::from(file),
            mtime,
            start_time: start,
            end_time: end,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(crate::Error::from)
}
