// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The plain-text `MANIFEST` file (spec.md §6.2), confirmed against
//! `arki/dataset/index/manifest.cc` and `arki/dataset/simple/manifest.cc`:
//! one `;`-separated line per segment, `relpath;mtime;start;end` with
//! `start`/`end` formatted `YYYY-MM-DD HH:MM:SS` in UTC.

use super::{Entry, Manifest};
use crate::fs::{FileSystem, StdFileSystem};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn format_timestamp(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).expect("epoch is representable"))
        .format(DATETIME_FMT)
        .to_string()
}

fn parse_timestamp(s: &str) -> crate::Result<i64> {
    NaiveDateTime::parse_from_str(s, DATETIME_FMT)
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|e| crate::Error::Decode(format!("manifest timestamp {s:?}: {e}")))
}

/// Plain-text manifest for the `simple` dataset kind. Kept sorted by
/// `relpath` and rewritten in full on [`flush`](Manifest::flush), matching
/// the teacher's append-oriented structures that still checkpoint the
/// whole on-disk table rather than diffing it.
pub struct PlainManifest {
    path: PathBuf,
    entries: Vec<Entry>,
    dirty: bool,
}

impl PlainManifest {
    /// Opens (or prepares to create) the `MANIFEST` file at `path`.
    pub fn open(path: &Path) -> crate::Result<Self> {
        let entries = if StdFileSystem::exists(path)? {
            let text = StdFileSystem::read_to_string(path)?;
            parse(&text)?
        } else {
            Vec::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
            dirty: false,
        })
    }
}

fn parse(text: &str) -> crate::Result<Vec<Entry>> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(4, ';');
        let relpath = parts
            .next()
            .ok_or_else(|| crate::Error::Decode("manifest line missing relpath".into()))?;
        let mtime = parts
            .next()
            .ok_or_else(|| crate::Error::Decode("manifest line missing mtime".into()))?
            .parse::<i64>()
            .map_err(|e| crate::Error::Decode(format!("manifest mtime: {e}")))?;
        let start = parts
            .next()
            .ok_or_else(|| crate::Error::Decode("manifest line missing start".into()))?;
        let end = parts
            .next()
            .ok_or_else(|| crate::Error::Decode("manifest line missing end".into()))?;
        out.push(Entry {
            relpath: PathBuf::from(relpath),
            mtime,
            start_time: parse_timestamp(start)?,
            end_time: parse_timestamp(end)?,
        });
    }
    out.sort_by(|a, b| a.relpath.cmp(&b.relpath));
    Ok(out)
}

fn render(entries: &[Entry]) -> String {
    let mut out = String::new();
    for e in entries {
        out.push_str(&format!(
            "{};{};{};{}\n",
            e.relpath.display(),
            e.mtime,
            format_timestamp(e.start_time),
            format_timestamp(e.end_time)
        ));
    }
    out
}

impl Manifest for PlainManifest {
    fn insert(&mut self, entry: Entry) -> crate::Result<()> {
        match self.entries.binary_search_by(|e| e.relpath.cmp(&entry.relpath)) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
        self.dirty = true;
        Ok(())
    }

    fn remove(&mut self, relpath: &Path) -> crate::Result<()> {
        if let Ok(i) = self.entries.binary_search_by(|e| e.relpath.as_path().cmp(relpath)) {
            self.entries.remove(i);
            self.dirty = true;
        }
        Ok(())
    }

    fn query(&self, interval: &crate::metadata::Interval) -> Vec<&Entry> {
        self.entries
            .iter()
            .filter(|e| interval.intersects(e.start_time, e.end_time))
            .collect()
    }

    fn entries(&self) -> &[Entry] {
        &self.entries
    }

    fn flush(&mut self) -> crate::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, render(&self.entries))?;
        std::fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Interval;

    #[test]
    fn round_trips_through_text() {
        let entries = vec![
            Entry {
                relpath: PathBuf::from("2024/01.grib"),
                mtime: 12345,
                start_time: 1_700_000_000,
                end_time: 1_700_003_600,
            },
            Entry {
                relpath: PathBuf::from("2024/02.grib"),
                mtime: 12346,
                start_time: 1_700_003_601,
                end_time: 1_700_007_200,
            },
        ];
        let text = render(&entries);
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn query_filters_by_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("MANIFEST");
        let mut manifest = PlainManifest::open(&path).unwrap();
        manifest
            .insert(Entry {
                relpath: PathBuf::from("a.grib"),
                mtime: 1,
                start_time: 0,
                end_time: 100,
            })
            .unwrap();
        manifest
            .insert(Entry {
                relpath: PathBuf::from("b.grib"),
                mtime: 2,
                start_time: 200,
                end_time: 300,
            })
            .unwrap();
        let found = manifest.query(&Interval::closed(50, 150));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].relpath, PathBuf::from("a.grib"));
    }

    #[test]
    fn flush_persists_and_reopen_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("MANIFEST");
        let mut manifest = PlainManifest::open(&path).unwrap();
        manifest
            .insert(Entry {
                relpath: PathBuf::from("a.grib"),
                mtime: 1,
                start_time: 0,
                end_time: 100,
            })
            .unwrap();
        manifest.flush().unwrap();

        let reopened = PlainManifest::open(&path).unwrap();
        assert_eq!(reopened.entries().len(), 1);
    }
}
