// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Maintenance operations (spec.md §4.6): `check` classifies segment
//! state without mutating anything; `repack` rewrites a segment to drop
//! gaps/overlaps and realigns the index; `archive_age`/`delete_age` act on
//! segments whose content has aged past the configured thresholds.

use super::{Dataset, IndexBackend};
use crate::index::ContentsIndex;
use crate::manifest::Manifest;
use crate::matcher::MatchAll;
use crate::metadata::Source;
use crate::scanner::Scanner;
use crate::segment::{Segment, SegmentChecker, SegmentState};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// A known segment's on-disk reachability, found by walking the filesystem
/// directly rather than trusting the index (used by `check` to tell
/// `MISSING`/`CORRUPTED` apart from a segment whose bytes are simply out of
/// step with what's indexed).
enum PhysicalState {
    /// The index/manifest references it but no file is there.
    Missing,
    /// The file is there but the backend's own `physical_len` failed.
    Corrupted,
    /// The file is there and reports this physical length.
    Ok(u64),
}

/// Appends `.suffix` to `path` without disturbing its existing extension,
/// e.g. `2024/01-01.grib` + `"metadata"` -> `2024/01-01.grib.metadata`.
fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Borrowed maintenance handle on a [`Dataset`].
pub struct DatasetChecker<'a> {
    dataset: &'a mut Dataset,
}

/// Per-segment state found by [`DatasetChecker::check`].
#[derive(Debug, Clone)]
pub struct SegmentReport {
    /// Segment relpath
    pub relpath: PathBuf,
    /// Classified state
    pub state: SegmentState,
}

impl<'a> DatasetChecker<'a> {
    pub(super) fn new(dataset: &'a mut Dataset) -> Self {
        Self { dataset }
    }

    fn segment_for(&self, relpath: &Path) -> Segment {
        let backend = self
            .dataset
            .manager
            .backend_for(self.dataset.config.format, &self.dataset.root.join(relpath))
            .unwrap_or(crate::segment::BackendTag::Concat);
        Segment::new(self.dataset.config.format, self.dataset.root.clone(), relpath.to_path_buf(), backend)
    }

    fn known_relpaths(&self) -> Vec<PathBuf> {
        match &self.dataset.backend {
            IndexBackend::Indexed(_) => self
                .dataset
                .manager
                .list_segments(&self.dataset.root, self.dataset.config.format)
                .unwrap_or_default(),
            IndexBackend::Simple(manifest) => manifest.entries().iter().map(|e| e.relpath.clone()).collect(),
        }
    }

    /// Classifies every known segment's state without mutating anything
    /// (spec.md §4.6 "check"): `MISSING` if the index/manifest references a
    /// segment no longer on disk, `CORRUPTED` if the backend's own
    /// `physical_len` fails outright, `UNALIGNED` if the index references
    /// an `(offset, size)` beyond the segment's actual physical length
    /// (spec §8 "Index ↔ disk agreement" — exactly what a truncated or
    /// otherwise-out-of-step segment looks like), `DIRTY` if the index rows
    /// for a segment have a gap or overlap between consecutive records
    /// (detectable from the index alone, no disk rescan needed), plus
    /// `ARCHIVE_AGE`/`DELETE_AGE` for segments past the configured
    /// thresholds relative to `now`.
    pub fn check(&self, now: i64) -> crate::Result<Vec<SegmentReport>> {
        let relpaths = self.known_relpaths();
        let mut physical = HashMap::with_capacity(relpaths.len());
        for relpath in &relpaths {
            let segment = self.segment_for(relpath);
            let path = segment.absolute_path();
            let state = if !path.exists() {
                PhysicalState::Missing
            } else {
                let checker = self.dataset.manager.checker(&segment);
                match checker.physical_len() {
                    Ok(len) => PhysicalState::Ok(len),
                    Err(_) => PhysicalState::Corrupted,
                }
            };
            physical.insert(relpath.clone(), state);
        }

        let (dirty, unaligned) = match &self.dataset.backend {
            IndexBackend::Indexed(index) => self.indexed_anomalies(index, &physical)?,
            IndexBackend::Simple(_) => (HashSet::new(), HashSet::new()),
        };
        let archive_age: HashSet<_> = self.segments_past_archive_age(now).into_iter().collect();
        let delete_age: HashSet<_> = self.segments_past_delete_age(now).into_iter().collect();

        let mut reports = Vec::with_capacity(relpaths.len());
        for relpath in relpaths {
            let mut state = match physical.get(&relpath) {
                Some(PhysicalState::Missing) => SegmentState::MISSING,
                Some(PhysicalState::Corrupted) => SegmentState::CORRUPTED,
                Some(PhysicalState::Ok(_)) | None => SegmentState::OK,
            };
            if dirty.contains(&relpath) {
                state |= SegmentState::DIRTY;
            }
            if unaligned.contains(&relpath) {
                state |= SegmentState::UNALIGNED;
            }
            if archive_age.contains(&relpath) {
                state |= SegmentState::ARCHIVE_AGE;
            }
            if delete_age.contains(&relpath) {
                state |= SegmentState::DELETE_AGE;
            }
            reports.push(SegmentReport { relpath, state });
        }
        Ok(reports)
    }

    /// Finds `UNALIGNED` (index offset/size beyond the segment's physical
    /// length, via [`ContentsIndex::consistency_check`]) and `DIRTY`
    /// (consecutive index rows for a segment leave a gap or overlap)
    /// relpaths. Segments already known `Missing`/`Corrupted` are skipped —
    /// those states already say enough, and `physical` has no length to
    /// compare against for them.
    fn indexed_anomalies(
        &self,
        index: &ContentsIndex,
        physical: &HashMap<PathBuf, PhysicalState>,
    ) -> crate::Result<(HashSet<PathBuf>, HashSet<PathBuf>)> {
        let mismatched = index.consistency_check(|relpath, offset, size| match physical.get(relpath) {
            Some(PhysicalState::Ok(len)) => offset + size <= *len,
            _ => true,
        })?;
        let unaligned: HashSet<PathBuf> = mismatched.into_iter().map(|(relpath, _offset)| relpath).collect();

        let mut by_relpath: HashMap<PathBuf, Vec<(u64, u64)>> = HashMap::new();
        for metadata in index.query_data(&MatchAll)? {
            if let Source::Blob { relpath, offset, size, .. } = metadata.source() {
                by_relpath.entry(relpath.clone()).or_default().push((*offset, *size));
            }
        }
        let mut dirty = HashSet::new();
        for (relpath, mut offsets) in by_relpath {
            offsets.sort_unstable_by_key(|&(offset, _)| offset);
            let mut expected = None;
            for (offset, size) in offsets {
                if expected.is_some_and(|e| e != offset) {
                    dirty.insert(relpath.clone());
                    break;
                }
                expected = Some(offset + size);
            }
        }
        Ok((dirty, unaligned))
    }

    /// Rewrites `relpath`'s segment to contain exactly the messages
    /// `scanner` finds in its scanned records, dropping any gaps or
    /// trailing partial writes, and realigns the index/manifest to the new
    /// offsets (spec.md §4.6 "repack"). A `scanner` is needed because a raw
    /// [`SegmentChecker::scan_data`] on a byte-oriented backend like
    /// `concat` cannot tell where one message ends and the next begins
    /// without format-aware framing (see that method's doc comment).
    /// Fails with [`crate::Error::LockContention`] if a live reader holds
    /// the segment open (propagated from the lock attempt inside the
    /// segment checker's own append/read paths). Refuses outright
    /// ([`SegmentState::needs_manual_intervention`]) if the backend can't
    /// even report the segment's physical length — that's structural
    /// damage `repack` isn't equipped to repair, not a gap/overlap it can
    /// rewrite around.
    pub fn repack(&mut self, relpath: &Path, scanner: &dyn Scanner) -> crate::Result<u64> {
        let segment = self.segment_for(relpath);
        let checker = self.dataset.manager.checker(&segment);
        if checker.physical_len().is_err() && SegmentState::CORRUPTED.needs_manual_intervention() {
            return Err(crate::Error::Consistency(format!(
                "{} is corrupted and needs manual intervention before it can be repacked",
                relpath.display()
            )));
        }
        let scanned = checker.scan_data()?;
        let mut messages: Vec<Vec<u8>> = Vec::new();
        for record in &scanned {
            for (range, _metadata) in scanner.scan(&record.data)? {
                messages.push(record.data[range].to_vec());
            }
        }
        let borrowed: Vec<&[u8]> = messages.iter().map(Vec::as_slice).collect();
        let (offsets, tx) = checker.repack(&borrowed)?;
        tx.commit()?;
        self.dataset.registry.invalidate(&segment.absolute_path());

        if let IndexBackend::Indexed(index) = &mut self.dataset.backend {
            index.relocate_segment(relpath, &offsets)?;
        }
        Ok(messages.len() as u64)
    }

    /// Removes every file of `relpath`'s segment and drops its index rows
    /// or manifest entry (spec.md §4.6 "remove"/"delete-age").
    pub fn remove(&mut self, relpath: &Path) -> crate::Result<()> {
        let segment = self.segment_for(relpath);
        let checker = self.dataset.manager.checker(&segment);
        checker.remove()?;
        self.dataset.registry.invalidate(&segment.absolute_path());
        match &mut self.dataset.backend {
            IndexBackend::Indexed(index) => {
                index.remove_segment(relpath)?;
            }
            IndexBackend::Simple(manifest) => {
                manifest.remove(relpath)?;
                manifest.flush()?;
            }
        }
        Ok(())
    }

    /// Returns the relpaths of segments whose `end_time` is older than
    /// `config.archive_age_days` relative to `now` (spec.md §4.6
    /// "archive-age"). Candidate listing only; [`Self::archive_aged_segments`]
    /// performs the actual move.
    pub fn segments_past_archive_age(&self, now: i64) -> Vec<PathBuf> {
        self.segments_older_than(now, self.dataset.config.archive_age_days)
    }

    /// Moves every segment past `config.archive_age_days` under
    /// `.archive/last/`, alongside `.metadata` (TLV-encoded scanned
    /// records) and `.summary` (their aggregated [`crate::summary::Summary`])
    /// side-cars, then drops it from the live manifest (spec.md §4.3, §4.6
    /// "archive-age", scenario 5). Only implemented for `Simple`-indexed
    /// datasets: an `Indexed` dataset's segments have no `end_time`
    /// aggregate driving `segments_past_archive_age` in the first place (see
    /// `segments_older_than`), so this is always a no-op for them.
    pub fn archive_aged_segments(&mut self, now: i64, scanner: &dyn Scanner) -> crate::Result<u64> {
        let relpaths = self.segments_past_archive_age(now);
        let mut archived = 0u64;
        for relpath in relpaths {
            self.archive_one_segment(&relpath, scanner)?;
            archived += 1;
        }
        Ok(archived)
    }

    fn archive_one_segment(&mut self, relpath: &Path, scanner: &dyn Scanner) -> crate::Result<()> {
        let segment = self.segment_for(relpath);
        let checker = self.dataset.manager.checker(&segment);
        let scanned = checker.scan_data()?;

        let mut records = Vec::new();
        for record in &scanned {
            for (range, mut md) in scanner.scan(&record.data)? {
                md.set_source(crate::metadata::Source::Blob {
                    format: self.dataset.config.format,
                    basedir: self.dataset.root.clone(),
                    relpath: relpath.to_path_buf(),
                    offset: record.offset + range.start as u64,
                    size: (range.end - range.start) as u64,
                });
                records.push(md);
            }
        }
        let mut summary = crate::summary::Summary::new();
        for md in &records {
            summary.add(md);
        }

        let dest = self.dataset.root.join(".archive").join("last").join(relpath);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(segment.absolute_path(), &dest)?;
        std::fs::write(sidecar_path(&dest, "metadata"), crate::metadata::encode_collection(&records))?;
        std::fs::write(sidecar_path(&dest, "summary"), summary.encode())?;

        self.dataset.registry.invalidate(&segment.absolute_path());
        match &mut self.dataset.backend {
            IndexBackend::Indexed(index) => {
                index.remove_segment(relpath)?;
            }
            IndexBackend::Simple(manifest) => {
                manifest.remove(relpath)?;
                manifest.flush()?;
            }
        }
        Ok(())
    }

    /// Returns the relpaths of segments whose `end_time` is older than
    /// `config.delete_age_days` relative to `now` (spec.md §4.6
    /// "delete-age").
    pub fn segments_past_delete_age(&self, now: i64) -> Vec<PathBuf> {
        self.segments_older_than(now, self.dataset.config.delete_age_days)
    }

    /// Removes every segment returned by [`Self::segments_past_delete_age`],
    /// returning how many were removed.
    pub fn delete_aged_segments(&mut self, now: i64) -> crate::Result<u64> {
        let relpaths = self.segments_past_delete_age(now);
        let count = relpaths.len() as u64;
        for relpath in relpaths {
            self.remove(&relpath)?;
        }
        Ok(count)
    }

    fn segments_older_than(&self, now: i64, age_days: Option<i64>) -> Vec<PathBuf> {
        let Some(age_days) = age_days else {
            return Vec::new();
        };
        let threshold = now - age_days * 86_400;
        match &self.dataset.backend {
            IndexBackend::Indexed(_) => Vec::new(),
            IndexBackend::Simple(manifest) => manifest
                .entries()
                .iter()
                .filter(|e| e.end_time < threshold)
                .map(|e| e.relpath.clone())
                .collect(),
        }
    }
}
