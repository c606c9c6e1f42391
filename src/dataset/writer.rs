// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Acquire pipeline (spec.md §4.5): `Scanner(message) -> Metadata ->
//! (index dedupe) -> segment.append(data) -> index.insert(md, seg, off)`.

use super::{Dataset, IndexBackend};
use crate::index::AcquireOutcome;
use crate::manifest::{Entry, Manifest};
use crate::metadata::Source;
use crate::scanner::Scanner;
use crate::segment::{Segment, SegmentWriter};

/// Borrowed write handle on a [`Dataset`].
pub struct DatasetWriter<'a> {
    dataset: &'a mut Dataset,
}

impl<'a> DatasetWriter<'a> {
    pub(super) fn new(dataset: &'a mut Dataset) -> Self {
        Self { dataset }
    }

    /// Scans `data` with `scanner`, indexing and appending each message it
    /// finds. `usn` is the update sequence number for this batch, used by
    /// [`crate::index::ReplacePolicy::HigherUsn`].
    pub fn acquire(&mut self, data: &[u8], scanner: &dyn Scanner, usn: i64) -> crate::Result<Vec<AcquireOutcome>> {
        let messages = scanner.scan(data)?;
        let mut outcomes = Vec::with_capacity(messages.len());
        for (range, mut metadata) in messages {
            let reftime = *metadata
                .reftime()
                .ok_or_else(|| crate::Error::Consistency("scanned message has no reftime".into()))?;
            let relpath = self.dataset.config.step.segment_relpath(reftime.start(), self.dataset.config.format);
            let backend = self
                .dataset
                .manager
                .backend_for(self.dataset.config.format, &self.dataset.root.join(&relpath))
                .unwrap_or(crate::segment::BackendTag::Concat);
            let segment = Segment::new(self.dataset.config.format, self.dataset.root.clone(), relpath.clone(), backend);

            let message_bytes = &data[range];
            let mut writer = self.dataset.manager.writer(&segment)?;
            let tx = writer.append(message_bytes)?;
            let (offset, size) = (tx.offset(), tx.size());

            metadata.set_source(Source::Blob {
                format: self.dataset.config.format,
                basedir: self.dataset.root.clone(),
                relpath: relpath.clone(),
                offset,
                size,
            });

            let outcome = match &mut self.dataset.backend {
                IndexBackend::Indexed(index) => index.acquire(&metadata, usn, self.dataset.config.replace)?,
                IndexBackend::Simple(manifest) => {
                    record_in_manifest(manifest, &relpath, reftime.start(), reftime.end())?;
                    AcquireOutcome::Inserted
                }
            };

            if outcome == AcquireOutcome::Duplicate {
                drop(tx);
            } else {
                tx.commit()?;
                self.dataset.registry.invalidate(&segment.absolute_path());
            }

            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

fn record_in_manifest(manifest: &mut dyn Manifest, relpath: &std::path::Path, start: i64, end: i64) -> crate::Result<()> {
    let mtime = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let merged = match manifest.entries().iter().find(|e| e.relpath.as_path() == relpath) {
        Some(existing) => Entry {
            relpath: relpath.to_path_buf(),
            mtime,
            start_time: existing.start_time.min(start),
            end_time: existing.end_time.max(end),
        },
        None => Entry {
            relpath: relpath.to_path_buf(),
            mtime,
            start_time: start,
            end_time: end,
        },
    };
    manifest.insert(merged)?;
    manifest.flush()
}
