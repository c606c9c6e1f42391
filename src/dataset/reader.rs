// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Query path (spec.md §4.7): `Matcher -> index.query -> ordered (seg,
//! offset, size) list -> segment reader -> bytes out`.

use super::{Dataset, IndexBackend};
use crate::manifest::Manifest;
use crate::matcher::Matcher;
use crate::metadata::{Metadata, Source};
use crate::scanner::Scanner;
use crate::segment::{Segment, SegmentChecker, SegmentReader};
use crate::summary::Summary;
use std::io::Write;

/// Selects what [`DatasetReader::query_bytes`] writes per matching message
/// (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Raw message bytes only.
    Data,
    /// The message's binary metadata, then its raw bytes.
    Inline,
}

/// Borrowed read handle on a [`Dataset`].
pub struct DatasetReader<'a> {
    dataset: &'a Dataset,
}

impl<'a> DatasetReader<'a> {
    pub(super) fn new(dataset: &'a Dataset) -> Self {
        Self { dataset }
    }

    /// Returns every metadata matching `matcher`. For `Simple`-indexed
    /// datasets this rescans every segment whose manifest interval
    /// overlaps the matcher's bound, using `scanner`; for indexed datasets
    /// `scanner` is unused.
    pub fn query_data(&self, matcher: &dyn Matcher, scanner: &dyn Scanner) -> crate::Result<Vec<Metadata>> {
        match &self.dataset.backend {
            IndexBackend::Indexed(index) => index.query_data(matcher),
            IndexBackend::Simple(manifest) => {
                let mut interval = crate::metadata::Interval::unbounded();
                if !matcher.intersect_interval(&mut interval) {
                    return Ok(Vec::new());
                }
                let mut out = Vec::new();
                for entry in manifest.query(&interval) {
                    let segment = self.segment_for(&entry.relpath);
                    let checker = self.dataset.manager.checker(&segment);
                    for record in checker.scan_data()? {
                        for (range, mut metadata) in scanner.scan(&record.data)? {
                            if !matcher.matches(&metadata) {
                                continue;
                            }
                            metadata.set_source(Source::Blob {
                                format: self.dataset.config.format,
                                basedir: self.dataset.root.clone(),
                                relpath: entry.relpath.clone(),
                                offset: record.offset,
                                size: (range.end - range.start) as u64,
                            });
                            out.push(metadata);
                        }
                    }
                }
                out.sort_by_key(|md| md.reftime().map(crate::metadata::Reftime::start).unwrap_or(i64::MIN));
                Ok(out)
            }
        }
    }

    /// Builds a [`Summary`] over every metadata matching `matcher`.
    pub fn query_summary(&self, matcher: &dyn Matcher, scanner: &dyn Scanner) -> crate::Result<Summary> {
        let metadata = self.query_data(matcher, scanner)?;
        Ok(Summary::from_matching(metadata.iter(), matcher))
    }

    /// Streams message bytes for every metadata matching `matcher` to
    /// `out`, by reftime ascending (spec.md §4.7's default query order),
    /// returning the total bytes written. `mode` selects between raw
    /// message bytes ([`QueryMode::Data`]) and each message's binary
    /// metadata prepended before its bytes ([`QueryMode::Inline`]) — a
    /// postprocessing mode is out of scope (spec.md §1).
    pub fn query_bytes(
        &self,
        matcher: &dyn Matcher,
        scanner: &dyn Scanner,
        mode: QueryMode,
        out: &mut dyn Write,
    ) -> crate::Result<u64> {
        let mut total = 0u64;
        for metadata in self.query_data(matcher, scanner)? {
            let Source::Blob { relpath, offset, size, .. } = metadata.source() else {
                continue;
            };
            if let QueryMode::Inline = mode {
                let encoded = metadata.encode();
                out.write_all(&encoded)?;
                total += encoded.len() as u64;
            }
            let segment = self.segment_for(relpath);
            let reader = self.dataset.registry.get_or_open(&segment.absolute_path(), || self.dataset.manager.reader(&segment))?;
            total += reader.stream(*offset, *size, out)?;
        }
        Ok(total)
    }

    fn segment_for(&self, relpath: &std::path::Path) -> Segment {
        let backend = self
            .dataset
            .manager
            .backend_for(self.dataset.config.format, &self.dataset.root.join(relpath))
            .unwrap_or(crate::segment::BackendTag::Concat);
        Segment::new(self.dataset.config.format, self.dataset.root.clone(), relpath.to_path_buf(), backend)
    }
}
