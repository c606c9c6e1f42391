// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use bitflags::bitflags;

bitflags! {
    /// Segment health bitmask (spec.md §3).
    ///
    /// The source material carries two vocabularies for this (`COUNTED_*`
    /// in tests, `SEGMENT_*` in the library); this crate treats them as one
    /// enumeration (see SPEC_FULL.md §9 / DESIGN.md).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct SegmentState: u16 {
        /// No flags set: data and index agree exactly.
        const OK = 0;
        /// Has gaps or out-of-order data; repackable without rescanning.
        const DIRTY = 1 << 0;
        /// Index disagrees with on-disk contents; needs a rescan.
        const UNALIGNED = 1 << 1;
        /// Indexed but absent from disk.
        const MISSING = 1 << 2;
        /// All indexed data for this segment has been removed.
        const DELETED = 1 << 3;
        /// Structural damage requiring operator intervention.
        const CORRUPTED = 1 << 4;
        /// Older than the dataset's configured archive age.
        const ARCHIVE_AGE = 1 << 5;
        /// Older than the dataset's configured delete age.
        const DELETE_AGE = 1 << 6;
    }
}

impl SegmentState {
    /// Whether this state requires operator attention rather than an
    /// automatic repair (spec.md §7, Consistency error kind).
    #[must_use]
    pub fn needs_manual_intervention(self) -> bool {
        self.contains(Self::CORRUPTED)
    }

    /// Whether `repack` can safely rewrite this segment without first
    /// rescanning it.
    #[must_use]
    pub fn is_repackable(self) -> bool {
        self.contains(Self::DIRTY) && !self.contains(Self::UNALIGNED) && !self.contains(Self::CORRUPTED)
    }
}

impl std::fmt::Display for SegmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("OK");
        }
        write!(f, "{self:?}")
    }
}
