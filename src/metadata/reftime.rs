// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Reference time: a single instant or a closed interval.

use std::cmp::{max, min};

/// Seconds since the Unix epoch. The core never needs calendar arithmetic
/// beyond comparison and step-bucketing, so a plain integer is enough.
pub type Timestamp = i64;

/// A reference time: either a single instant (`POSITION`) or a closed
/// interval (`PERIOD`), as required by spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reftime {
    /// A single point in time
    Position(Timestamp),
    /// A closed `[begin, end]` interval
    Period(Timestamp, Timestamp),
}

impl Reftime {
    /// Returns the inclusive lower bound.
    #[must_use]
    pub fn start(&self) -> Timestamp {
        match self {
            Self::Position(t) => *t,
            Self::Period(a, _) => *a,
        }
    }

    /// Returns the inclusive upper bound.
    #[must_use]
    pub fn end(&self) -> Timestamp {
        match self {
            Self::Position(t) => *t,
            Self::Period(_, b) => *b,
        }
    }

    /// Encodes to a fixed 17-byte form used both by the binary envelope and
    /// by the unique-tuple hash.
    #[must_use]
    pub fn encode(&self) -> [u8; 17] {
        let mut out = [0u8; 17];
        match self {
            Self::Position(t) => {
                out[0] = 0;
                out[1..9].copy_from_slice(&t.to_le_bytes());
            }
            Self::Period(a, b) => {
                out[0] = 1;
                out[1..9].copy_from_slice(&a.to_le_bytes());
                out[9..17].copy_from_slice(&b.to_le_bytes());
            }
        }
        out
    }

    /// Decodes the form produced by [`Reftime::encode`].
    pub fn decode(buf: &[u8; 17]) -> crate::Result<Self> {
        let a = Timestamp::from_le_bytes(buf[1..9].try_into().map_err(|_| crate::Error::Decode("reftime".into()))?);
        match buf[0] {
            0 => Ok(Self::Position(a)),
            1 => {
                let b = Timestamp::from_le_bytes(
                    buf[9..17].try_into().map_err(|_| crate::Error::Decode("reftime".into()))?,
                );
                Ok(Self::Period(a, b))
            }
            tag => Err(crate::Error::Decode(format!("unknown reftime tag {tag}"))),
        }
    }
}

/// A `[start, end]` time window used to bound manifest/index queries.
///
/// Invariant: `start <= end` for a non-empty interval; an interval is
/// considered empty (and query-unsatisfiable) when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    /// Inclusive lower bound, or `None` for unbounded
    pub start: Option<Timestamp>,
    /// Inclusive upper bound, or `None` for unbounded
    pub end: Option<Timestamp>,
}

impl Interval {
    /// The unbounded interval, matching everything.
    #[must_use]
    pub fn unbounded() -> Self {
        Self { start: None, end: None }
    }

    /// Builds a closed interval.
    #[must_use]
    pub fn closed(start: Timestamp, end: Timestamp) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Returns true if `[start, end]` as stored in a manifest/index entry
    /// could contain any reftime matching this window.
    #[must_use]
    pub fn intersects(&self, other_start: Timestamp, other_end: Timestamp) -> bool {
        let lo_ok = self.end.is_none_or(|e| other_start <= e);
        let hi_ok = self.start.is_none_or(|s| other_end >= s);
        lo_ok && hi_ok
    }

    /// Tightens `self` to the intersection with `other`, mirroring the
    /// consumed `Matcher::intersect_interval` contract: returns `false` when
    /// the result is empty (no solutions), in which case `self` is left in
    /// an unspecified but still-valid (non-panicking) state.
    #[must_use]
    pub fn intersect_interval(&mut self, other: &Self) -> bool {
        let start = match (self.start, other.start) {
            (Some(a), Some(b)) => Some(max(a, b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };
        let end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(min(a, b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };
        self.start = start;
        self.end = end;
        match (start, end) {
            (Some(s), Some(e)) => s <= e,
            _ => true,
        }
    }

    /// Expands `self` to cover `other` as well (used by
    /// `expand_date_range`).
    pub fn union_with(&mut self, other: &Self) {
        self.start = match (self.start, other.start) {
            (Some(a), Some(b)) => Some(min(a, b)),
            _ => None,
        };
        self.end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(max(a, b)),
            _ => None,
        };
    }
}
