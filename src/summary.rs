// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Summaries: metadata aggregated by everything except reftime, each
//! bucket carrying the covering interval, message count and total byte
//! size (spec.md §3, §4.3, §6.1). Merging summaries is idempotent and
//! commutative, so a dataset's summary can be built incrementally by
//! merging one per-segment (or per-month) cache.

use crate::matcher::Matcher;
use crate::metadata::{item_payload, Interval, Metadata};
use std::collections::BTreeMap;

/// The non-reftime part of a metadata, used as the aggregation key: every
/// item's `(type_code, bytes)` in insertion order. Two metadata sharing the
/// same items regardless of reftime land in the same bucket.
type GroupKey = Vec<u8>;

fn group_key(metadata: &Metadata) -> GroupKey {
    let mut buf = Vec::new();
    for item in metadata.items() {
        buf.push(item.type_code());
        let payload = item_payload(item);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);
    }
    buf
}

/// One aggregated bucket: everything the summary knows about a group of
/// metadata that share the same non-reftime attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Covering interval across every metadata in the bucket
    pub interval: Interval,
    /// Number of metadata aggregated
    pub count: u64,
    /// Total byte size across every metadata in the bucket
    pub size: u64,
}

impl Stats {
    fn merge(&mut self, other: &Self) {
        self.interval.union_with(&other.interval);
        self.count += other.count;
        self.size += other.size;
    }
}

/// An aggregated view over a set of metadata.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    buckets: BTreeMap<GroupKey, Stats>,
}

impl Summary {
    /// An empty summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one metadata into the summary.
    pub fn add(&mut self, metadata: &Metadata) {
        let key = group_key(metadata);
        let reftime = metadata.reftime();
        let size = metadata.source().size().unwrap_or(0);
        let interval = match reftime {
            Some(rt) => Interval::closed(rt.start(), rt.end()),
            None => Interval::unbounded(),
        };
        self.buckets
            .entry(key)
            .and_modify(|s| {
                s.interval.union_with(&interval);
                s.count += 1;
                s.size += size;
            })
            .or_insert(Stats { interval, count: 1, size });
    }

    /// Merges `other` into `self`. Idempotent: merging the same summary
    /// into itself twice yields the same result as merging it once,
    /// because bucket keys are stable and `Stats::merge` only widens the
    /// interval and sums already-disjoint counts (callers must not merge
    /// two summaries built from overlapping metadata sets).
    pub fn merge(&mut self, other: &Self) {
        for (key, stats) in &other.buckets {
            self.buckets
                .entry(key.clone())
                .and_modify(|s| s.merge(stats))
                .or_insert(*stats);
        }
    }

    /// Builds a summary from metadata matching `matcher`.
    pub fn from_matching<'a>(metadata: impl IntoIterator<Item = &'a Metadata>, matcher: &dyn Matcher) -> Self {
        let mut summary = Self::new();
        for md in metadata {
            if matcher.matches(md) {
                summary.add(md);
            }
        }
        summary
    }

    /// Total message count across all buckets.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.buckets.values().map(|s| s.count).sum()
    }

    /// Total byte size across all buckets.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.buckets.values().map(|s| s.size).sum()
    }

    /// Number of distinct aggregation buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// True if no metadata has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Encodes this summary to the `.summary` side-car format (spec.md
    /// §4.3, §4.6 "archive-age"): a `u32` bucket count, then per bucket the
    /// group key's length-prefixed bytes, its interval as two `i64`s
    /// (`i64::MIN`/`i64::MAX` standing in for an open side), and the
    /// `count`/`size` `u64`s. Framed the same manual length-prefixed way as
    /// [`crate::metadata::envelope`], just over the group key instead of
    /// item bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.buckets.len() as u32).to_le_bytes());
        for (key, stats) in &self.buckets {
            out.extend_from_slice(&(key.len() as u32).to_le_bytes());
            out.extend_from_slice(key);
            out.extend_from_slice(&stats.interval.start.unwrap_or(i64::MIN).to_le_bytes());
            out.extend_from_slice(&stats.interval.end.unwrap_or(i64::MAX).to_le_bytes());
            out.extend_from_slice(&stats.count.to_le_bytes());
            out.extend_from_slice(&stats.size.to_le_bytes());
        }
        out
    }

    /// Decodes the form produced by [`Summary::encode`].
    pub fn decode(buf: &[u8]) -> crate::Result<Self> {
        fn take<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> crate::Result<&'a [u8]> {
            let slice = buf
                .get(*pos..*pos + len)
                .ok_or_else(|| crate::Error::Decode("summary: buffer too short".into()))?;
            *pos += len;
            Ok(slice)
        }
        fn take_u32(buf: &[u8], pos: &mut usize) -> crate::Result<u32> {
            Ok(u32::from_le_bytes(take(buf, pos, 4)?.try_into().expect("len checked")))
        }
        fn take_i64(buf: &[u8], pos: &mut usize) -> crate::Result<i64> {
            Ok(i64::from_le_bytes(take(buf, pos, 8)?.try_into().expect("len checked")))
        }
        fn take_u64(buf: &[u8], pos: &mut usize) -> crate::Result<u64> {
            Ok(u64::from_le_bytes(take(buf, pos, 8)?.try_into().expect("len checked")))
        }

        let mut pos = 0usize;
        let bucket_count = take_u32(buf, &mut pos)? as usize;
        let mut buckets = BTreeMap::new();
        for _ in 0..bucket_count {
            let key_len = take_u32(buf, &mut pos)? as usize;
            let key = take(buf, &mut pos, key_len)?.to_vec();
            let start = take_i64(buf, &mut pos)?;
            let end = take_i64(buf, &mut pos)?;
            let count = take_u64(buf, &mut pos)?;
            let size = take_u64(buf, &mut pos)?;
            let interval = Interval {
                start: if start == i64::MIN { None } else { Some(start) },
                end: if end == i64::MAX { None } else { Some(end) },
            };
            buckets.insert(key, Stats { interval, count, size });
        }
        Ok(Self { buckets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Format, Item, Reftime, Source};
    use std::path::PathBuf;

    fn sample(reftime: i64, product: &[u8], size: u64) -> Metadata {
        let mut md = Metadata::new(Source::Blob {
            format: Format::Grib,
            basedir: PathBuf::from("/data"),
            relpath: PathBuf::from("a.grib"),
            offset: 0,
            size,
        });
        md.set_reftime(Reftime::Position(reftime));
        md.push_item(Item::Product(product.to_vec()));
        md
    }

    #[test]
    fn aggregates_same_group_across_reftimes() {
        let mut summary = Summary::new();
        summary.add(&sample(100, b"t2m", 10));
        summary.add(&sample(200, b"t2m", 20));
        assert_eq!(summary.bucket_count(), 1);
        assert_eq!(summary.total_count(), 2);
        assert_eq!(summary.total_size(), 30);
    }

    #[test]
    fn separates_distinct_groups() {
        let mut summary = Summary::new();
        summary.add(&sample(100, b"t2m", 10));
        summary.add(&sample(100, b"tp", 10));
        assert_eq!(summary.bucket_count(), 2);
    }

    #[test]
    fn encode_decode_round_trips() {
        let mut summary = Summary::new();
        summary.add(&sample(100, b"t2m", 10));
        summary.add(&sample(200, b"tp", 20));
        let decoded = Summary::decode(&summary.encode()).unwrap();
        assert_eq!(decoded.bucket_count(), summary.bucket_count());
        assert_eq!(decoded.total_count(), summary.total_count());
        assert_eq!(decoded.total_size(), summary.total_size());
    }

    #[test]
    fn merge_is_commutative_for_disjoint_summaries() {
        let mut a = Summary::new();
        a.add(&sample(100, b"t2m", 10));
        let mut b = Summary::new();
        b.add(&sample(200, b"tp", 20));

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);

        assert_eq!(ab.total_count(), ba.total_count());
        assert_eq!(ab.total_size(), ba.total_size());
        assert_eq!(ab.bucket_count(), ba.bucket_count());
    }
}
