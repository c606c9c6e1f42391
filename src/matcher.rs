// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The query expression language is out of scope for this crate (spec.md
//! §1, §6.5); callers build a [`Matcher`] however they like (their own
//! parser, a fixed set of combinators, whatever) and the index/dataset
//! layers only ever call into this trait.

use crate::metadata::{Interval, Item, Metadata};

/// A compiled query predicate over [`Metadata`].
pub trait Matcher: Send + Sync {
    /// Returns `true` if `metadata` satisfies this matcher.
    fn matches(&self, metadata: &Metadata) -> bool;

    /// Narrows `interval` to the subset this matcher could possibly match,
    /// returning `false` if the matcher can provably match nothing in any
    /// interval (used to skip whole manifest entries/summary buckets before
    /// touching the index).
    fn intersect_interval(&self, interval: &mut Interval) -> bool {
        let _ = interval;
        true
    }
}

/// Matches everything; the default for an empty query.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAll;

impl Matcher for MatchAll {
    fn matches(&self, _metadata: &Metadata) -> bool {
        true
    }
}

/// Matches metadata whose reftime falls in a closed interval.
#[derive(Debug, Clone, Copy)]
pub struct ReftimeMatcher {
    interval: Interval,
}

impl ReftimeMatcher {
    /// Builds a matcher for `interval`.
    #[must_use]
    pub fn new(interval: Interval) -> Self {
        Self { interval }
    }
}

impl Matcher for ReftimeMatcher {
    fn matches(&self, metadata: &Metadata) -> bool {
        match metadata.reftime() {
            Some(rt) => self.interval.intersects(rt.start(), rt.end()),
            None => false,
        }
    }

    fn intersect_interval(&self, interval: &mut Interval) -> bool {
        interval.intersect_interval(&self.interval)
    }
}

/// Matches metadata carrying a specific item with an exact byte payload,
/// e.g. a fixed `Product` or `Origin`.
#[derive(Debug, Clone)]
pub struct ItemEqualsMatcher {
    item: Item,
}

impl ItemEqualsMatcher {
    /// Builds a matcher requiring `item` to be present verbatim.
    #[must_use]
    pub fn new(item: Item) -> Self {
        Self { item }
    }
}

impl Matcher for ItemEqualsMatcher {
    fn matches(&self, metadata: &Metadata) -> bool {
        metadata.item(self.item.type_code()) == Some(&self.item)
    }
}

/// Conjunction of matchers; matches only if every child does.
#[derive(Default)]
pub struct AndMatcher {
    children: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    /// Builds an empty conjunction (matches everything until children are added).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a child matcher, narrowing the conjunction.
    #[must_use]
    pub fn and(mut self, child: Box<dyn Matcher>) -> Self {
        self.children.push(child);
        self
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, metadata: &Metadata) -> bool {
        self.children.iter().all(|c| c.matches(metadata))
    }

    fn intersect_interval(&self, interval: &mut Interval) -> bool {
        self.children.iter().all(|c| c.intersect_interval(interval))
    }
}
