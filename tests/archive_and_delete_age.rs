// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod support;

use arkimet_core::dataset::{Config, Dataset};
use support::LineScanner;
use test_log::test;

const DAY: i64 = 86_400;

/// A `simple`-indexed dataset's manifest entries age out and get swept once
/// `now` passes the configured `delete_age` threshold (spec.md §8 scenarios
/// 5 and 6).
#[test]
fn delete_age_sweeps_old_segments_but_spares_recent_ones() -> arkimet_core::Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_str("t2m", &support::simple_config("daily", 30))?;
    let mut dataset = Dataset::open(dir.path(), config)?;
    let scanner = LineScanner::new(arkimet_core::Format::Grib);

    let now = 1_700_000_000;
    let old_reftime = now - 40 * DAY;
    let recent_reftime = now - 5 * DAY;

    dataset.writer().acquire(LineScanner::encode(old_reftime, "t2m", "old").as_bytes(), &scanner, 0)?;
    dataset.writer().acquire(LineScanner::encode(recent_reftime, "t2m", "new").as_bytes(), &scanner, 0)?;

    let past_delete_age = dataset.checker().segments_past_delete_age(now);
    assert_eq!(past_delete_age.len(), 1);

    let past_archive_age = dataset.checker().segments_past_archive_age(now);
    // No `archive_age` configured for this dataset.
    assert!(past_archive_age.is_empty());

    let removed = dataset.checker().delete_aged_segments(now)?;
    assert_eq!(removed, 1);

    let still_past_delete_age = dataset.checker().segments_past_delete_age(now);
    assert!(still_past_delete_age.is_empty());

    Ok(())
}

/// An aged-out segment moves under `.archive/last/` with `.metadata` and
/// `.summary` side-cars, and drops out of the live manifest (spec.md §4.3,
/// §4.6 "archive-age", scenario 5).
#[test]
fn archive_age_moves_segment_under_archive_last_with_sidecars() -> arkimet_core::Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_str("t2m", &support::simple_config_with_archive_age("daily", 30))?;
    let mut dataset = Dataset::open(dir.path(), config)?;
    let scanner = LineScanner::new(arkimet_core::Format::Grib);

    let now = 1_700_000_000;
    let old_reftime = now - 40 * DAY;
    dataset.writer().acquire(LineScanner::encode(old_reftime, "t2m", "old").as_bytes(), &scanner, 0)?;

    let relpath = dataset.checker().segments_past_archive_age(now);
    assert_eq!(relpath.len(), 1);
    let relpath = relpath[0].clone();
    assert!(dir.path().join(&relpath).exists());

    let archived = dataset.checker().archive_aged_segments(now, &scanner)?;
    assert_eq!(archived, 1);

    assert!(!dir.path().join(&relpath).exists());
    let archived_path = dir.path().join(".archive").join("last").join(&relpath);
    assert!(archived_path.exists());
    assert!(std::path::Path::new(&format!("{}.metadata", archived_path.display())).exists());
    assert!(std::path::Path::new(&format!("{}.summary", archived_path.display())).exists());

    assert!(dataset.checker().segments_past_archive_age(now).is_empty());

    Ok(())
}
