// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod support;

use arkimet_core::dataset::{Config, Dataset};
use arkimet_core::index::AcquireOutcome;
use arkimet_core::matcher::{MatchAll, ReftimeMatcher};
use arkimet_core::metadata::Interval;
use support::LineScanner;
use test_log::test;

/// Acquiring three distinct messages indexes all three and a reftime-scoped
/// query returns exactly the ones inside the window (spec.md §8 scenario 1).
#[test]
fn acquires_three_messages_and_queries_by_reftime() -> arkimet_core::Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_str("t2m", &support::grib_config("daily"))?;
    let mut dataset = Dataset::open(dir.path(), config)?;
    let scanner = LineScanner::new(arkimet_core::Format::Grib);

    let batch = format!(
        "{}{}{}",
        LineScanner::encode(1_700_100_000, "tp", "ccc"),
        LineScanner::encode(1_700_000_000, "t2m", "aaa"),
        LineScanner::encode(1_700_003_600, "t2m", "bbb"),
    );

    let outcomes = dataset.writer().acquire(batch.as_bytes(), &scanner, 0)?;
    assert_eq!(outcomes, vec![AcquireOutcome::Inserted; 3]);

    // Acquired out of reftime order (the third line is the earliest
    // wall-clock append but sorts last); query_data's default order is by
    // reftime ascending regardless of insertion order (spec.md §4.7).
    let all = dataset.reader().query_data(&MatchAll, &scanner)?;
    assert_eq!(all.len(), 3);
    let reftimes: Vec<i64> = all.iter().map(|md| md.reftime().unwrap().start()).collect();
    assert_eq!(reftimes, vec![1_700_000_000, 1_700_003_600, 1_700_100_000]);

    let window = ReftimeMatcher::new(Interval::closed(1_699_999_000, 1_700_004_000));
    let hits = dataset.reader().query_data(&window, &scanner)?;
    assert_eq!(hits.len(), 2);

    let summary = dataset.reader().query_summary(&MatchAll, &scanner)?;
    assert_eq!(summary.total_count(), 3);
    // one bucket per distinct product (t2m, tp)
    assert_eq!(summary.bucket_count(), 2);

    Ok(())
}

/// Re-acquiring the same message is rejected under the default `Never`
/// replace policy.
#[test]
fn duplicate_unique_tuple_is_rejected_by_default() -> arkimet_core::Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_str("t2m", &support::grib_config("daily"))?;
    let mut dataset = Dataset::open(dir.path(), config)?;
    let scanner = LineScanner::new(arkimet_core::Format::Grib);

    let line = LineScanner::encode(1_700_000_000, "t2m", "aaa");
    let first = dataset.writer().acquire(line.as_bytes(), &scanner, 0)?;
    assert_eq!(first, vec![AcquireOutcome::Inserted]);

    let second = dataset.writer().acquire(line.as_bytes(), &scanner, 0)?;
    assert_eq!(second, vec![AcquireOutcome::Duplicate]);

    let all = dataset.reader().query_data(&MatchAll, &scanner)?;
    assert_eq!(all.len(), 1);

    Ok(())
}
