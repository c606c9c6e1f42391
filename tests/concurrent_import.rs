// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod support;

use arkimet_core::dataset::{Config, Dataset};
use arkimet_core::matcher::MatchAll;
use std::sync::{Arc, Mutex};
use std::thread;
use support::LineScanner;
use test_log::test;

/// Several threads acquiring into the same dataset concurrently, some with
/// overlapping records, never corrupt the segment or double-count a
/// duplicate: the dataset is serialized behind a `Mutex` the way a real
/// caller would serialize writers onto one `Dataset` handle, and the
/// per-message unique tuple still rejects the would-be duplicates that race
/// past each other (spec.md §8 scenario 2).
#[test]
fn concurrent_acquires_serialize_and_dedupe_correctly() -> arkimet_core::Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_str("t2m", &support::grib_config("daily"))?;
    let dataset = Arc::new(Mutex::new(Dataset::open(dir.path(), config)?));
    let scanner = Arc::new(LineScanner::new(arkimet_core::Format::Grib));

    let base_reftime = 1_700_000_000;
    let workers = 8;
    let mut handles = Vec::new();
    for worker in 0..workers {
        let dataset = Arc::clone(&dataset);
        let scanner = Arc::clone(&scanner);
        handles.push(thread::spawn(move || {
            // Every other worker races to acquire the exact same message,
            // the rest each contribute one message unique to themselves.
            let reftime = base_reftime + (worker % 2) as i64;
            let line = LineScanner::encode(reftime, "t2m", "payload");
            let mut dataset = dataset.lock().unwrap();
            dataset.writer().acquire(line.as_bytes(), scanner.as_ref(), 0).unwrap()
        }));
    }

    let mut inserted = 0;
    let mut duplicates = 0;
    for handle in handles {
        for outcome in handle.join().unwrap() {
            match outcome {
                arkimet_core::index::AcquireOutcome::Inserted => inserted += 1,
                arkimet_core::index::AcquireOutcome::Duplicate => duplicates += 1,
                arkimet_core::index::AcquireOutcome::Replaced => panic!("no replace policy configured"),
            }
        }
    }

    // Two distinct reftimes (0 and 1 offset) means exactly 2 winners and
    // `workers - 2` duplicates racing for those same two slots.
    assert_eq!(inserted, 2);
    assert_eq!(duplicates, workers - 2);

    let dataset = dataset.lock().unwrap();
    let all = dataset.reader().query_data(&MatchAll, scanner.as_ref())?;
    assert_eq!(all.len(), 2);

    Ok(())
}
