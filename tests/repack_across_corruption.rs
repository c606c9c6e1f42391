// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod support;

use arkimet_core::dataset::{Config, Dataset};
use arkimet_core::matcher::MatchAll;
use support::LineScanner;
use test_log::test;

/// A record the scanner can't parse sits among good ones in a segment;
/// `repack` drops it and keeps the rest (spec.md §8 scenario 4).
#[test]
fn repack_drops_unparseable_record_and_keeps_the_rest() -> arkimet_core::Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_str("t2m", &support::grib_config("daily"))?;
    let mut dataset = Dataset::open(dir.path(), config)?;
    let scanner = LineScanner::new(arkimet_core::Format::Grib);

    let batch = format!(
        "{}{}",
        LineScanner::encode(1_700_000_000, "t2m", "aaa"),
        LineScanner::encode(1_700_003_600, "t2m", "bbb"),
    );
    dataset.writer().acquire(batch.as_bytes(), &scanner, 0)?;

    let all = dataset.reader().query_data(&MatchAll, &scanner)?;
    assert_eq!(all.len(), 2);
    let relpath = match all[0].source() {
        arkimet_core::metadata::Source::Blob { relpath, .. } => relpath.clone(),
        _ => panic!("expected a Blob source"),
    };
    let absolute = dir.path().join(&relpath);

    // Append a line that doesn't parse (missing the reftime/product fields)
    // directly onto the live segment file, bypassing `acquire`.
    {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().append(true).open(&absolute)?;
        file.write_all(b"garbage-no-semicolons\n")?;
    }

    let repacked = dataset.checker().repack(&relpath, &scanner)?;
    assert_eq!(repacked, 2);

    let after = dataset.reader().query_data(&MatchAll, &scanner)?;
    assert_eq!(after.len(), 2);

    Ok(())
}
