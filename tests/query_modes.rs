// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod support;

use arkimet_core::dataset::{Config, Dataset, QueryMode};
use arkimet_core::matcher::MatchAll;
use arkimet_core::metadata::Metadata;
use support::LineScanner;
use test_log::test;

/// `QueryMode::Data` streams only the raw message bytes; `QueryMode::Inline`
/// prepends each message's binary metadata first (spec.md §4.7).
#[test]
fn inline_mode_prepends_metadata_before_each_record() -> arkimet_core::Result<()> {
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

    let mut data_only = Vec::new();
    let data_total = dataset.reader().query_bytes(&MatchAll, &scanner, QueryMode::Data, &mut data_only)?;
    assert_eq!(data_only, b"aaabbb");
    assert_eq!(data_total, data_only.len() as u64);

    let mut inlined = Vec::new();
    let inline_total = dataset.reader().query_bytes(&MatchAll, &scanner, QueryMode::Inline, &mut inlined)?;
    assert_eq!(inline_total, inlined.len() as u64);
    assert!(inlined.len() > data_only.len());

    // The inlined stream decodes back to two metadata envelopes followed by
    // their raw bytes, in the same reftime order as the data-only stream.
    let (first, consumed1) = Metadata::decode(&inlined)?;
    assert_eq!(first.reftime().unwrap().start(), 1_700_000_000);
    let after_first_data = consumed1 + 3; // "aaa"
    let (second, _) = Metadata::decode(&inlined[after_first_data..])?;
    assert_eq!(second.reftime().unwrap().start(), 1_700_003_600);

    Ok(())
}
