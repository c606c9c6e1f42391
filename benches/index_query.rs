// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use arkimet_core::index::{ContentsIndex, ReplacePolicy};
use arkimet_core::matcher::MatchAll;
use arkimet_core::metadata::{Format, Item, Metadata, Reftime, Source};
use criterion::{criterion_group, criterion_main, Criterion};
use nanoid::nanoid;
use std::path::PathBuf;

fn sample(offset: u64, reftime: i64, product: Vec<u8>) -> Metadata {
    let mut md = Metadata::new(Source::Blob {
        format: Format::Grib,
        basedir: PathBuf::from("/data"),
        relpath: PathBuf::from("bench.grib"),
        offset,
        size: 64,
    });
    md.set_reftime(Reftime::Position(reftime));
    md.push_item(Item::Product(product));
    md
}

fn index_query_data(c: &mut Criterion) {
    let mut index = ContentsIndex::open_in_memory(PathBuf::from("/data"), vec![Item::Product(vec![]).type_code()]).unwrap();
    for i in 0..10_000u64 {
        let md = sample(i * 64, 1_700_000_000 + i as i64, nanoid!().into_bytes());
        index.acquire(&md, 0, ReplacePolicy::Never).unwrap();
    }

    c.bench_function("contents index query_data (MatchAll, 10k rows)", |b| {
        b.iter(|| {
            let hits = index.query_data(&MatchAll).unwrap();
            assert_eq!(hits.len(), 10_000);
        });
    });
}

criterion_group!(benches, index_query_data);
criterion_main!(benches);
