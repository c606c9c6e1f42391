// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use arkimet_core::manifest::{Entry, Manifest, PlainManifest};
use criterion::{criterion_group, criterion_main, Criterion};
use nanoid::nanoid;
use std::path::PathBuf;

fn manifest_insert_and_flush(c: &mut Criterion) {
    c.bench_function("plain manifest insert+flush", |b| {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = PlainManifest::open(&dir.path().join("index")).unwrap();
        let mut reftime = 1_700_000_000i64;

        b.iter(|| {
            reftime += 86_400;
            manifest
                .insert(Entry {
                    relpath: PathBuf::from(format!("{}.grib", nanoid!())),
                    mtime: reftime,
                    start_time: reftime,
                    end_time: reftime + 3_600,
                })
                .unwrap();
            manifest.flush().unwrap();
        });
    });
}

criterion_group!(benches, manifest_insert_and_flush);
criterion_main!(benches);
