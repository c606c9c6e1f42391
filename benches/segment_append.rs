// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use arkimet_core::segment::concat::ConcatWriter;
use arkimet_core::segment::SegmentWriter;
use criterion::{criterion_group, criterion_main, Criterion};
use nanoid::nanoid;

fn concat_append(c: &mut Criterion) {
    c.bench_function("concat segment append", |b| {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.grib");
        let mut writer = ConcatWriter::open(&path).unwrap();

        b.iter(|| {
            let payload = format!("payload-{}", nanoid!()).into_bytes();
            let tx = writer.append(&payload).unwrap();
            tx.commit().unwrap();
        });
    });
}

criterion_group!(benches, concat_append);
criterion_main!(benches);
