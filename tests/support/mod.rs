// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Shared test fixtures: a minimal line-oriented [`Scanner`] standing in for
//! a real format decoder (spec.md §1, §6.4 scope these out of the core).
//! Each line is `reftime;product;payload`; malformed lines are skipped
//! rather than erroring, so repack-after-corruption tests can exercise a
//! segment with one bad record among several good ones.

use arkimet_core::metadata::{Item, Reftime, Source};
use arkimet_core::scanner::Scanner;
use arkimet_core::{Format, Metadata};
use std::ops::Range;

pub struct LineScanner {
    pub format: Format,
}

impl LineScanner {
    pub fn new(format: Format) -> Self {
        Self { format }
    }

    pub fn encode(reftime: i64, product: &str, payload: &str) -> String {
        format!("{reftime};{product};{payload}\n")
    }
}

impl Scanner for LineScanner {
    fn format(&self) -> Format {
        self.format
    }

    fn scan(&self, data: &[u8]) -> arkimet_core::Result<Vec<(Range<usize>, Metadata)>> {
        let mut out = Vec::new();
        let mut pos = 0usize;
        for line in data.split(|&b| b == b'\n') {
            let range = pos..pos + line.len();
            pos += line.len() + 1;
            if line.is_empty() {
                continue;
            }
            let Ok(text) = std::str::from_utf8(line) else {
                continue;
            };
            let mut parts = text.splitn(3, ';');
            let (Some(reftime_s), Some(product)) = (parts.next(), parts.next()) else {
                continue;
            };
            let Ok(reftime) = reftime_s.parse::<i64>() else {
                continue;
            };

            let mut metadata = Metadata::new(Source::Inline {
                format: self.format,
                size: line.len() as u64,
            });
            metadata.set_reftime(Reftime::Position(reftime));
            metadata.push_item(Item::Product(product.as_bytes().to_vec()));
            out.push((range, metadata));
        }
        Ok(out)
    }
}

pub fn grib_config(step: &str) -> String {
    format!("format = grib\nstep = {step}\nunique = 2\nindex = ondisk2\n")
}

pub fn simple_config(step: &str, delete_age_days: i64) -> String {
    format!("format = grib\nstep = {step}\nindex = simple\ndelete_age = {delete_age_days}\n")
}

pub fn simple_config_with_archive_age(step: &str, archive_age_days: i64) -> String {
    format!("format = grib\nstep = {step}\nindex = simple\narchive_age = {archive_age_days}\n")
}
