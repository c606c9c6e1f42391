// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A dataset: a rooted directory holding segments plus a contents index or
//! manifest, and the lifecycle operations built on top of them (spec.md
//! §4.5–§4.7): acquire, query, check, repack, archive-age, delete-age.

mod checker;
mod reader;
mod writer;

pub use checker::DatasetChecker;
pub use reader::{DatasetReader, QueryMode};
pub use writer::DatasetWriter;

use crate::index::ContentsIndex;
use crate::manifest::{Manifest, PlainManifest};
use crate::metadata::{Format, Timestamp};
use crate::reader_registry::ReaderRegistry;
use crate::segment::{AutoManager, ForceDirManager, SegmentManager};
use chrono::{Datelike, TimeZone, Utc};
use std::path::{Path, PathBuf};

/// How a dataset partitions incoming messages into segments (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// One segment per day
    Daily,
    /// One segment per month
    Monthly,
    /// One segment per year
    Yearly,
    /// One segment for the whole dataset
    Single,
}

impl Step {
    /// Parses a step name from a config file value.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "daily" => Some(Self::Daily),
            "monthly" => Some(Self::Monthly),
            "yearly" => Some(Self::Yearly),
            "single" => Some(Self::Single),
            _ => None,
        }
    }

    /// Returns the relative path (without format extension) a message with
    /// `reftime` belongs to, mirroring arkimet's `YYYY/MM-DD`/`YYYY/MM`/
    /// `YYYY` directory conventions.
    #[must_use]
    pub fn segment_relpath(self, reftime: Timestamp, format: Format) -> PathBuf {
        let dt = Utc.timestamp_opt(reftime, 0).single().unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
        let stem = match self {
            Self::Daily => format!("{:04}/{:02}-{:02}", dt.year(), dt.month(), dt.day()),
            Self::Monthly => format!("{:04}/{:02}", dt.year(), dt.month()),
            Self::Yearly => format!("{:04}", dt.year()),
            Self::Single => "all".to_string(),
        };
        PathBuf::from(format!("{stem}.{format}"))
    }
}

/// Which storage layout backs per-message lookups (spec.md §4.4 vs §4.3).
///
/// `Ondisk2` and `Iseg` differ in the original engine only by whether the
/// contents index lives in one dataset-wide file or one file per segment;
/// that is a pure storage-layout choice with no behavior visible through
/// [`ContentsIndex`]'s API, so both are represented by the same backend
/// here (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Dataset-wide SQLite contents index
    Ondisk2,
    /// Per-segment SQLite contents index (same API, different file layout)
    Iseg,
    /// No per-message index; query scans segments via manifest time ranges
    Simple,
}

impl IndexKind {
    /// Parses an index kind from a config file value.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ondisk2" => Some(Self::Ondisk2),
            "iseg" => Some(Self::Iseg),
            "simple" => Some(Self::Simple),
            _ => None,
        }
    }
}

/// Dataset configuration (spec.md §6.1 `config` file).
#[derive(Debug, Clone)]
pub struct Config {
    /// Dataset name, used only for diagnostics
    pub name: String,
    /// Message format this dataset stores
    pub format: Format,
    /// Segmentation granularity
    pub step: Step,
    /// Item type codes making up a message's unique tuple
    pub unique_type_codes: Vec<u8>,
    /// Per-message index backend
    pub index_kind: IndexKind,
    /// Duplicate-handling policy
    pub replace: crate::index::ReplacePolicy,
    /// Segments older than this many days move to `ARCHIVE_AGE`
    pub archive_age_days: Option<i64>,
    /// Segments older than this many days move to `DELETE_AGE`
    pub delete_age_days: Option<i64>,
    /// Force all segments to the `dir` backend instead of auto-detecting
    pub force_dir: bool,
}

impl Config {
    /// Parses a `key=value`-per-line config file (spec.md §6.1).
    pub fn from_str(name: &str, text: &str) -> crate::Result<Self> {
        let mut format = None;
        let mut step = Step::Daily;
        let mut unique_type_codes = Vec::new();
        let mut index_kind = IndexKind::Ondisk2;
        let mut replace = crate::index::ReplacePolicy::Never;
        let mut archive_age_days = None;
        let mut delete_age_days = None;
        let mut force_dir = false;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "format" => format = Format::parse(value),
                "step" => step = Step::parse(value).unwrap_or(Step::Daily),
                "unique" => {
                    unique_type_codes = value
                        .split(',')
                        .filter_map(|s| s.trim().parse::<u8>().ok())
                        .collect();
                }
                "index" => index_kind = IndexKind::parse(value).unwrap_or(IndexKind::Ondisk2),
                "replace" => {
                    replace = match value {
                        "yes" | "always" => crate::index::ReplacePolicy::Always,
                        "usn" => crate::index::ReplacePolicy::HigherUsn,
                        _ => crate::index::ReplacePolicy::Never,
                    }
                }
                "archive age" | "archive_age" => archive_age_days = value.parse().ok(),
                "delete age" | "delete_age" => delete_age_days = value.parse().ok(),
                "segments" => force_dir = value == "dir",
                _ => {}
            }
        }

        let format = format.ok_or_else(|| crate::Error::Consistency("config is missing 'format'".into()))?;
        Ok(Self {
            name: name.to_string(),
            format,
            step,
            unique_type_codes,
            index_kind,
            replace,
            archive_age_days,
            delete_age_days,
            force_dir,
        })
    }

    /// Reads and parses a config file from `path`.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let name = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_str(&name, &text)
    }
}

enum IndexBackend {
    Indexed(ContentsIndex),
    Simple(PlainManifest),
}

/// An open dataset: segments plus whichever index backend its
/// configuration selects.
pub struct Dataset {
    root: PathBuf,
    config: Config,
    manager: Box<dyn SegmentManager + Send + Sync>,
    backend: IndexBackend,
    registry: ReaderRegistry,
}

impl Dataset {
    /// Opens (creating on-disk structures as needed) the dataset rooted at
    /// `root` with `config`.
    pub fn open(root: &Path, config: Config) -> crate::Result<Self> {
        std::fs::create_dir_all(root)?;
        let manager: Box<dyn SegmentManager + Send + Sync> = if config.force_dir {
            Box::new(ForceDirManager)
        } else {
            Box::new(AutoManager)
        };
        let backend = match config.index_kind {
            IndexKind::Ondisk2 | IndexKind::Iseg => {
                let path = root.join("index.sqlite");
                IndexBackend::Indexed(ContentsIndex::open(&path, root.to_path_buf(), config.unique_type_codes.clone())?)
            }
            IndexKind::Simple => IndexBackend::Simple(crate::manifest::sqlite::migrate_if_present(root)?),
        };
        Ok(Self {
            root: root.to_path_buf(),
            config,
            manager,
            backend,
            registry: ReaderRegistry::new(),
        })
    }

    /// Dataset root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Dataset configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Borrows a writer for this dataset.
    pub fn writer(&mut self) -> DatasetWriter<'_> {
        DatasetWriter::new(self)
    }

    /// Borrows a reader for this dataset.
    #[must_use]
    pub fn reader(&self) -> DatasetReader<'_> {
        DatasetReader::new(self)
    }

    /// Borrows a checker for this dataset.
    pub fn checker(&mut self) -> DatasetChecker<'_> {
        DatasetChecker::new(self)
    }
}
