// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Metadata: the typed record carried alongside every stored message.

mod envelope;
mod reftime;
mod source;

pub use envelope::{decode_collection, encode_collection};
pub use reftime::{Interval, Reftime, Timestamp};
pub use source::Source;

use std::fmt;

/// A message format supported by the archive engine.
///
/// The core never interprets message bodies; it only needs the tag to pick
/// a segment backend and to label errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Format {
    /// WMO GRIB edition 1/2
    Grib,
    /// WMO BUFR
    Bufr,
    /// ARPA-SIMC single-value time series (VM2)
    Vm2,
    /// ODIM_H5 / generic HDF5
    OdimH5,
    /// NetCDF
    NetCdf,
    /// JPEG imagery
    Jpeg,
}

impl Format {
    /// Returns the canonical lowercase name used in filenames and config files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grib => "grib",
            Self::Bufr => "bufr",
            Self::Vm2 => "vm2",
            Self::OdimH5 => "odimh5",
            Self::NetCdf => "netcdf",
            Self::Jpeg => "jpeg",
        }
    }

    /// Parses a format from a canonical name or a file extension, normalizing
    /// through compression/archive suffixes the way `format_from_filename`
    /// does in the scanner interface.
    pub fn parse(name: &str) -> Option<Self> {
        let base = name
            .trim_end_matches(".gz")
            .trim_end_matches(".tar")
            .trim_end_matches(".zip");

        match base {
            "grib" | "grib1" | "grib2" => Some(Self::Grib),
            "bufr" => Some(Self::Bufr),
            "vm2" => Some(Self::Vm2),
            "odimh5" | "odim" | "h5" => Some(Self::OdimH5),
            "netcdf" | "nc" => Some(Self::NetCdf),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// Whether this format's segments must use a one-file-per-message
    /// backend because the format cannot frame multiple messages in one file.
    #[must_use]
    pub fn requires_directory_segment(self) -> bool {
        matches!(self, Self::OdimH5 | Self::NetCdf | Self::Jpeg)
    }

    /// Whether successive records in a segment are newline-terminated text
    /// lines rather than framed binary messages.
    #[must_use]
    pub fn is_line_oriented(self) -> bool {
        matches!(self, Self::Vm2)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed attribute attached to a [`Metadata`] record.
///
/// The concrete scanner-produced types (origin, product, level, ...) are
/// out of scope for the core (see spec.md §1); it only needs to carry them
/// opaquely, dedupe identical tuples, and serialize them back out.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Item {
    /// Named attribute with a stable type code and its encoded bytes
    Origin(Vec<u8>),
    Product(Vec<u8>),
    Level(Vec<u8>),
    Timerange(Vec<u8>),
    Area(Vec<u8>),
    Proddef(Vec<u8>),
    Run(Vec<u8>),
    Value(Vec<u8>),
    Note(String),
}

impl Item {
    /// Stable type code used both in the binary envelope and as SQL column
    /// selectors for the contents index's secondary indexes.
    #[must_use]
    pub fn type_code(&self) -> u8 {
        match self {
            Self::Origin(_) => 1,
            Self::Product(_) => 2,
            Self::Level(_) => 3,
            Self::Timerange(_) => 4,
            Self::Area(_) => 5,
            Self::Proddef(_) => 6,
            Self::Run(_) => 7,
            Self::Value(_) => 8,
            Self::Note(_) => 9,
        }
    }
}

/// A typed record describing one stored or inbound message.
///
/// Invariants (spec.md §3): every indexed metadata carries a [`Reftime`];
/// every *stored* metadata carries `Source::Blob`; a metadata round-trips
/// through [`Metadata::encode`]/[`Metadata::decode`].
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    source: Source,
    reftime: Option<Reftime>,
    items: Vec<Item>,
}

impl Metadata {
    /// Creates a metadata record with the given source and no items yet.
    #[must_use]
    pub fn new(source: Source) -> Self {
        Self {
            source,
            reftime: None,
            items: Vec::new(),
        }
    }

    /// Returns the data source.
    #[must_use]
    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Overwrites the data source; used by the writer/checker to repoint a
    /// metadata at its new `(segment, offset, size)` after append or repack.
    pub fn set_source(&mut self, source: Source) {
        self.source = source;
    }

    /// Returns the reference time, if set.
    #[must_use]
    pub fn reftime(&self) -> Option<&Reftime> {
        self.reftime.as_ref()
    }

    /// Sets the reference time.
    pub fn set_reftime(&mut self, reftime: Reftime) {
        self.reftime = Some(reftime);
    }

    /// Appends an item, preserving insertion order.
    pub fn push_item(&mut self, item: Item) {
        self.items.push(item);
    }

    /// Returns all items.
    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Returns the first item of a given type code, if any.
    #[must_use]
    pub fn item(&self, type_code: u8) -> Option<&Item> {
        self.items.iter().find(|i| i.type_code() == type_code)
    }

    /// Computes the canonical encoding of the "unique tuple" configured for
    /// a dataset: the concatenation of the encoded bytes of each named item
    /// type plus the reftime, in a fixed order. Two metadata with the same
    /// unique tuple are considered duplicates by the contents index.
    #[must_use]
    pub fn unique_tuple(&self, type_codes: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        for &code in type_codes {
            if let Some(item) = self.item(code) {
                buf.push(code);
                let bytes = item_payload(item);
                buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                buf.extend_from_slice(&bytes);
            }
        }
        if let Some(reftime) = &self.reftime {
            buf.extend_from_slice(b"\0RT");
            buf.extend_from_slice(&reftime.encode());
        }
        buf
    }

    /// Encodes this metadata to its length-prefixed TLV binary form
    /// (spec.md §6.3, bare form — not wrapped in an `MG` envelope).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        envelope::encode_metadata(self)
    }

    /// Decodes a single bare metadata record from `buf`, returning the
    /// record and the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> crate::Result<(Self, usize)> {
        envelope::decode_metadata(buf)
    }
}

pub(crate) fn item_payload(item: &Item) -> Vec<u8> {
    match item {
        Item::Origin(b)
        | Item::Product(b)
        | Item::Level(b)
        | Item::Timerange(b)
        | Item::Area(b)
        | Item::Proddef(b)
        | Item::Run(b)
        | Item::Value(b) => b.clone(),
        Item::Note(s) => s.as_bytes().to_vec(),
    }
}
