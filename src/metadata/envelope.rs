// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Binary metadata envelope (spec.md §6.3).
//!
//! A metadata stream is a concatenation of length-prefixed TLV records. The
//! spec additionally allows wrapping groups of records in a compressed `MG`
//! envelope; compression codecs are explicitly out of scope for the core
//! (spec.md §1), so this module only ever produces and consumes the bare
//! form. A collaborator that needs the compressed form decompresses before
//! handing bytes to [`decode_collection`].

use super::{Format, Item, Metadata, Reftime, Source};
use std::path::PathBuf;

const MAGIC: &[u8; 2] = b"MD";

const SRC_BLOB: u8 = 0;
const SRC_INLINE: u8 = 1;
const SRC_URL: u8 = 2;

fn format_to_u8(f: Format) -> u8 {
    match f {
        Format::Grib => 0,
        Format::Bufr => 1,
        Format::Vm2 => 2,
        Format::OdimH5 => 3,
        Format::NetCdf => 4,
        Format::Jpeg => 5,
    }
}

fn format_from_u8(b: u8) -> crate::Result<Format> {
    Ok(match b {
        0 => Format::Grib,
        1 => Format::Bufr,
        2 => Format::Vm2,
        3 => Format::OdimH5,
        4 => Format::NetCdf,
        5 => Format::Jpeg,
        other => return Err(crate::Error::Decode(format!("unknown format tag {other}"))),
    })
}

fn push_str(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn take_str<'a>(buf: &'a [u8], pos: &mut usize) -> crate::Result<&'a str> {
    let len = take_u32(buf, pos)? as usize;
    let bytes = buf
        .get(*pos..*pos + len)
        .ok_or_else(|| crate::Error::Decode("truncated string".into()))?;
    *pos += len;
    std::str::from_utf8(bytes).map_err(|e| crate::Error::Decode(e.to_string()))
}

fn take_u32(buf: &[u8], pos: &mut usize) -> crate::Result<u32> {
    let bytes: [u8; 4] = buf
        .get(*pos..*pos + 4)
        .ok_or_else(|| crate::Error::Decode("truncated u32".into()))?
        .try_into()
        .map_err(|_| crate::Error::Decode("truncated u32".into()))?;
    *pos += 4;
    Ok(u32::from_le_bytes(bytes))
}

fn take_u64(buf: &[u8], pos: &mut usize) -> crate::Result<u64> {
    let bytes: [u8; 8] = buf
        .get(*pos..*pos + 8)
        .ok_or_else(|| crate::Error::Decode("truncated u64".into()))?
        .try_into()
        .map_err(|_| crate::Error::Decode("truncated u64".into()))?;
    *pos += 8;
    Ok(u64::from_le_bytes(bytes))
}

fn take_u8(buf: &[u8], pos: &mut usize) -> crate::Result<u8> {
    let b = *buf.get(*pos).ok_or_else(|| crate::Error::Decode("truncated u8".into()))?;
    *pos += 1;
    Ok(b)
}

fn encode_source(buf: &mut Vec<u8>, src: &Source) {
    match src {
        Source::Blob {
            format,
            basedir,
            relpath,
            offset,
            size,
        } => {
            buf.push(SRC_BLOB);
            buf.push(format_to_u8(*format));
            push_str(buf, &basedir.to_string_lossy());
            push_str(buf, &relpath.to_string_lossy());
            buf.extend_from_slice(&offset.to_le_bytes());
            buf.extend_from_slice(&size.to_le_bytes());
        }
        Source::Inline { format, size } => {
            buf.push(SRC_INLINE);
            buf.push(format_to_u8(*format));
            buf.extend_from_slice(&size.to_le_bytes());
        }
        Source::Url { format, url } => {
            buf.push(SRC_URL);
            buf.push(format_to_u8(*format));
            push_str(buf, url);
        }
    }
}

fn decode_source(buf: &[u8], pos: &mut usize) -> crate::Result<Source> {
    let tag = take_u8(buf, pos)?;
    let format = format_from_u8(take_u8(buf, pos)?)?;
    Ok(match tag {
        SRC_BLOB => {
            let basedir = PathBuf::from(take_str(buf, pos)?);
            let relpath = PathBuf::from(take_str(buf, pos)?);
            let offset = take_u64(buf, pos)?;
            let size = take_u64(buf, pos)?;
            Source::Blob {
                format,
                basedir,
                relpath,
                offset,
                size,
            }
        }
        SRC_INLINE => {
            let size = take_u64(buf, pos)?;
            Source::Inline { format, size }
        }
        SRC_URL => {
            let url = take_str(buf, pos)?.to_owned();
            Source::Url { format, url }
        }
        other => return Err(crate::Error::Decode(format!("unknown source tag {other}"))),
    })
}

fn item_type_to_bytes(item: &Item) -> (u8, Vec<u8>) {
    match item {
        Item::Origin(b) => (1, b.clone()),
        Item::Product(b) => (2, b.clone()),
        Item::Level(b) => (3, b.clone()),
        Item::Timerange(b) => (4, b.clone()),
        Item::Area(b) => (5, b.clone()),
        Item::Proddef(b) => (6, b.clone()),
        Item::Run(b) => (7, b.clone()),
        Item::Value(b) => (8, b.clone()),
        Item::Note(s) => (9, s.as_bytes().to_vec()),
    }
}

fn item_from_bytes(code: u8, bytes: Vec<u8>) -> crate::Result<Item> {
    Ok(match code {
        1 => Item::Origin(bytes),
        2 => Item::Product(bytes),
        3 => Item::Level(bytes),
        4 => Item::Timerange(bytes),
        5 => Item::Area(bytes),
        6 => Item::Proddef(bytes),
        7 => Item::Run(bytes),
        8 => Item::Value(bytes),
        9 => Item::Note(String::from_utf8(bytes).map_err(|e| crate::Error::Decode(e.to_string()))?),
        other => return Err(crate::Error::Decode(format!("unknown item type {other}"))),
    })
}

/// Encodes one bare metadata TLV record: `"MD" | u32 body_len | body`.
pub(super) fn encode_metadata(md: &Metadata) -> Vec<u8> {
    let mut body = Vec::new();
    encode_source(&mut body, &md.source);

    match &md.reftime {
        Some(rt) => {
            body.push(1);
            body.extend_from_slice(&rt.encode());
        }
        None => body.push(0),
    }

    body.extend_from_slice(&(md.items.len() as u32).to_le_bytes());
    for item in &md.items {
        let (code, payload) = item_type_to_bytes(item);
        body.push(code);
        body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        body.extend_from_slice(&payload);
    }

    let mut out = Vec::with_capacity(body.len() + 6);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// Decodes one bare metadata TLV record, returning it and the number of
/// bytes consumed from `buf`.
pub(super) fn decode_metadata(buf: &[u8]) -> crate::Result<(Metadata, usize)> {
    if buf.len() < 6 || &buf[0..2] != MAGIC {
        return Err(crate::Error::Decode("bad metadata magic".into()));
    }
    let body_len = u32::from_le_bytes(buf[2..6].try_into().map_err(|_| crate::Error::Decode("truncated header".into()))?) as usize;
    let body = buf
        .get(6..6 + body_len)
        .ok_or_else(|| crate::Error::Decode("truncated metadata body".into()))?;

    let mut pos = 0usize;
    let source = decode_source(body, &mut pos)?;

    let mut md = Metadata::new(source);

    let has_reftime = take_u8(body, &mut pos)?;
    if has_reftime == 1 {
        let bytes: [u8; 17] = body
            .get(pos..pos + 17)
            .ok_or_else(|| crate::Error::Decode("truncated reftime".into()))?
            .try_into()
            .map_err(|_| crate::Error::Decode("truncated reftime".into()))?;
        pos += 17;
        md.set_reftime(Reftime::decode(&bytes)?);
    }

    let item_count = take_u32(body, &mut pos)?;
    for _ in 0..item_count {
        let code = take_u8(body, &mut pos)?;
        let len = take_u32(body, &mut pos)? as usize;
        let payload = body
            .get(pos..pos + len)
            .ok_or_else(|| crate::Error::Decode("truncated item payload".into()))?
            .to_vec();
        pos += len;
        md.push_item(item_from_bytes(code, payload)?);
    }

    Ok((md, 6 + body_len))
}

/// Encodes an ordered collection of metadata (a segment's `.metadata` side-car).
#[must_use]
pub fn encode_collection(mds: &[Metadata]) -> Vec<u8> {
    let mut out = Vec::new();
    for md in mds {
        out.extend_from_slice(&encode_metadata(md));
    }
    out
}

/// Decodes an ordered collection of metadata, in offset order, as written by
/// [`encode_collection`].
pub fn decode_collection(buf: &[u8]) -> crate::Result<Vec<Metadata>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        let (md, consumed) = decode_metadata(&buf[pos..])?;
        out.push(md);
        pos += consumed;
    }
    Ok(out)
}
