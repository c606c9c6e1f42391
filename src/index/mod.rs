// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The SQLite-backed contents index for `ondisk2`/`iseg` datasets
//! (spec.md §4.4): one row per message plus a unique-tuple dedupe table,
//! queried through prepared statements only.

mod schema;

use crate::matcher::Matcher;
use crate::metadata::{item_payload, Item, Metadata, Source};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// What to do when an inbound message's unique tuple already exists in the
/// index (spec.md §9 "replace policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplacePolicy {
    /// Reject the newcomer, keeping the already-indexed message.
    #[default]
    Never,
    /// Always replace the indexed message with the newcomer.
    Always,
    /// Replace only if the newcomer's USN is strictly higher. On an exact
    /// tie, the newcomer is rejected (first-wins; see DESIGN.md).
    HigherUsn,
}

/// Outcome of [`ContentsIndex::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The message was indexed as a new row.
    Inserted,
    /// The message replaced an existing row with the same unique tuple.
    Replaced,
    /// The message was rejected: a row with the same unique tuple already
    /// exists and the replace policy kept it.
    Duplicate,
}

/// The contents index for one dataset.
pub struct ContentsIndex {
    conn: Connection,
    unique_type_codes: Vec<u8>,
    basedir: PathBuf,
}

impl ContentsIndex {
    /// Opens (creating if needed) the index at `path`, configured with the
    /// item type codes that make up a message's unique tuple.
    pub fn open(path: &Path, basedir: PathBuf, unique_type_codes: Vec<u8>) -> crate::Result<Self> {
        let conn = Connection::open(path)?;
        schema::init(&conn)?;
        Ok(Self {
            conn,
            unique_type_codes,
            basedir,
        })
    }

    /// Opens an index backed by an in-memory database, for tests.
    pub fn open_in_memory(basedir: PathBuf, unique_type_codes: Vec<u8>) -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Self {
            conn,
            unique_type_codes,
            basedir,
        })
    }

    /// Indexes `metadata`, which must carry `Source::Blob` and a `Reftime`,
    /// applying `replace` when its unique tuple already exists.
    pub fn acquire(&mut self, metadata: &Metadata, usn: i64, replace: ReplacePolicy) -> crate::Result<AcquireOutcome> {
        let Source::Blob {
            format,
            relpath,
            offset,
            size,
            ..
        } = metadata.source()
        else {
            return Err(crate::Error::Consistency("cannot index metadata without a Blob source".into()));
        };
        let reftime = metadata
            .reftime()
            .ok_or_else(|| crate::Error::Consistency("cannot index metadata without a reftime".into()))?;
        let tuple = metadata.unique_tuple(&self.unique_type_codes);
        let data = metadata.encode();

        let tx = self.conn.transaction()?;

        let existing_uniq: Option<i64> = tx
            .query_row("SELECT id FROM mduniq WHERE tuple = ?1", params![tuple], |r| r.get(0))
            .optional()?;

        let uniq_id = if let Some(id) = existing_uniq {
            let existing_usn: i64 = tx.query_row("SELECT usn FROM md WHERE uniq_fk = ?1", params![id], |r| r.get(0))?;
            let should_replace = match replace {
                ReplacePolicy::Never => false,
                ReplacePolicy::Always => true,
                ReplacePolicy::HigherUsn => usn > existing_usn,
            };
            if !should_replace {
                tx.commit()?;
                return Ok(AcquireOutcome::Duplicate);
            }
            tx.execute("DELETE FROM md WHERE uniq_fk = ?1", params![id])?;
            id
        } else {
            tx.execute("INSERT INTO mduniq (tuple) VALUES (?1)", params![tuple])?;
            tx.last_insert_rowid()
        };

        tx.execute(
            "INSERT INTO md (format, relpath, offset, size, start_time, end_time, data, usn, uniq_fk)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                format.as_str(),
                relpath.to_string_lossy(),
                offset,
                size,
                reftime.start(),
                reftime.end(),
                data,
                usn,
                uniq_id,
            ],
        )?;
        let md_id = tx.last_insert_rowid();

        for item in metadata.items() {
            if let Item::Note(_) = item {
                continue;
            }
            tx.execute(
                "INSERT INTO mdother (md_id, type_code, payload) VALUES (?1, ?2, ?3)",
                params![md_id, item.type_code(), item_payload(item)],
            )?;
        }

        tx.commit()?;
        Ok(if existing_uniq.is_some() {
            AcquireOutcome::Replaced
        } else {
            AcquireOutcome::Inserted
        })
    }

    /// Returns every indexed metadata matching `matcher`, ordered by
    /// reftime ascending (spec.md §4.7's default query order).
    pub fn query_data(&self, matcher: &dyn Matcher) -> crate::Result<Vec<Metadata>> {
        let mut stmt = self.conn.prepare("SELECT data FROM md ORDER BY start_time, relpath, offset")?;
        let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
        let mut out = Vec::new();
        for row in rows {
            let blob = row?;
            let (mut metadata, _) = Metadata::decode(&blob)?;
            if let Source::Blob {
                format,
                relpath,
                offset,
                size,
                ..
            } = metadata.source().clone()
            {
                metadata.set_source(Source::Blob {
                    format,
                    basedir: self.basedir.clone(),
                    relpath,
                    offset,
                    size,
                });
            }
            if matcher.matches(&metadata) {
                out.push(metadata);
            }
        }
        Ok(out)
    }

    /// Removes every row belonging to `relpath`, returning the number of
    /// rows removed (spec.md §4.6 "repack"/"remove").
    pub fn remove_segment(&mut self, relpath: &Path) -> crate::Result<u64> {
        let relpath = relpath.to_string_lossy().into_owned();
        let tx = self.conn.transaction()?;
        let uniq_ids: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT uniq_fk FROM md WHERE relpath = ?1")?;
            let rows = stmt.query_map(params![relpath], |r| r.get(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let removed = tx.execute("DELETE FROM md WHERE relpath = ?1", params![relpath])? as u64;
        for id in uniq_ids {
            tx.execute(
                "DELETE FROM mduniq WHERE id = ?1 AND NOT EXISTS (SELECT 1 FROM md WHERE uniq_fk = ?1)",
                params![id],
            )?;
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Rewrites every row for `relpath` to the `(offset, size)` pairs in
    /// `new_offsets` (same order as the original `relpath`-ordered rows),
    /// used after a repack has shuffled a segment's physical layout.
    pub fn relocate_segment(&mut self, relpath: &Path, new_offsets: &[(u64, u64)]) -> crate::Result<()> {
        let relpath_s = relpath.to_string_lossy().into_owned();
        let tx = self.conn.transaction()?;
        let ids: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM md WHERE relpath = ?1 ORDER BY offset")?;
            let rows = stmt.query_map(params![relpath_s], |r| r.get(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        if ids.len() != new_offsets.len() {
            return Err(crate::Error::Consistency(format!(
                "relocate_segment: {} indexed rows but {} new offsets for {}",
                ids.len(),
                new_offsets.len(),
                relpath.display()
            )));
        }
        for (id, (offset, size)) in ids.iter().zip(new_offsets) {
            tx.execute("UPDATE md SET offset = ?1, size = ?2 WHERE id = ?3", params![offset, size, id])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Returns `(relpath, offset)` pairs the index references that no
    /// longer have a corresponding record, per `exists`, used by `check`
    /// to find `UNALIGNED`/`CORRUPTED` segments without repacking them.
    pub fn consistency_check<F>(&self, mut exists: F) -> crate::Result<Vec<(PathBuf, u64)>>
    where
        F: FnMut(&Path, u64, u64) -> bool,
    {
        let mut stmt = self.conn.prepare("SELECT relpath, offset, size FROM md ORDER BY relpath, offset")?;
        let rows = stmt.query_map([], |row| {
            let relpath: String = row.get(0)?;
            let offset: i64 = row.get(1)?;
            let size: i64 = row.get(2)?;
            Ok((PathBuf::from(relpath), offset as u64, size as u64))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (relpath, offset, size) = row?;
            if !exists(&relpath, offset, size) {
                out.push((relpath, offset));
            }
        }
        Ok(out)
    }

    /// Total number of indexed messages.
    pub fn len(&self) -> crate::Result<u64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM md", [], |r| r.get::<_, i64>(0))? as u64)
    }

    /// True if the index holds no messages.
    pub fn is_empty(&self) -> crate::Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MatchAll;
    use crate::metadata::{Format, Reftime};

    fn sample(relpath: &str, offset: u64, reftime: i64, product: &[u8]) -> Metadata {
        let mut md = Metadata::new(Source::Blob {
            format: Format::Grib,
            basedir: PathBuf::from("/data"),
            relpath: PathBuf::from(relpath),
            offset,
            size: 10,
        });
        md.set_reftime(Reftime::Position(reftime));
        md.push_item(Item::Product(product.to_vec()));
        md
    }

    #[test]
    fn acquire_dedupes_by_unique_tuple() {
        let mut index = ContentsIndex::open_in_memory(PathBuf::from("/data"), vec![Item::Product(vec![]).type_code()]).unwrap();
        let md = sample("a.grib", 0, 100, b"t2m");
        assert_eq!(index.acquire(&md, 0, ReplacePolicy::Never).unwrap(), AcquireOutcome::Inserted);
        assert_eq!(index.acquire(&md, 0, ReplacePolicy::Never).unwrap(), AcquireOutcome::Duplicate);
        assert_eq!(index.len().unwrap(), 1);
    }

    #[test]
    fn higher_usn_replaces_equal_ties_reject() {
        let mut index = ContentsIndex::open_in_memory(PathBuf::from("/data"), vec![Item::Product(vec![]).type_code()]).unwrap();
        let md = sample("a.grib", 0, 100, b"t2m");
        assert_eq!(index.acquire(&md, 5, ReplacePolicy::HigherUsn).unwrap(), AcquireOutcome::Inserted);
        assert_eq!(index.acquire(&md, 5, ReplacePolicy::HigherUsn).unwrap(), AcquireOutcome::Duplicate);
        assert_eq!(index.acquire(&md, 6, ReplacePolicy::HigherUsn).unwrap(), AcquireOutcome::Replaced);
        assert_eq!(index.len().unwrap(), 1);
    }

    #[test]
    fn query_data_filters_with_matcher() {
        let mut index = ContentsIndex::open_in_memory(PathBuf::from("/data"), vec![Item::Product(vec![]).type_code()]).unwrap();
        index.acquire(&sample("a.grib", 0, 100, b"t2m"), 0, ReplacePolicy::Never).unwrap();
        index.acquire(&sample("a.grib", 10, 200, b"tp"), 0, ReplacePolicy::Never).unwrap();
        let all = index.query_data(&MatchAll).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn remove_segment_drops_its_rows() {
        let mut index = ContentsIndex::open_in_memory(PathBuf::from("/data"), vec![Item::Product(vec![]).type_code()]).unwrap();
        index.acquire(&sample("a.grib", 0, 100, b"t2m"), 0, ReplacePolicy::Never).unwrap();
        index.acquire(&sample("b.grib", 0, 100, b"t2m"), 0, ReplacePolicy::Never).unwrap();
        let removed = index.remove_segment(Path::new("a.grib")).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(index.len().unwrap(), 1);
    }
}
