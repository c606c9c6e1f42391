// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! SQLite schema for the `ondisk2`/`iseg` contents index (spec.md §4.4),
//! confirmed against `arki/dataset/ondisk2/index.h`: a `md` table holding
//! one row per message, an `mduniq` table holding the distinct unique
//! tuples (a `UNIQUE` constraint on `mduniq.tuple` is the sole duplicate
//! check — the engine relies on the constraint violation rather than a
//! separate existence query), and an `mdother` table indexing the
//! non-unique item types for secondary lookups.

use rusqlite::Connection;

pub(super) fn init(conn: &Connection) -> crate::Result<()> {
    conn.execute_batch(
        "
        PRAGMA legacy_file_format = 0;
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS mduniq (
            id    INTEGER PRIMARY KEY,
            tuple BLOB NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS md (
            id         INTEGER PRIMARY KEY,
            format     TEXT NOT NULL,
            relpath    TEXT NOT NULL,
            offset     INTEGER NOT NULL,
            size       INTEGER NOT NULL,
            start_time INTEGER NOT NULL,
            end_time   INTEGER NOT NULL,
            data       BLOB NOT NULL,
            usn        INTEGER NOT NULL DEFAULT 0,
            uniq_fk    INTEGER REFERENCES mduniq(id)
        );

        CREATE INDEX IF NOT EXISTS md_relpath ON md(relpath);
        CREATE INDEX IF NOT EXISTS md_reftime ON md(start_time, end_time);

        CREATE TABLE IF NOT EXISTS mdother (
            md_id      INTEGER NOT NULL REFERENCES md(id) ON DELETE CASCADE,
            type_code  INTEGER NOT NULL,
            payload    BLOB NOT NULL
        );

        CREATE INDEX IF NOT EXISTS mdother_lookup ON mdother(type_code, payload);
        ",
    )?;
    Ok(())
}
