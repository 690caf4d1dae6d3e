use rusqlite::Connection;

use crate::core::error::Result;

/// DDL for the authoritative tables (spec §6): the file aggregate, its
/// content/validity satellites, extended metadata, the append-only audit
/// tables, the outbox, idempotency keys, and the write-ahead queues. Run
/// once per `Storage::open`; every statement is `IF NOT EXISTS` so repeated
/// opens of the same database file are no-ops.
pub fn create_authoritative_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id                  BLOB PRIMARY KEY,
            name                TEXT NOT NULL,
            extension           TEXT NOT NULL,
            mime                TEXT NOT NULL,
            author              TEXT NOT NULL,
            size_bytes          INTEGER NOT NULL,
            created_utc         INTEGER NOT NULL,
            modified_utc        INTEGER NOT NULL,
            is_read_only        INTEGER NOT NULL DEFAULT 0,
            fs_attr             INTEGER NOT NULL DEFAULT 0,
            fs_owner_sid        TEXT,
            fs_links            INTEGER NOT NULL DEFAULT 0,
            fs_ads              INTEGER NOT NULL DEFAULT 0,
            fts_schema_version  INTEGER NOT NULL DEFAULT 0,
            fts_is_stale        INTEGER NOT NULL DEFAULT 1,
            fts_last_indexed_utc INTEGER,
            fts_indexed_hash    TEXT,
            fts_indexed_title   TEXT,
            fts_analyzer_version INTEGER,
            fts_token_hash      TEXT
        );

        CREATE TABLE IF NOT EXISTS files_content (
            file_id     BLOB PRIMARY KEY REFERENCES files(id) ON DELETE CASCADE,
            bytes       BLOB NOT NULL,
            hash        TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS files_validity (
            file_id         BLOB PRIMARY KEY REFERENCES files(id) ON DELETE CASCADE,
            issued_at       INTEGER,
            valid_until     INTEGER,
            has_physical    INTEGER NOT NULL DEFAULT 0,
            has_electronic  INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS file_ext_metadata (
            file_id     BLOB NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            fmtid       BLOB NOT NULL,
            pid         INTEGER NOT NULL,
            kind        TEXT NOT NULL,
            value_text  TEXT,
            value_blob  BLOB,
            PRIMARY KEY (file_id, fmtid, pid)
        );

        CREATE TABLE IF NOT EXISTS audit_file (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id BLOB NOT NULL,
            op TEXT NOT NULL,
            recorded_utc INTEGER NOT NULL,
            snapshot_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_file_content (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id BLOB NOT NULL,
            op TEXT NOT NULL,
            recorded_utc INTEGER NOT NULL,
            hash TEXT
        );

        CREATE TABLE IF NOT EXISTS audit_file_validity (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id BLOB NOT NULL,
            op TEXT NOT NULL,
            recorded_utc INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_file_system (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id BLOB NOT NULL,
            op TEXT NOT NULL,
            recorded_utc INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS outbox_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_utc INTEGER NOT NULL,
            processed_utc INTEGER
        );

        CREATE TABLE IF NOT EXISTS idempotency_keys (
            key TEXT PRIMARY KEY,
            created_utc INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS fts_write_ahead (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id BLOB NOT NULL,
            op TEXT NOT NULL,
            content_hash TEXT,
            title_hash TEXT,
            enqueued_utc INTEGER NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS fts_write_ahead_dead_letter (
            seq INTEGER PRIMARY KEY,
            file_id BLOB NOT NULL,
            op TEXT NOT NULL,
            content_hash TEXT,
            title_hash TEXT,
            enqueued_utc INTEGER NOT NULL,
            dead_lettered_utc INTEGER NOT NULL,
            error TEXT NOT NULL,
            original_seq INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_files_content_hash ON files_content(hash);
        CREATE INDEX IF NOT EXISTS idx_files_modified ON files(modified_utc);
        CREATE INDEX IF NOT EXISTS idx_files_stale ON files(fts_is_stale);
        CREATE INDEX IF NOT EXISTS idx_outbox_unprocessed ON outbox_events(processed_utc) WHERE processed_utc IS NULL;
        "#,
    )?;
    Ok(())
}

/// DDL for the search projection (spec §6 "Search schema"): the FTS5
/// analytical index, the trigram fuzzy index, and the id<->rowid mapping
/// table the trigram side needs because FTS5 content tables key on an
/// implicit `rowid`, not a UUID. Only called after the FTS5 probe succeeds.
pub fn create_search_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS file_search USING fts5(
            id UNINDEXED,
            title,
            author,
            mime,
            metadata_text,
            filename,
            tokenize = 'unicode61 remove_diacritics 2'
        );

        CREATE TABLE IF NOT EXISTS file_search_map (
            file_id     BLOB PRIMARY KEY,
            numeric_id  INTEGER NOT NULL UNIQUE
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS file_trigram USING fts5(
            token,
            tokenize = 'unicode61'
        );
        "#,
    )?;
    Ok(())
}

/// Drops the search projection entirely; used by the integrity auditor's
/// tests and by a full schema-version upgrade that wants to rebuild from
/// scratch rather than migrate in place.
pub fn drop_search_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS file_search;
        DROP TABLE IF EXISTS file_trigram;
        DELETE FROM file_search_map;
        "#,
    )?;
    Ok(())
}
