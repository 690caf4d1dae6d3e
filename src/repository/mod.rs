use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{
    utc_ticks, ticks_to_utc, ExtendedMetadata, File, FileId, FileSystemMetadata, FileValidity,
    MetadataKey, MetadataValue, SearchIndexState,
};

/// Persistence for the authoritative `File` aggregate and its satellites
/// (content, validity, extended metadata). Every public method runs inside
/// whatever transaction the caller already holds on `conn` — this module
/// never opens or commits a transaction itself, so projection code can
/// compose an aggregate write and a projection write atomically (spec
/// §4.6 step 1).
pub struct FileRepository;

impl FileRepository {
    /// Inserts a new file aggregate. Violating the `content_hash` unique
    /// constraint surfaces as `Conflict`, not a generic failure (spec §7,
    /// property 8 / scenario S6).
    pub fn insert(conn: &rusqlite::Connection, file: &File) -> Result<()> {
        conn.execute(
            "INSERT INTO files (
                id, name, extension, mime, author, size_bytes,
                created_utc, modified_utc, is_read_only,
                fs_attr, fs_owner_sid, fs_links, fs_ads,
                fts_schema_version, fts_is_stale, fts_last_indexed_utc,
                fts_indexed_hash, fts_indexed_title, fts_analyzer_version, fts_token_hash
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)",
            params![
                file.id.0.as_bytes().to_vec(),
                file.name,
                file.extension,
                file.mime,
                file.author,
                file.size_bytes as i64,
                utc_ticks(file.created_utc),
                utc_ticks(file.modified_utc),
                file.is_read_only,
                file.fs_metadata.attributes,
                file.fs_metadata.owner_sid,
                file.fs_metadata.hard_link_count,
                file.fs_metadata.alternate_data_stream_count,
                file.search_index_state.schema_version,
                file.search_index_state.is_stale,
                file.search_index_state.last_indexed_utc.map(utc_ticks),
                file.search_index_state.indexed_content_hash,
                file.search_index_state.indexed_title,
                file.search_index_state.analyzer_version,
                file.search_index_state.token_hash,
            ],
        )
        .map_err(map_insert_error)?;

        conn.execute(
            "INSERT INTO files_content (file_id, bytes, hash) VALUES (?1, ?2, ?3)",
            params![file.id.0.as_bytes().to_vec(), Vec::<u8>::new(), file.content_hash],
        )
        .map_err(map_insert_error)?;

        conn.execute(
            "INSERT INTO files_validity (file_id, issued_at, valid_until, has_physical, has_electronic)
             VALUES (?1,?2,?3,?4,?5)",
            params![
                file.id.0.as_bytes().to_vec(),
                file.validity.issued_at.map(utc_ticks),
                file.validity.valid_until.map(utc_ticks),
                file.validity.has_physical_copy,
                file.validity.has_electronic_copy,
            ],
        )?;

        Self::replace_extended_metadata(conn, file.id, &file.extended_metadata)?;
        Ok(())
    }

    /// Full update of the mutable aggregate fields plus extended metadata.
    /// Does not touch `files_content.hash`; use `replace_content` for that
    /// (content hash changes are the trigger for a projection rewrite).
    pub fn update(conn: &rusqlite::Connection, file: &File) -> Result<()> {
        let updated = conn.execute(
            "UPDATE files SET
                name = ?2, extension = ?3, mime = ?4, author = ?5, size_bytes = ?6,
                created_utc = ?7, modified_utc = ?8, is_read_only = ?9,
                fs_attr = ?10, fs_owner_sid = ?11, fs_links = ?12, fs_ads = ?13
             WHERE id = ?1",
            params![
                file.id.0.as_bytes().to_vec(),
                file.name,
                file.extension,
                file.mime,
                file.author,
                file.size_bytes as i64,
                utc_ticks(file.created_utc),
                utc_ticks(file.modified_utc),
                file.is_read_only,
                file.fs_metadata.attributes,
                file.fs_metadata.owner_sid,
                file.fs_metadata.hard_link_count,
                file.fs_metadata.alternate_data_stream_count,
            ],
        )?;
        if updated == 0 {
            return Err(Error::not_found(format!("file {} not found", file.id)));
        }

        conn.execute(
            "UPDATE files_validity SET issued_at=?2, valid_until=?3, has_physical=?4, has_electronic=?5 WHERE file_id=?1",
            params![
                file.id.0.as_bytes().to_vec(),
                file.validity.issued_at.map(utc_ticks),
                file.validity.valid_until.map(utc_ticks),
                file.validity.has_physical_copy,
                file.validity.has_electronic_copy,
            ],
        )?;

        Self::replace_extended_metadata(conn, file.id, &file.extended_metadata)?;
        Ok(())
    }

    /// Replaces the stored content bytes and hash. A duplicate hash across
    /// a *different* `file_id` surfaces as `Conflict` (the unique
    /// constraint on `files_content.hash`).
    pub fn replace_content(conn: &rusqlite::Connection, id: FileId, bytes: &[u8], content_hash: &str) -> Result<()> {
        conn.execute(
            "UPDATE files_content SET bytes = ?2, hash = ?3 WHERE file_id = ?1",
            params![id.0.as_bytes().to_vec(), bytes, content_hash],
        )
        .map_err(map_insert_error)?;
        Ok(())
    }

    pub fn delete(conn: &rusqlite::Connection, id: FileId) -> Result<()> {
        let deleted = conn.execute("DELETE FROM files WHERE id = ?1", params![id.0.as_bytes().to_vec()])?;
        if deleted == 0 {
            return Err(Error::not_found(format!("file {} not found", id)));
        }
        Ok(())
    }

    pub fn get(conn: &rusqlite::Connection, id: FileId) -> Result<File> {
        let row = conn
            .query_row(
                "SELECT f.id, f.name, f.extension, f.mime, f.author, f.size_bytes,
                        f.created_utc, f.modified_utc, f.is_read_only,
                        f.fs_attr, f.fs_owner_sid, f.fs_links, f.fs_ads,
                        f.fts_schema_version, f.fts_is_stale, f.fts_last_indexed_utc,
                        f.fts_indexed_hash, f.fts_indexed_title, f.fts_analyzer_version, f.fts_token_hash,
                        c.hash,
                        v.issued_at, v.valid_until, v.has_physical, v.has_electronic
                 FROM files f
                 JOIN files_content c ON c.file_id = f.id
                 LEFT JOIN files_validity v ON v.file_id = f.id
                 WHERE f.id = ?1",
                params![id.0.as_bytes().to_vec()],
                row_to_file,
            )
            .optional()?;

        let mut file = row.ok_or_else(|| Error::not_found(format!("file {} not found", id)))?;
        file.extended_metadata = Self::load_extended_metadata(conn, id)?;
        Ok(file)
    }

    pub fn exists(conn: &rusqlite::Connection, id: FileId) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM files WHERE id = ?1", params![id.0.as_bytes().to_vec()], |r| r.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// All authoritative file ids, ascending — the enumeration the
    /// integrity auditor walks (spec §4.8).
    pub fn list_all_ids(conn: &rusqlite::Connection) -> Result<Vec<FileId>> {
        let mut stmt = conn.prepare("SELECT id FROM files ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| {
                let bytes: Vec<u8> = row.get(0)?;
                Ok(bytes)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().map(|b| FileId(Uuid::from_slice(&b).unwrap_or_default())).collect())
    }

    /// Updates only `search_index_state` — the write the projection makes
    /// after a successful upsert/force_replace (spec §4.6 step 3).
    pub fn update_search_index_state(conn: &rusqlite::Connection, id: FileId, state: &SearchIndexState) -> Result<()> {
        conn.execute(
            "UPDATE files SET
                fts_schema_version = ?2, fts_is_stale = ?3, fts_last_indexed_utc = ?4,
                fts_indexed_hash = ?5, fts_indexed_title = ?6, fts_analyzer_version = ?7, fts_token_hash = ?8
             WHERE id = ?1",
            params![
                id.0.as_bytes().to_vec(),
                state.schema_version,
                state.is_stale,
                state.last_indexed_utc.map(utc_ticks),
                state.indexed_content_hash,
                state.indexed_title,
                state.analyzer_version,
                state.token_hash,
            ],
        )?;
        Ok(())
    }

    pub fn mark_stale(conn: &rusqlite::Connection, id: FileId) -> Result<()> {
        conn.execute("UPDATE files SET fts_is_stale = 1 WHERE id = ?1", params![id.0.as_bytes().to_vec()])?;
        Ok(())
    }

    fn replace_extended_metadata(conn: &rusqlite::Connection, id: FileId, metadata: &ExtendedMetadata) -> Result<()> {
        conn.execute("DELETE FROM file_ext_metadata WHERE file_id = ?1", params![id.0.as_bytes().to_vec()])?;
        for (key, value) in metadata {
            let (kind, text, blob) = encode_metadata_value(value);
            conn.execute(
                "INSERT INTO file_ext_metadata (file_id, fmtid, pid, kind, value_text, value_blob)
                 VALUES (?1,?2,?3,?4,?5,?6)",
                params![id.0.as_bytes().to_vec(), key.format_id.as_bytes().to_vec(), key.property_id, kind, text, blob],
            )?;
        }
        Ok(())
    }

    fn load_extended_metadata(conn: &rusqlite::Connection, id: FileId) -> Result<ExtendedMetadata> {
        let mut stmt = conn.prepare(
            "SELECT fmtid, pid, kind, value_text, value_blob FROM file_ext_metadata WHERE file_id = ?1",
        )?;
        let mut map = HashMap::new();
        let rows = stmt.query_map(params![id.0.as_bytes().to_vec()], |row| {
            let fmtid: Vec<u8> = row.get(0)?;
            let pid: i32 = row.get(1)?;
            let kind: String = row.get(2)?;
            let text: Option<String> = row.get(3)?;
            let blob: Option<Vec<u8>> = row.get(4)?;
            Ok((fmtid, pid, kind, text, blob))
        })?;
        for row in rows {
            let (fmtid, pid, kind, text, blob) = row?;
            let key = MetadataKey {
                format_id: Uuid::from_slice(&fmtid).unwrap_or_default(),
                property_id: pid,
            };
            map.insert(key, decode_metadata_value(&kind, text, blob));
        }
        Ok(map)
    }
}

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<File> {
    let id_bytes: Vec<u8> = row.get(0)?;
    let created_ticks: i64 = row.get(6)?;
    let modified_ticks: i64 = row.get(7)?;
    let last_indexed_ticks: Option<i64> = row.get(15)?;
    let issued_at_ticks: Option<i64> = row.get(21)?;
    let valid_until_ticks: Option<i64> = row.get(22)?;

    Ok(File {
        id: FileId(Uuid::from_slice(&id_bytes).unwrap_or_default()),
        name: row.get(1)?,
        extension: row.get(2)?,
        mime: row.get(3)?,
        author: row.get(4)?,
        size_bytes: row.get::<_, i64>(5)? as u64,
        content_hash: row.get(20)?,
        created_utc: ticks_to_utc(created_ticks).unwrap_or_else(Utc::now),
        modified_utc: ticks_to_utc(modified_ticks).unwrap_or_else(Utc::now),
        is_read_only: row.get(8)?,
        validity: FileValidity {
            issued_at: issued_at_ticks.and_then(ticks_to_utc),
            valid_until: valid_until_ticks.and_then(ticks_to_utc),
            has_physical_copy: row.get(23)?,
            has_electronic_copy: row.get(24)?,
        },
        fs_metadata: FileSystemMetadata {
            attributes: row.get(9)?,
            owner_sid: row.get(10)?,
            hard_link_count: row.get(11)?,
            alternate_data_stream_count: row.get(12)?,
        },
        extended_metadata: HashMap::new(),
        search_index_state: SearchIndexState {
            schema_version: row.get(13)?,
            is_stale: row.get(14)?,
            last_indexed_utc: last_indexed_ticks.and_then(ticks_to_utc),
            indexed_content_hash: row.get(16)?,
            indexed_title: row.get(17)?,
            analyzer_version: row.get(18)?,
            token_hash: row.get(19)?,
        },
    })
}

fn encode_metadata_value(value: &MetadataValue) -> (&'static str, Option<String>, Option<Vec<u8>>) {
    match value {
        MetadataValue::Null => ("null", None, None),
        MetadataValue::String(s) => ("string", Some(s.clone()), None),
        MetadataValue::StringArray(items) => (
            "string_array",
            Some(serde_json::to_string(items).unwrap_or_default()),
            None,
        ),
        MetadataValue::U32(v) => ("u32", Some(v.to_string()), None),
        MetadataValue::I32(v) => ("i32", Some(v.to_string()), None),
        MetadataValue::F64(v) => ("f64", Some(v.to_string()), None),
        MetadataValue::Bool(v) => ("bool", Some(v.to_string()), None),
        MetadataValue::Uuid(v) => ("uuid", Some(v.to_string()), None),
        MetadataValue::FileTime(v) => ("filetime", Some(utc_ticks(*v).to_string()), None),
        MetadataValue::Binary(bytes) => ("binary", None, Some(bytes.clone())),
    }
}

fn decode_metadata_value(kind: &str, text: Option<String>, blob: Option<Vec<u8>>) -> MetadataValue {
    match kind {
        "string" => MetadataValue::String(text.unwrap_or_default()),
        "string_array" => MetadataValue::StringArray(
            text.and_then(|t| serde_json::from_str(&t).ok()).unwrap_or_default(),
        ),
        "u32" => MetadataValue::U32(text.and_then(|t| t.parse().ok()).unwrap_or_default()),
        "i32" => MetadataValue::I32(text.and_then(|t| t.parse().ok()).unwrap_or_default()),
        "f64" => MetadataValue::F64(text.and_then(|t| t.parse().ok()).unwrap_or_default()),
        "bool" => MetadataValue::Bool(text.map(|t| t == "true").unwrap_or_default()),
        "uuid" => MetadataValue::Uuid(
            text.and_then(|t| Uuid::parse_str(&t).ok()).unwrap_or_default(),
        ),
        "filetime" => MetadataValue::FileTime(
            text.and_then(|t| t.parse::<i64>().ok())
                .and_then(ticks_to_utc)
                .unwrap_or_else(Utc::now),
        ),
        "binary" => MetadataValue::Binary(blob.unwrap_or_default()),
        _ => MetadataValue::Null,
    }
}

fn map_insert_error(err: rusqlite::Error) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            Error::conflict(err.to_string())
        }
        _ => Error::from(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{FileId, FileSystemMetadata, FileValidity, SearchIndexState};
    use crate::storage::Storage;
    use chrono::Utc;

    fn sample_file(content_hash: &str) -> File {
        let now = Utc::now();
        File {
            id: FileId::new(),
            name: "Quarterly Report.docx".to_string(),
            extension: "docx".to_string(),
            mime: "application/vnd.openxmlformats".to_string(),
            author: "alice".to_string(),
            size_bytes: 2048,
            content_hash: content_hash.to_string(),
            created_utc: now,
            modified_utc: now,
            is_read_only: false,
            validity: FileValidity::default(),
            fs_metadata: FileSystemMetadata::default(),
            extended_metadata: HashMap::new(),
            search_index_state: SearchIndexState::default(),
        }
    }

    #[test]
    fn insert_and_get_round_trips() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        let file = sample_file("hash-1");
        FileRepository::insert(&conn, &file).unwrap();
        let loaded = FileRepository::get(&conn, file.id).unwrap();
        assert_eq!(loaded.name, file.name);
        assert_eq!(loaded.content_hash, file.content_hash);
    }

    #[test]
    fn duplicate_content_hash_is_conflict() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        let f1 = sample_file("dup-hash");
        FileRepository::insert(&conn, &f1).unwrap();
        let f2 = sample_file("dup-hash");
        let err = FileRepository::insert(&conn, &f2).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[test]
    fn missing_file_is_not_found() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        let err = FileRepository::get(&conn, FileId::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
