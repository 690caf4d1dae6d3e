pub mod write_ahead;

use rusqlite::{params, OptionalExtension};

use crate::analysis::analyzer::Analyzer;
use crate::core::error::{Error, Result};
use crate::core::types::{File, FileId};
use crate::query::emit_trigram::build_index_entry;
use crate::repository::FileRepository;
use crate::signature::{Signature, SignatureCalculator};

/// One row of the derived search projection: the text fields an analyzed
/// `File` contributes to `file_search`/`file_trigram` (spec §3, "Search
/// Projection"). Numeric fields (`created_ticks`, `modified_ticks`,
/// `size_bytes`, `content_hash`) live only on the authoritative `files`
/// row and are joined in at query time rather than duplicated here —
/// they participate in range filters and sort, never in MATCH, so
/// keeping one copy avoids a second write path that could itself drift.
struct ProjectionDocument {
    title: String,
    author: String,
    mime: String,
    metadata_text: String,
    filename: String,
}

impl ProjectionDocument {
    fn from_file(file: &File) -> Self {
        ProjectionDocument {
            title: file.name.clone(),
            author: file.author.clone(),
            mime: file.mime.clone(),
            metadata_text: file.metadata_text(),
            filename: file.name.clone(),
        }
    }
}

/// Transactional upsert/delete of the search projection, reconciled with
/// the authoritative file row inside a single unit of work (spec §4.6).
pub struct Projection;

impl Projection {
    /// Runs the upsert algorithm from spec §4.6 steps 1-3: compute the
    /// signature, compare-and-set against the row's currently indexed
    /// `(content_hash, token_hash)`, and on a match rewrite both the
    /// projection and `search_index_state`. On a CAS mismatch returns
    /// `ConcurrencyDrift` (step 4) for the caller to retry via
    /// `force_replace`; the caller (not this method) is responsible for
    /// appending a write-ahead record on a retryable failure (step 5).
    pub fn upsert(conn: &rusqlite::Connection, file: &File, analyzer: &Analyzer, schema_version: u32) -> Result<Signature> {
        let signature = SignatureCalculator::new(analyzer).compute(file);
        let current = FileRepository::get(conn, file.id)?;
        let state = &current.search_index_state;

        let is_first_index = state.indexed_content_hash.is_none() && state.token_hash.is_none();
        let cas_matches = is_first_index
            || (state.indexed_content_hash.as_deref() == Some(file.content_hash.as_str())
                && state.token_hash.as_deref() == Some(signature.token_hash.as_str()));

        if !cas_matches {
            return Err(Error::concurrency_drift(format!(
                "file {} projection expected ({:?}, {:?}) but signature computed ({}, {})",
                file.id, state.indexed_content_hash, state.token_hash, file.content_hash, signature.token_hash
            )));
        }

        Self::write(conn, file, analyzer, &signature, schema_version)?;
        Ok(signature)
    }

    /// Unconditionally rewrites the projection and `search_index_state`,
    /// bypassing the CAS. The only recovery path for `ConcurrencyDrift`
    /// (spec §4.6 step 4, scenario S7).
    pub fn force_replace(conn: &rusqlite::Connection, file: &File, analyzer: &Analyzer, schema_version: u32) -> Result<Signature> {
        let signature = SignatureCalculator::new(analyzer).compute(file);
        Self::write(conn, file, analyzer, &signature, schema_version)?;
        Ok(signature)
    }

    fn write(conn: &rusqlite::Connection, file: &File, analyzer: &Analyzer, signature: &Signature, schema_version: u32) -> Result<()> {
        let numeric_id = Self::allocate_numeric_id(conn, file.id)?;
        let doc = ProjectionDocument::from_file(file);

        conn.execute("DELETE FROM file_search WHERE rowid = ?1", params![numeric_id])?;
        conn.execute(
            "INSERT INTO file_search (rowid, id, title, author, mime, metadata_text, filename)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                numeric_id,
                file.id.0.to_string(),
                doc.title,
                doc.author,
                doc.mime,
                doc.metadata_text,
                doc.filename,
            ],
        )?;

        let trigram_text = build_trigram_document(&doc, analyzer);
        conn.execute("DELETE FROM file_trigram WHERE rowid = ?1", params![numeric_id])?;
        conn.execute(
            "INSERT INTO file_trigram (rowid, token) VALUES (?1, ?2)",
            params![numeric_id, trigram_text],
        )?;

        let mut state = file.search_index_state.clone();
        state.confirm_indexed(
            schema_version,
            chrono::Utc::now(),
            file.content_hash.clone(),
            signature.analyzer_version,
            signature.token_hash.clone(),
            signature.normalized_title.clone(),
        );
        FileRepository::update_search_index_state(conn, file.id, &state)?;

        Ok(())
    }

    /// Removes the projection row for `id`. Idempotent: deleting an id
    /// with no projection row is not an error (spec §4.6 "Delete").
    pub fn delete(conn: &rusqlite::Connection, id: FileId) -> Result<()> {
        let numeric_id: Option<i64> = conn
            .query_row(
                "SELECT numeric_id FROM file_search_map WHERE file_id = ?1",
                params![id.0.as_bytes().to_vec()],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(numeric_id) = numeric_id {
            conn.execute("DELETE FROM file_search WHERE rowid = ?1", params![numeric_id])?;
            conn.execute("DELETE FROM file_trigram WHERE rowid = ?1", params![numeric_id])?;
            conn.execute("DELETE FROM file_search_map WHERE file_id = ?1", params![id.0.as_bytes().to_vec()])?;
        }
        Ok(())
    }

    fn allocate_numeric_id(conn: &rusqlite::Connection, file_id: FileId) -> Result<i64> {
        let existing: Option<i64> = conn
            .query_row(
                "SELECT numeric_id FROM file_search_map WHERE file_id = ?1",
                params![file_id.0.as_bytes().to_vec()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO file_search_map (file_id, numeric_id)
             VALUES (?1, (SELECT COALESCE(MAX(numeric_id), 0) + 1 FROM file_search_map))",
            params![file_id.0.as_bytes().to_vec()],
        )?;
        let assigned: i64 = conn.query_row(
            "SELECT numeric_id FROM file_search_map WHERE file_id = ?1",
            params![file_id.0.as_bytes().to_vec()],
            |row| row.get(0),
        )?;
        Ok(assigned)
    }

    /// Checks whether `file`'s authoritative state matches its recorded
    /// search-index state, per `needs_reindex` (spec §4.8): compares
    /// `(schema_version, analyzer_version, content_hash, token_hash)`. The
    /// absence of `analyzer_version` on a non-stale row counts as drift
    /// (design notes §9, resolved open question).
    pub fn needs_reindex(file: &File, target_schema_version: u32, analyzer: &Analyzer) -> bool {
        let state = &file.search_index_state;
        if state.is_stale {
            return true;
        }
        if state.analyzer_version.is_none() {
            return true;
        }
        if state.schema_version != target_schema_version {
            return true;
        }
        if state.analyzer_version != Some(analyzer.version) {
            return true;
        }
        if state.indexed_content_hash.as_deref() != Some(file.content_hash.as_str()) {
            return true;
        }
        let signature = SignatureCalculator::new(analyzer).compute(file);
        state.token_hash.as_deref() != Some(signature.token_hash.as_str())
    }
}

/// Builds the trigram-index entry for a whole document: every field is run
/// through the *same* `analyzer.tokenize` the query side uses (diacritic
/// stripping, lowercasing, stopword/length filtering all included, per the
/// analyzer's configured profile), then each resulting token is decomposed
/// into overlapping trigrams and space-joined (spec §4.4's
/// `build_index_entry`, applied per analyzed token here). Indexing on a
/// different normalization path than the query would silently desync the
/// fuzzy engine from the exact one (spec §4.1).
fn build_trigram_document(doc: &ProjectionDocument, analyzer: &Analyzer) -> String {
    let text = format!("{} {} {} {}", doc.title, doc.author, doc.metadata_text, doc.filename);
    analyzer
        .tokenize(&text)
        .into_iter()
        .map(|token| build_index_entry(&token.text))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AnalyzerProfileConfig;
    use crate::core::error::ErrorKind;
    use crate::core::types::{FileId, FileSystemMetadata, FileValidity, SearchIndexState};
    use crate::repository::FileRepository;
    use crate::storage::Storage;
    use chrono::Utc;
    use std::collections::HashMap;

    fn sample_file(name: &str, content_hash: &str) -> File {
        let now = Utc::now();
        File {
            id: FileId::new(),
            name: name.to_string(),
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
    fn first_upsert_succeeds_with_no_prior_signature() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        let analyzer = Analyzer::from_profile(&AnalyzerProfileConfig::cs_default());
        let file = sample_file("Report.docx", "hash-a");
        FileRepository::insert(&conn, &file).unwrap();

        let signature = Projection::upsert(&conn, &file, &analyzer, 1).unwrap();
        let reloaded = FileRepository::get(&conn, file.id).unwrap();
        assert!(!reloaded.search_index_state.is_stale);
        assert_eq!(reloaded.search_index_state.token_hash, Some(signature.token_hash));
    }

    #[test]
    fn cas_mismatch_raises_concurrency_drift() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        let analyzer = Analyzer::from_profile(&AnalyzerProfileConfig::cs_default());
        let mut file = sample_file("Report.docx", "hash-b");
        FileRepository::insert(&conn, &file).unwrap();
        Projection::upsert(&conn, &file, &analyzer, 1).unwrap();

        // Content changes underneath without updating the indexed hash
        // recorded on the row (simulating a concurrent write we didn't see).
        conn.execute(
            "UPDATE files SET fts_indexed_hash = 'stale-hash' WHERE id = ?1",
            params![file.id.0.as_bytes().to_vec()],
        )
        .unwrap();
        file.name = "Report v2.docx".to_string();

        let err = Projection::upsert(&conn, &file, &analyzer, 1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConcurrencyDrift);

        let signature = Projection::force_replace(&conn, &file, &analyzer, 1).unwrap();
        let reloaded = FileRepository::get(&conn, file.id).unwrap();
        assert!(!reloaded.search_index_state.is_stale);
        assert_eq!(reloaded.search_index_state.token_hash, Some(signature.token_hash));
    }

    #[test]
    fn delete_projection_is_idempotent() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        Projection::delete(&conn, FileId::new()).unwrap();
        Projection::delete(&conn, FileId::new()).unwrap();
    }

    #[test]
    fn trigram_document_strips_diacritics_like_the_query_analyzer() {
        // cs_default strips diacritics; the trigram index must follow the
        // same path as analyzer.tokenize, or a diacritic-bearing title
        // never matches its unaccented fuzzy query (spec §4.1).
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        let analyzer = Analyzer::from_profile(&AnalyzerProfileConfig::cs_default());
        let file = sample_file("Kůň.docx", "hash-diacritic");
        FileRepository::insert(&conn, &file).unwrap();
        Projection::upsert(&conn, &file, &analyzer, 1).unwrap();

        let numeric_id: i64 = conn
            .query_row(
                "SELECT numeric_id FROM file_search_map WHERE file_id = ?1",
                params![file.id.0.as_bytes().to_vec()],
                |row| row.get(0),
            )
            .unwrap();
        let trigram_text: String = conn
            .query_row(
                "SELECT token FROM file_trigram WHERE rowid = ?1",
                params![numeric_id],
                |row| row.get(0),
            )
            .unwrap();

        let query_trigrams = build_trigram_document(
            &ProjectionDocument {
                title: "kun".to_string(),
                author: String::new(),
                mime: String::new(),
                metadata_text: String::new(),
                filename: String::new(),
            },
            &analyzer,
        );
        assert!(
            query_trigrams.split_whitespace().all(|g| trigram_text.contains(g)),
            "indexed trigrams {:?} do not cover unaccented query trigrams {:?}",
            trigram_text,
            query_trigrams
        );
        assert!(!trigram_text.contains('ů'));
    }
}
