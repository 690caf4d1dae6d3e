use rusqlite::{params, OptionalExtension};

use crate::analysis::analyzer::Analyzer;
use crate::core::config::WriteAheadConfig;
use crate::core::error::Result;
use crate::core::stats::Telemetry;
use crate::core::types::{utc_ticks, FileId};
use crate::projection::Projection;
use crate::repository::FileRepository;
use crate::storage::pool::Lease;

/// The write-ahead operation recorded when a projection write can't be
/// retried inline (spec §4.6 step 5): `upsert` replays as a CAS-checked
/// upsert, `delete` as a projection delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAheadOp {
    Upsert,
    Delete,
}

impl WriteAheadOp {
    fn as_str(self) -> &'static str {
        match self {
            WriteAheadOp::Upsert => "upsert",
            WriteAheadOp::Delete => "delete",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "delete" => WriteAheadOp::Delete,
            _ => WriteAheadOp::Upsert,
        }
    }
}

struct WriteAheadRecord {
    seq: i64,
    file_id: FileId,
    op: WriteAheadOp,
    attempts: u32,
}

/// Appends a record to `fts_write_ahead` for later replay. Called by the
/// projection's caller (not `Projection` itself) when an upsert/delete
/// couldn't be completed inline within the aggregate's own transaction.
pub fn enqueue(conn: &Lease, file_id: FileId, op: WriteAheadOp) -> Result<i64> {
    conn.execute(
        "INSERT INTO fts_write_ahead (file_id, op, enqueued_utc, attempts) VALUES (?1, ?2, ?3, 0)",
        params![file_id.0.as_bytes().to_vec(), op.as_str(), utc_ticks(chrono::Utc::now())],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Drains the write-ahead queue FIFO on `seq`, one record per fresh
/// transaction (spec §4.6 "Drain algorithm"). Each record is re-attempted
/// against the current state of the aggregate; on repeated failure
/// (`attempts >= config.max_attempts`) the record moves to the dead-letter
/// table with its last error. Returns the number of records drained
/// (successfully replayed or dead-lettered).
pub fn drain(
    conn: &mut Lease,
    analyzer: &Analyzer,
    schema_version: u32,
    config: &WriteAheadConfig,
    telemetry: &Telemetry,
) -> Result<usize> {
    let mut drained = 0;
    let mut last_seq = 0i64;
    loop {
        let next = peek_next(conn, last_seq)?;
        let Some(record) = next else { break };
        last_seq = record.seq;
        drain_one(conn, analyzer, schema_version, config, telemetry, record)?;
        drained += 1;
    }
    telemetry.set_write_ahead_depth(queue_depth(conn)?);
    Ok(drained)
}

/// Fetches the oldest record with `seq` strictly after `after_seq`. Using a
/// watermark rather than always taking the head of the queue means a
/// record that fails without being dead-lettered yet (`attempts` below the
/// configured max) is retried on the *next* `drain` call, not looped on
/// forever within this one.
fn peek_next(conn: &Lease, after_seq: i64) -> Result<Option<WriteAheadRecord>> {
    let row = conn
        .query_row(
            "SELECT seq, file_id, op, attempts FROM fts_write_ahead WHERE seq > ?1 ORDER BY seq LIMIT 1",
            params![after_seq],
            |row| {
                let file_id_bytes: Vec<u8> = row.get(1)?;
                let op: String = row.get(2)?;
                Ok((row.get::<_, i64>(0)?, file_id_bytes, op, row.get::<_, u32>(3)?))
            },
        )
        .optional()?;

    Ok(row.map(|(seq, file_id_bytes, op, attempts)| WriteAheadRecord {
        seq,
        file_id: FileId(uuid::Uuid::from_slice(&file_id_bytes).unwrap_or_default()),
        op: WriteAheadOp::from_str(&op),
        attempts,
    }))
}

fn drain_one(
    conn: &mut Lease,
    analyzer: &Analyzer,
    schema_version: u32,
    config: &WriteAheadConfig,
    telemetry: &Telemetry,
    record: WriteAheadRecord,
) -> Result<()> {
    telemetry.record_write_ahead_attempt();
    let tx = conn.transaction()?;
    let outcome = replay(&tx, analyzer, schema_version, &record);

    match outcome {
        Ok(()) => {
            tx.execute("DELETE FROM fts_write_ahead WHERE seq = ?1", params![record.seq])?;
            tx.commit()?;
        }
        Err(err) => {
            let attempts = record.attempts + 1;
            if attempts >= config.max_attempts {
                dead_letter(&tx, &record, attempts, &err.to_string())?;
                tx.execute("DELETE FROM fts_write_ahead WHERE seq = ?1", params![record.seq])?;
                telemetry.record_dead_letter();
            } else {
                tx.execute(
                    "UPDATE fts_write_ahead SET attempts = ?2 WHERE seq = ?1",
                    params![record.seq, attempts],
                )?;
            }
            tx.commit()?;
        }
    }
    Ok(())
}

fn replay(tx: &rusqlite::Transaction, analyzer: &Analyzer, schema_version: u32, record: &WriteAheadRecord) -> Result<()> {
    match record.op {
        WriteAheadOp::Delete => Projection::delete(tx, record.file_id),
        WriteAheadOp::Upsert => {
            let file = FileRepository::get(tx, record.file_id)?;
            match Projection::upsert(tx, &file, analyzer, schema_version) {
                Ok(_) => Ok(()),
                Err(err) if err.kind == crate::core::error::ErrorKind::ConcurrencyDrift => {
                    Projection::force_replace(tx, &file, analyzer, schema_version).map(|_| ())
                }
                Err(err) => Err(err),
            }
        }
    }
}

fn dead_letter(tx: &rusqlite::Transaction, record: &WriteAheadRecord, attempts: u32, error: &str) -> Result<()> {
    tx.execute(
        "INSERT INTO fts_write_ahead_dead_letter
            (seq, file_id, op, content_hash, title_hash, enqueued_utc, dead_lettered_utc, error, original_seq)
         SELECT ?2, file_id, op, content_hash, title_hash, enqueued_utc, ?3, ?4, seq
         FROM fts_write_ahead WHERE seq = ?1",
        params![
            record.seq,
            record.seq,
            utc_ticks(chrono::Utc::now()),
            format!("attempt {}: {}", attempts, error),
        ],
    )?;
    Ok(())
}

pub fn queue_depth(conn: &Lease) -> Result<u64> {
    let depth: i64 = conn.query_row("SELECT COUNT(*) FROM fts_write_ahead", [], |row| row.get(0))?;
    Ok(depth as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AnalyzerProfileConfig;
    use crate::core::types::{File, FileSystemMetadata, FileValidity, SearchIndexState};
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
    fn enqueued_upsert_drains_and_indexes() {
        let storage = Storage::open_in_memory().unwrap();
        let mut conn = storage.lease().unwrap();
        let analyzer = Analyzer::from_profile(&AnalyzerProfileConfig::cs_default());
        let file = sample_file("Report.docx", "hash-wa-1");
        FileRepository::insert(&conn, &file).unwrap();
        enqueue(&conn, file.id, WriteAheadOp::Upsert).unwrap();

        let telemetry = Telemetry::new();
        let config = WriteAheadConfig::default();
        let drained = drain(&mut conn, &analyzer, 1, &config, &telemetry).unwrap();
        assert_eq!(drained, 1);

        let reloaded = FileRepository::get(&conn, file.id).unwrap();
        assert!(!reloaded.search_index_state.is_stale);
        assert_eq!(queue_depth(&conn).unwrap(), 0);
    }

    #[test]
    fn repeated_failure_moves_to_dead_letter() {
        let storage = Storage::open_in_memory().unwrap();
        let mut conn = storage.lease().unwrap();
        let analyzer = Analyzer::from_profile(&AnalyzerProfileConfig::cs_default());
        // Enqueue a record for a file that was never inserted: every replay
        // attempt fails with NotFound, forcing the record to dead-letter.
        let ghost_id = FileId::new();
        enqueue(&conn, ghost_id, WriteAheadOp::Upsert).unwrap();

        let telemetry = Telemetry::new();
        let config = WriteAheadConfig {
            max_attempts: 2,
            ..WriteAheadConfig::default()
        };

        drain(&mut conn, &analyzer, 1, &config, &telemetry).unwrap();
        drain(&mut conn, &analyzer, 1, &config, &telemetry).unwrap();

        assert_eq!(queue_depth(&conn).unwrap(), 0);
        let dead_letters: i64 = conn
            .query_row("SELECT COUNT(*) FROM fts_write_ahead_dead_letter", [], |row| row.get(0))
            .unwrap();
        assert_eq!(dead_letters, 1);
    }
}
