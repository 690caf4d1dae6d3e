use std::collections::BTreeSet;
use std::time::Instant;

use crate::analysis::analyzer::Analyzer;
use crate::core::error::Result;
use crate::core::stats::Telemetry;
use crate::core::types::FileId;
use crate::projection::Projection;
use crate::repository::FileRepository;

/// Classification of every id touched by a `verify()` pass (spec §4.8).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditSummary {
    pub missing: BTreeSet<FileId>,
    pub drift: BTreeSet<FileId>,
    pub extra: BTreeSet<FileId>,
}

impl AuditSummary {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.drift.is_empty() && self.extra.is_empty()
    }
}

/// Enumerates authoritative rows and the search projection and reconciles
/// them. `verify()` is read-only; `repair()` enqueues reindex work and
/// deletes orphaned projection rows.
pub struct IntegrityAuditor;

impl IntegrityAuditor {
    /// Compares every authoritative id against the projection's id set
    /// (spec §4.8): ids present only in the projection become `extra`, ids
    /// present only authoritatively become `missing`, and ids present in
    /// both but whose signature has drifted become `drift`.
    pub fn verify(
        conn: &rusqlite::Connection,
        analyzer: &Analyzer,
        target_schema_version: u32,
        telemetry: &Telemetry,
    ) -> Result<AuditSummary> {
        let start = Instant::now();
        let mut projected_ids = projection_ids(conn)?;

        let mut summary = AuditSummary::default();
        for id in FileRepository::list_all_ids(conn)? {
            if !projected_ids.remove(&id) {
                summary.missing.insert(id);
                continue;
            }
            let file = FileRepository::get(conn, id)?;
            if file.search_index_state.is_stale || Projection::needs_reindex(&file, target_schema_version, analyzer) {
                summary.drift.insert(id);
            }
        }
        summary.extra = projected_ids;

        telemetry.record_audit(
            start.elapsed().as_millis() as u64,
            summary.missing.len() as u64,
            summary.drift.len() as u64,
            summary.extra.len() as u64,
        );
        tracing::info!(
            missing = summary.missing.len(),
            drift = summary.drift.len(),
            extra = summary.extra.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "audit verify complete"
        );
        Ok(summary)
    }

    /// Schedules `missing ∪ drift` for reindexing (deduplicated and
    /// lexicographically ordered by `FileId`'s `Ord` impl, which sorts by
    /// UUID bytes, for deterministic scheduling order) and deletes `extra`
    /// rows from the projection directly. Returns the number scheduled.
    pub fn repair(conn: &rusqlite::Connection, summary: &AuditSummary, mut enqueue: impl FnMut(FileId) -> Result<()>) -> Result<usize> {
        let mut to_schedule: BTreeSet<FileId> = summary.missing.clone();
        to_schedule.extend(summary.drift.iter().copied());

        for id in &to_schedule {
            enqueue(*id)?;
        }
        for id in &summary.extra {
            Projection::delete(conn, *id)?;
        }
        Ok(to_schedule.len())
    }
}

fn projection_ids(conn: &rusqlite::Connection) -> Result<BTreeSet<FileId>> {
    let mut stmt = conn.prepare("SELECT file_id FROM file_search_map")?;
    let ids = stmt
        .query_map([], |row| {
            let bytes: Vec<u8> = row.get(0)?;
            Ok(bytes)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids
        .into_iter()
        .map(|b| FileId(uuid::Uuid::from_slice(&b).unwrap_or_default()))
        .collect())
}
