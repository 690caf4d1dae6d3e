use rusqlite::params;

use crate::core::error::Result;
use crate::core::stats::Telemetry;
use crate::core::types::utc_ticks;

/// A single outbox row ready for dispatch.
#[derive(Debug, Clone)]
pub struct OutboxEvent {
    pub id: i64,
    pub event_type: String,
    pub payload: String,
    pub created_utc: i64,
}

/// Append-only event log for projection-side effects (spec §4.9). Events
/// are appended inside the same transaction as the aggregate write and
/// dispatched FIFO by a separate worker, which is why `append` and
/// `dispatch_pending` never share a transaction here.
pub struct Outbox;

impl Outbox {
    /// Appends an event. Call this inside the caller's own transaction so
    /// the event is durable iff the aggregate write committed.
    pub fn append(conn: &rusqlite::Connection, event_type: &str, payload: &str) -> Result<i64> {
        conn.execute(
            "INSERT INTO outbox_events (type, payload, created_utc) VALUES (?1, ?2, ?3)",
            params![event_type, payload, utc_ticks(chrono::Utc::now())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Returns unprocessed events in append order (spec §5 ordering
    /// guarantee 3: outbox events for a given aggregate are delivered in
    /// append order).
    pub fn pending(conn: &rusqlite::Connection, limit: usize) -> Result<Vec<OutboxEvent>> {
        let mut stmt = conn.prepare(
            "SELECT id, type, payload, created_utc FROM outbox_events
             WHERE processed_utc IS NULL ORDER BY id LIMIT ?1",
        )?;
        let events = stmt
            .query_map(params![limit as i64], |row| {
                Ok(OutboxEvent {
                    id: row.get(0)?,
                    event_type: row.get(1)?,
                    payload: row.get(2)?,
                    created_utc: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Marks an event processed. Idempotent: marking an already-processed
    /// or nonexistent id is a no-op, not an error — the dispatcher may be
    /// resumed after a crash between `pending()` and this call.
    pub fn mark_processed(conn: &rusqlite::Connection, id: i64) -> Result<()> {
        conn.execute(
            "UPDATE outbox_events SET processed_utc = ?2 WHERE id = ?1 AND processed_utc IS NULL",
            params![id, utc_ticks(chrono::Utc::now())],
        )?;
        Ok(())
    }

    pub fn backlog(conn: &rusqlite::Connection) -> Result<u64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM outbox_events WHERE processed_utc IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Drains up to `limit` pending events through `handler`, marking each
    /// processed as soon as `handler` returns `Ok`, and updates the
    /// backlog gauge in telemetry. A handler failure stops the drain at
    /// that event — earlier events in the batch are already marked.
    pub fn dispatch_pending(
        conn: &rusqlite::Connection,
        limit: usize,
        telemetry: &Telemetry,
        mut handler: impl FnMut(&OutboxEvent) -> Result<()>,
    ) -> Result<usize> {
        let events = Self::pending(conn, limit)?;
        let mut dispatched = 0;
        for event in &events {
            handler(event)?;
            Self::mark_processed(conn, event.id)?;
            dispatched += 1;
        }
        telemetry.set_outbox_backlog(Self::backlog(conn)?);
        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    #[test]
    fn events_dispatch_in_append_order() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        Outbox::append(&conn, "file.indexed", "{\"id\":1}").unwrap();
        Outbox::append(&conn, "file.indexed", "{\"id\":2}").unwrap();

        let telemetry = Telemetry::new();
        let mut seen = Vec::new();
        let dispatched = Outbox::dispatch_pending(&conn, 10, &telemetry, |event| {
            seen.push(event.payload.clone());
            Ok(())
        })
        .unwrap();

        assert_eq!(dispatched, 2);
        assert_eq!(seen, vec!["{\"id\":1}".to_string(), "{\"id\":2}".to_string()]);
        assert_eq!(Outbox::backlog(&conn).unwrap(), 0);
    }

    #[test]
    fn mark_processed_is_idempotent() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        let id = Outbox::append(&conn, "file.indexed", "{}").unwrap();
        Outbox::mark_processed(&conn, id).unwrap();
        Outbox::mark_processed(&conn, id).unwrap();
        Outbox::mark_processed(&conn, 9999).unwrap();
    }
}
