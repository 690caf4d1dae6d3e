use rusqlite::params;

use crate::core::error::Result;
use crate::core::stats::Telemetry;
use crate::core::types::utc_ticks;

/// Prevents duplicate execution of a command with the same request id
/// (spec §4.9, property 7). Inserts with `INSERT OR IGNORE` on the
/// primary key; the caller treats a `false` return as "already
/// processed, reject the command without reapplying its effects".
pub struct Idempotency;

impl Idempotency {
    /// Returns `true` if this is the first time `key` has been seen (the
    /// command should proceed), `false` if it was already recorded (the
    /// command should be rejected as already-processed).
    pub fn try_begin(conn: &rusqlite::Connection, key: &str, telemetry: &Telemetry) -> Result<bool> {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO idempotency_keys (key, created_utc) VALUES (?1, ?2)",
            params![key, utc_ticks(chrono::Utc::now())],
        )?;
        let began = inserted > 0;
        if !began {
            telemetry.record_idempotency_reject();
        }
        Ok(began)
    }

    /// Deletes keys older than `ttl`. Intended to run on a periodic
    /// background sweeper (spec §4.9 "background sweeper").
    pub fn sweep_expired(conn: &rusqlite::Connection, ttl: std::time::Duration) -> Result<usize> {
        let ttl_ticks = (ttl.as_nanos() / 100) as i64;
        let cutoff = utc_ticks(chrono::Utc::now()) - ttl_ticks;
        let deleted = conn.execute("DELETE FROM idempotency_keys WHERE created_utc < ?1", params![cutoff])?;
        Ok(deleted)
    }
}
