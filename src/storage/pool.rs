use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OptionalExtension;

use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::storage::schema;

/// A connection checked out from the pool for at most one transaction, per
/// the shared-resource policy in spec §5/§6. PRAGMAs are applied once, on
/// the manager's `with_init` hook, so every lease already has the right
/// journal mode and timeouts before the caller sees it.
pub type Lease = PooledConnection<SqliteConnectionManager>;

/// Result of the startup FTS5/tokenizer probe (spec §6 "Detection").
#[derive(Debug, Clone)]
pub struct FulltextAvailability {
    pub is_available: bool,
    pub reason: Option<String>,
}

/// Owns the pooled connection to the embedded store and the one-time
/// schema/FTS5 probe. Cloned cheaply (the pool itself is an `Arc` inside).
#[derive(Clone)]
pub struct Storage {
    pool: Pool<SqliteConnectionManager>,
    fulltext: FulltextAvailability,
}

impl Storage {
    pub fn open(config: &Config) -> Result<Self> {
        let busy_timeout = config.busy_timeout;
        let manager = if config.storage_path.as_os_str() == ":memory:" {
            SqliteConnectionManager::memory().with_init(move |conn| {
                apply_pragmas(conn, busy_timeout)
            })
        } else {
            SqliteConnectionManager::file(&config.storage_path).with_init(move |conn| {
                apply_pragmas(conn, busy_timeout)
            })
        };

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .build(manager)
            .map_err(Error::from)?;

        let storage = Storage {
            pool,
            fulltext: FulltextAvailability {
                is_available: true,
                reason: None,
            },
        };

        let lease = storage.lease()?;
        schema::create_authoritative_schema(&lease)?;
        let fulltext = probe_fts5(&lease);
        if fulltext.is_available {
            schema::create_search_schema(&lease)?;
        } else {
            tracing::warn!(reason = ?fulltext.reason, "search subsystem unavailable at startup");
        }

        Ok(Storage { fulltext, ..storage })
    }

    /// Opens a storage backed by an anonymous in-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let mut config = Config::default();
        config.storage_path = Path::new(":memory:").to_path_buf();
        config.pool_size = 1;
        Self::open(&config)
    }

    pub fn lease(&self) -> Result<Lease> {
        self.pool.get().map_err(Error::from)
    }

    pub fn fulltext_availability(&self) -> &FulltextAvailability {
        &self.fulltext
    }

    pub fn is_fulltext_available(&self) -> bool {
        self.fulltext.is_available
    }
}

fn apply_pragmas(conn: &mut rusqlite::Connection, busy_timeout: Duration) -> std::result::Result<(), rusqlite::Error> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

/// Probes whether the linked SQLite build carries the `fts5` module and
/// the `unicode61` tokenizer with `remove_diacritics` support, without
/// leaving any table behind.
pub fn probe_fts5(conn: &rusqlite::Connection) -> FulltextAvailability {
    let attempt = conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS __fts5_probe USING fts5(x, tokenize='unicode61 remove_diacritics 2');
         DROP TABLE __fts5_probe;",
    );
    match attempt {
        Ok(()) => FulltextAvailability {
            is_available: true,
            reason: None,
        },
        Err(err) => FulltextAvailability {
            is_available: false,
            reason: Some(format!("fts5 module unavailable: {}", err)),
        },
    }
}

pub fn table_exists(conn: &rusqlite::Connection, name: &str) -> Result<bool> {
    let exists: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type IN ('table','view') AND name = ?1",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}
