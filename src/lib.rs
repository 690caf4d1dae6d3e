//! A local-first document management backend with a hybrid FTS5/trigram
//! search projection over SQLite.
//!
//! The authoritative `File` aggregate (`repository`) and its derived search
//! projection (`projection`) are reconciled, never assumed consistent: a
//! write updates both inside one transaction when it can, and falls back to
//! a write-ahead queue (`projection::write_ahead`) and a background
//! `coordinator` when it can't. `audit` independently reconciles the two
//! sides by full enumeration, for when even the write-ahead path has
//! drifted. `query` builds a single boolean plan that `search` renders
//! against either index via two independent emitters, so the exact and
//! fuzzy paths never diverge in what they consider a match.

pub mod analysis;
pub mod audit;
pub mod core;
pub mod coordinator;
pub mod idempotency;
pub mod outbox;
pub mod projection;
pub mod query;
pub mod repository;
pub mod scoring;
pub mod search;
pub mod signature;
pub mod storage;
