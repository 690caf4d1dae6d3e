use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a `File` aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId(pub Uuid);

impl FileId {
    pub fn new() -> Self {
        FileId(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        FileId::new()
    }
}

impl From<Uuid> for FileId {
    fn from(id: Uuid) -> Self {
        FileId(id)
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Filesystem-derived metadata carried alongside the authoritative row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileSystemMetadata {
    pub attributes: u32,
    pub owner_sid: Option<String>,
    pub hard_link_count: u32,
    pub alternate_data_stream_count: u32,
}

/// Optional validity window (document is "valid" between issuance and expiry).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileValidity {
    pub issued_at: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub has_physical_copy: bool,
    pub has_electronic_copy: bool,
}

impl FileValidity {
    /// `valid_until ≥ issued_at` when both are set.
    pub fn is_well_formed(&self) -> bool {
        match (self.issued_at, self.valid_until) {
            (Some(issued), Some(until)) => until >= issued,
            _ => true,
        }
    }
}

/// Search-index bookkeeping for a single file; owned by the aggregate,
/// consulted and updated by the projection writer and the auditor.
///
/// The richer `confirm_indexed` contract (design notes §9) is adopted
/// exclusively: a non-stale row always carries `analyzer_version` and
/// `token_hash`. The legacy `(schema_version, timestamp)`-only form is not
/// modelled as a separate variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchIndexState {
    pub schema_version: u32,
    pub is_stale: bool,
    pub last_indexed_utc: Option<DateTime<Utc>>,
    pub indexed_content_hash: Option<String>,
    pub indexed_title: Option<String>,
    pub analyzer_version: Option<u32>,
    pub token_hash: Option<String>,
}

impl SearchIndexState {
    pub fn confirm_indexed(
        &mut self,
        schema_version: u32,
        now: DateTime<Utc>,
        content_hash: String,
        analyzer_version: u32,
        token_hash: String,
        normalized_title: String,
    ) {
        self.schema_version = schema_version;
        self.last_indexed_utc = Some(now);
        self.indexed_content_hash = Some(content_hash);
        self.indexed_title = Some(normalized_title);
        self.analyzer_version = Some(analyzer_version);
        self.token_hash = Some(token_hash);
        self.is_stale = false;
    }

    pub fn mark_stale(&mut self) {
        self.is_stale = true;
    }

    /// Invariant: `is_stale=false ⇒ all indexed_* set`.
    pub fn is_well_formed(&self) -> bool {
        if self.is_stale {
            return true;
        }
        self.last_indexed_utc.is_some()
            && self.indexed_content_hash.is_some()
            && self.analyzer_version.is_some()
            && self.token_hash.is_some()
    }
}

/// A single extended-metadata value, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MetadataValue {
    Null,
    String(String),
    StringArray(Vec<String>),
    U32(u32),
    I32(i32),
    F64(f64),
    Bool(bool),
    Uuid(Uuid),
    FileTime(DateTime<Utc>),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetadataKey {
    pub format_id: Uuid,
    pub property_id: i32,
}

/// Map from `(format_id, property_id)` to a tagged value. Insertion order is
/// irrelevant; round-trip preserving.
pub type ExtendedMetadata = HashMap<MetadataKey, MetadataValue>;

/// The authoritative File aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: FileId,
    pub name: String,
    pub extension: String,
    pub mime: String,
    pub author: String,
    pub size_bytes: u64,
    /// SHA-256 of the file content, hex-encoded. Globally unique.
    pub content_hash: String,
    pub created_utc: DateTime<Utc>,
    pub modified_utc: DateTime<Utc>,
    pub is_read_only: bool,
    pub validity: FileValidity,
    pub fs_metadata: FileSystemMetadata,
    pub extended_metadata: ExtendedMetadata,
    pub search_index_state: SearchIndexState,
}

impl File {
    /// `modified_utc ≥ created_utc` and validity window well-formed.
    pub fn is_well_formed(&self) -> bool {
        self.modified_utc >= self.created_utc
            && self.validity.is_well_formed()
            && self.search_index_state.is_well_formed()
    }

    /// Flattened text fed to the analyzer for signature/title/metadata
    /// indexing: title, then a simple join of string-valued extended
    /// metadata.
    pub fn metadata_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for value in self.extended_metadata.values() {
            match value {
                MetadataValue::String(s) => parts.push(s.as_str()),
                MetadataValue::StringArray(items) => {
                    for item in items {
                        parts.push(item.as_str());
                    }
                }
                _ => {}
            }
        }
        parts.join(" ")
    }
}

/// UTC tick count (100ns units since the Unix epoch), matching the
/// authoritative store's date representation for range filters.
pub fn utc_ticks(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_nanos_opt().unwrap_or(0) / 100
}

pub fn ticks_to_utc(ticks: i64) -> Option<DateTime<Utc>> {
    let nanos = ticks.checked_mul(100)?;
    DateTime::from_timestamp(nanos / 1_000_000_000, (nanos % 1_000_000_000) as u32)
}
