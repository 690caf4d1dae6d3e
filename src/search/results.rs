use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::FileId;

/// A character-offset span into a hit's snippet text, marking one matched
/// operand for highlighting. Offsets are counted in `char`s, not bytes, so
/// they stay valid across multi-byte UTF-8 text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightSpan {
    pub start: usize,
    pub end: usize,
}

/// The primary matched field rendered for display, with the spans inside
/// it that a query term touched (spec §4.5 "snippet (primary field +
/// character-offset highlight spans)").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub field: String,
    pub text: String,
    pub highlights: Vec<HighlightSpan>,
}

/// Per-hit sort metadata, carried alongside the hit rather than folded
/// into `score` so callers can re-sort or re-normalize without re-querying
/// (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SortMetadata {
    pub last_modified_utc: DateTime<Utc>,
    /// Squashed into `[0, 1)` via `scoring::normalize_relevance`.
    pub normalized_score: f64,
    /// The reshaped, ascending-is-better relevance value before normalization.
    pub raw_score: f64,
}

/// One hydrated search result: matched file, a highlighted snippet, a map
/// of secondary fields for display, and sort metadata (spec §4.5 `search`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub file_id: FileId,
    pub snippet: Snippet,
    pub secondary_fields: HashMap<String, String>,
    pub sort: SortMetadata,
}

/// A uniform page envelope, generic over its item type so both the hit
/// grid and other paginated views can share the shape (spec §4.5
/// `PageResult`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    /// Always `min(actual_total, max_candidate_results)` — design notes §9.
    pub total_count: usize,
    pub has_more: bool,
    pub is_truncated: bool,
}

impl<T> PageResult<T> {
    /// Builds a page from its window and totals, deriving `has_more` and
    /// `page` from `offset`/`limit` per the §4.5 paging invariants.
    pub fn new(items: Vec<T>, offset: usize, limit: usize, actual_total: usize, max_candidate_results: usize) -> Self {
        let total_count = actual_total.min(max_candidate_results);
        let page_size = limit;
        let page = if page_size == 0 { 0 } else { offset / page_size };
        let has_more = offset + items.len() < total_count;
        let is_truncated = actual_total > max_candidate_results;
        PageResult {
            items,
            page,
            page_size,
            total_count,
            has_more,
            is_truncated,
        }
    }
}

/// One row of the `search_grid` projection: enough authoritative fields
/// for a grid/table view plus the score that ordered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileGridRow {
    pub file_id: FileId,
    pub name: String,
    pub extension: String,
    pub mime: String,
    pub author: String,
    pub size_bytes: u64,
    pub created_utc: DateTime<Utc>,
    pub modified_utc: DateTime<Utc>,
    pub content_hash: String,
    pub score: f64,
}

pub type FileGridSearchResult = PageResult<FileGridRow>;

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: FileId, score: f64) -> FileGridRow {
        FileGridRow {
            file_id: id,
            name: "Report.docx".to_string(),
            extension: "docx".to_string(),
            mime: "application/vnd.openxmlformats".to_string(),
            author: "alice".to_string(),
            size_bytes: 2048,
            created_utc: Utc::now(),
            modified_utc: Utc::now(),
            content_hash: "hash".to_string(),
            score,
        }
    }

    #[test]
    fn has_more_when_window_does_not_reach_total() {
        let items = vec![row(FileId::new(), 1.0), row(FileId::new(), 0.5)];
        let page = PageResult::new(items, 0, 2, 10, 2000);
        assert!(page.has_more);
        assert_eq!(page.total_count, 10);
        assert!(!page.is_truncated);
    }

    #[test]
    fn no_more_when_window_reaches_total() {
        let items = vec![row(FileId::new(), 1.0)];
        let page = PageResult::new(items, 9, 2, 10, 2000);
        assert!(!page.has_more);
    }

    #[test]
    fn is_truncated_when_actual_total_exceeds_cap() {
        let items: Vec<FileGridRow> = Vec::new();
        let page = PageResult::new(items, 0, 50, 5000, 2000);
        assert_eq!(page.total_count, 2000);
        assert!(page.is_truncated);
    }
}
