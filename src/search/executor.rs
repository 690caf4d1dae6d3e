use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use uuid::Uuid;

use crate::analysis::analyzer::Analyzer;
use crate::analysis::filters::ngram::trigrams;
use crate::core::error::{Error, Result};
use crate::core::stats::{GridTelemetry, Telemetry};
use crate::core::types::{utc_ticks, File, FileId};
use crate::query::ast::{QueryNode, RangeBound, RangeFilter, SearchQueryPlan};
use crate::query::emit_fts::emit_fts;
use crate::query::emit_trigram::emit_trigram;
use crate::repository::FileRepository;
use crate::scoring::{bm25_relevance, normalize_relevance, trigram_overlap};
use crate::search::results::{FileGridRow, FileGridSearchResult, HighlightSpan, SearchHit, Snippet, SortMetadata};

/// Runs a `SearchQueryPlan` against the search projection (spec §4.5).
/// Every method takes a bare `&rusqlite::Connection` lease; a search never
/// opens a transaction since it never writes.
pub struct SearchQueryService;

impl SearchQueryService {
    /// Analytical (FTS5) search, ordered by BM25-derived relevance
    /// descending then `modified_utc` descending, windowed to
    /// `[skip, skip+take)`.
    pub fn search_with_scores(
        conn: &rusqlite::Connection,
        plan: &SearchQueryPlan,
        analyzer: &Analyzer,
        skip: usize,
        take: usize,
    ) -> Result<Vec<(FileId, f64)>> {
        let match_expr = plan.root.as_ref().and_then(|root| emit_fts(root, analyzer, &plan.original_text));
        if normalized_away(plan, &match_expr) {
            return Ok(Vec::new());
        }
        let (where_sql, mut params) = build_where(match_expr.as_deref(), "file_search", &plan.filters, None)?;
        let score_expr = if match_expr.is_some() { "bm25(file_search)" } else { "0.0" };

        let sql = format!(
            "SELECT f.id, {score_expr} AS raw_score FROM file_search \
             JOIN file_search_map m ON m.numeric_id = file_search.rowid \
             JOIN files f ON f.id = m.file_id \
             WHERE {where_sql} ORDER BY raw_score ASC, f.modified_utc DESC LIMIT ? OFFSET ?"
        );
        params.push(Value::Integer(take as i64));
        params.push(Value::Integer(skip as i64));

        let mut stmt = conn.prepare(&sql)?;
        let hits = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let id_bytes: Vec<u8> = row.get(0)?;
                let raw_score: f64 = row.get(1)?;
                Ok((file_id_from_bytes(&id_bytes), bm25_relevance(raw_score)))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// Fuzzy (trigram) search. Score is the normalised trigram overlap
    /// between the query's trigram set and each candidate's, computed in
    /// Rust since the trigram index carries no native ranking function.
    pub fn search_fuzzy_with_scores(
        conn: &rusqlite::Connection,
        plan: &SearchQueryPlan,
        analyzer: &Analyzer,
        skip: usize,
        take: usize,
    ) -> Result<Vec<(FileId, f64)>> {
        let match_expr = plan.root.as_ref().and_then(|root| emit_trigram(root, analyzer, false));
        if normalized_away(plan, &match_expr) {
            return Ok(Vec::new());
        }
        let (where_sql, mut params) = build_where(match_expr.as_deref(), "file_trigram", &plan.filters, None)?;
        let query_trigrams = collect_query_trigrams(plan, analyzer);

        let sql = format!(
            "SELECT f.id, file_trigram.token, f.modified_utc FROM file_trigram \
             JOIN file_search_map m ON m.numeric_id = file_trigram.rowid \
             JOIN files f ON f.id = m.file_id \
             WHERE {where_sql} LIMIT ?"
        );
        params.push(Value::Integer(plan.candidate_limit.max(skip + take) as i64));

        let mut stmt = conn.prepare(&sql)?;
        let mut scored: Vec<(FileId, f64, i64)> = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let id_bytes: Vec<u8> = row.get(0)?;
                let token: String = row.get(1)?;
                let modified_ticks: i64 = row.get(2)?;
                Ok((id_bytes, token, modified_ticks))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(id_bytes, token, modified_ticks)| {
                let doc_trigrams: HashSet<String> = token.split_whitespace().map(str::to_string).collect();
                (file_id_from_bytes(&id_bytes), trigram_overlap(&query_trigrams, &doc_trigrams), modified_ticks)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(b.2.cmp(&a.2)));
        Ok(scored.into_iter().skip(skip).take(take).map(|(id, score, _)| (id, score)).collect())
    }

    /// Cardinality without materialising hits, capped at
    /// `max_candidate_results`. Returns `(count, is_truncated)`.
    pub fn count(
        conn: &rusqlite::Connection,
        plan: &SearchQueryPlan,
        analyzer: &Analyzer,
        max_candidate_results: usize,
    ) -> Result<(usize, bool)> {
        let match_expr = plan.root.as_ref().and_then(|root| emit_fts(root, analyzer, &plan.original_text));
        if normalized_away(plan, &match_expr) {
            return Ok((0, false));
        }
        let (where_sql, params) = build_where(match_expr.as_deref(), "file_search", &plan.filters, None)?;
        let sql = format!(
            "SELECT COUNT(*) FROM file_search \
             JOIN file_search_map m ON m.numeric_id = file_search.rowid \
             JOIN files f ON f.id = m.file_id WHERE {where_sql}"
        );
        let actual_total: i64 = conn.query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
        let actual_total = actual_total as usize;
        Ok((actual_total.min(max_candidate_results), actual_total > max_candidate_results))
    }

    /// Combined pipeline producing a `FileGridSearchResult`: runs the
    /// exact or fuzzy path per `plan.fuzzy`, additionally constrained by
    /// `today`'s validity window, hydrates the windowed page from the
    /// authoritative store, and records the full paging tuple to
    /// telemetry (spec §4.5).
    pub fn search_grid(
        conn: &rusqlite::Connection,
        plan: &SearchQueryPlan,
        analyzer: &Analyzer,
        today: DateTime<Utc>,
        max_candidate_results: usize,
        telemetry: &Telemetry,
    ) -> Result<FileGridSearchResult> {
        let today_ticks = utc_ticks(today);
        let candidate_limit = plan.candidate_limit.min(max_candidate_results);

        let (scored, actual_total) = if plan.fuzzy {
            grid_fuzzy_candidates(conn, plan, analyzer, today_ticks, candidate_limit)?
        } else {
            grid_fts_candidates(conn, plan, analyzer, today_ticks, candidate_limit)?
        };

        let window: Vec<(FileId, f64)> = scored.into_iter().skip(plan.offset).take(plan.limit).collect();
        let mut items = Vec::with_capacity(window.len());
        for (id, score) in window {
            let file = FileRepository::get(conn, id)?;
            items.push(FileGridRow {
                file_id: file.id,
                name: file.name,
                extension: file.extension,
                mime: file.mime,
                author: file.author,
                size_bytes: file.size_bytes,
                created_utc: file.created_utc,
                modified_utc: file.modified_utc,
                content_hash: file.content_hash,
                score,
            });
        }

        let page = FileGridSearchResult::new(items, plan.offset, plan.limit, actual_total, max_candidate_results);

        telemetry.record_grid(&GridTelemetry {
            requested_offset: plan.offset,
            page_size: plan.limit,
            candidate_limit,
            max_candidate_results,
            returned: page.items.len(),
            reported_total: page.total_count,
            actual_total,
            has_more: page.has_more,
            is_truncated: page.is_truncated,
        });

        Ok(page)
    }

    /// Hydrates full `SearchHit`s: title snippet with highlight spans,
    /// a secondary-field map, and sort metadata. `limit` overrides
    /// `plan.limit` when given.
    pub fn search(
        conn: &rusqlite::Connection,
        plan: &SearchQueryPlan,
        analyzer: &Analyzer,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        let take = limit.unwrap_or(plan.limit);
        let scored = if plan.fuzzy {
            Self::search_fuzzy_with_scores(conn, plan, analyzer, plan.offset, take)?
        } else {
            Self::search_with_scores(conn, plan, analyzer, plan.offset, take)?
        };

        let k = scored.iter().map(|(_, score)| *score).fold(0.0_f64, f64::max).max(1.0);

        let mut hits = Vec::with_capacity(scored.len());
        for (id, raw_score) in scored {
            let file = FileRepository::get(conn, id)?;
            let normalized_score = normalize_relevance(raw_score.max(0.0), k);
            let snippet = build_snippet(&file, plan, analyzer);

            let mut secondary_fields = HashMap::new();
            secondary_fields.insert("author".to_string(), file.author.clone());
            secondary_fields.insert("mime".to_string(), file.mime.clone());
            secondary_fields.insert("extension".to_string(), file.extension.clone());
            secondary_fields.insert("content_hash".to_string(), file.content_hash.clone());

            hits.push(SearchHit {
                file_id: file.id,
                snippet,
                secondary_fields,
                sort: SortMetadata {
                    last_modified_utc: file.modified_utc,
                    normalized_score,
                    raw_score,
                },
            });
        }
        Ok(hits)
    }
}

fn grid_fts_candidates(
    conn: &rusqlite::Connection,
    plan: &SearchQueryPlan,
    analyzer: &Analyzer,
    today_ticks: i64,
    candidate_limit: usize,
) -> Result<(Vec<(FileId, f64)>, usize)> {
    let match_expr = plan.root.as_ref().and_then(|root| emit_fts(root, analyzer, &plan.original_text));
    if normalized_away(plan, &match_expr) {
        return Ok((Vec::new(), 0));
    }
    let (where_sql, mut params) = build_where(match_expr.as_deref(), "file_search", &plan.filters, Some(today_ticks))?;
    let score_expr = if match_expr.is_some() { "bm25(file_search)" } else { "0.0" };
    let from = "file_search JOIN file_search_map m ON m.numeric_id = file_search.rowid \
                JOIN files f ON f.id = m.file_id LEFT JOIN files_validity v ON v.file_id = f.id";

    let count_sql = format!("SELECT COUNT(*) FROM {from} WHERE {where_sql}");
    let actual_total: i64 = conn.query_row(&count_sql, params_from_iter(params.iter()), |row| row.get(0))?;

    let select_sql = format!(
        "SELECT f.id, {score_expr} AS raw_score FROM {from} WHERE {where_sql} ORDER BY raw_score ASC, f.modified_utc DESC LIMIT ?"
    );
    params.push(Value::Integer(candidate_limit as i64));
    let mut stmt = conn.prepare(&select_sql)?;
    let scored = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            let id_bytes: Vec<u8> = row.get(0)?;
            let raw_score: f64 = row.get(1)?;
            Ok((file_id_from_bytes(&id_bytes), bm25_relevance(raw_score)))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((scored, actual_total as usize))
}

fn grid_fuzzy_candidates(
    conn: &rusqlite::Connection,
    plan: &SearchQueryPlan,
    analyzer: &Analyzer,
    today_ticks: i64,
    candidate_limit: usize,
) -> Result<(Vec<(FileId, f64)>, usize)> {
    let match_expr = plan.root.as_ref().and_then(|root| emit_trigram(root, analyzer, false));
    if normalized_away(plan, &match_expr) {
        return Ok((Vec::new(), 0));
    }
    let (where_sql, params) = build_where(match_expr.as_deref(), "file_trigram", &plan.filters, Some(today_ticks))?;
    let from = "file_trigram JOIN file_search_map m ON m.numeric_id = file_trigram.rowid \
                JOIN files f ON f.id = m.file_id LEFT JOIN files_validity v ON v.file_id = f.id";

    let count_sql = format!("SELECT COUNT(*) FROM {from} WHERE {where_sql}");
    let actual_total: i64 = conn.query_row(&count_sql, params_from_iter(params.iter()), |row| row.get(0))?;

    let query_trigrams = collect_query_trigrams(plan, analyzer);
    let select_sql = format!("SELECT f.id, file_trigram.token, f.modified_utc FROM {from} WHERE {where_sql}");
    let mut stmt = conn.prepare(&select_sql)?;
    let mut scored: Vec<(FileId, f64, i64)> = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            let id_bytes: Vec<u8> = row.get(0)?;
            let token: String = row.get(1)?;
            let modified_ticks: i64 = row.get(2)?;
            Ok((id_bytes, token, modified_ticks))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .map(|(id_bytes, token, modified_ticks)| {
            let doc_trigrams: HashSet<String> = token.split_whitespace().map(str::to_string).collect();
            (file_id_from_bytes(&id_bytes), trigram_overlap(&query_trigrams, &doc_trigrams), modified_ticks)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(b.2.cmp(&a.2)));
    scored.truncate(candidate_limit);
    Ok((scored.into_iter().map(|(id, score, _)| (id, score)).collect(), actual_total as usize))
}

/// A non-empty query tree that renders to no match expression at all
/// (every token a stopword, or only raw reserved words that get dropped)
/// must produce an empty result set, not a match-all browse (spec §4.3
/// failure modes). `root == None` (no query text supplied) is the
/// legitimate match-all case and is left alone.
fn normalized_away(plan: &SearchQueryPlan, match_expr: &Option<String>) -> bool {
    plan.root.is_some() && match_expr.is_none()
}

/// Assembles a `WHERE` clause and its bound parameters, in the order
/// `[match, range..., validity]`; a query with none of those collapses to
/// `1 = 1` (match-all).
fn build_where(
    match_expr: Option<&str>,
    match_table: &str,
    filters: &[RangeFilter],
    today_ticks: Option<i64>,
) -> Result<(String, Vec<Value>)> {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    if let Some(expr) = match_expr {
        clauses.push(format!("{} MATCH ?", match_table));
        params.push(Value::Text(expr.to_string()));
    }

    let range_sql = build_range_clause(filters, &mut params)?;
    if !range_sql.is_empty() {
        clauses.push(range_sql);
    }

    if let Some(today_ticks) = today_ticks {
        params.push(Value::Integer(today_ticks));
        params.push(Value::Integer(today_ticks));
        clauses.push("(v.issued_at IS NULL OR v.issued_at <= ?) AND (v.valid_until IS NULL OR v.valid_until >= ?)".to_string());
    }

    if clauses.is_empty() {
        clauses.push("1 = 1".to_string());
    }
    Ok((clauses.join(" AND "), params))
}

/// Translates range filters on the only numeric fields the grid recognises
/// (`modified`, `created`, `size`) into bound SQL conditions. Any other
/// field name is a validation error.
fn build_range_clause(filters: &[RangeFilter], params: &mut Vec<Value>) -> Result<String> {
    let mut clauses = Vec::new();
    for filter in filters {
        let column = match filter.field.as_str() {
            "modified" => "f.modified_utc",
            "created" => "f.created_utc",
            "size" => "f.size_bytes",
            other => return Err(Error::validation(format!("unsupported range filter field '{}'", other))),
        };
        if let Some(lower) = &filter.lower {
            params.push(Value::Integer(numeric_bound(lower)?));
            let op = if filter.include_lower { ">=" } else { ">" };
            clauses.push(format!("{} {} ?", column, op));
        }
        if let Some(upper) = &filter.upper {
            params.push(Value::Integer(numeric_bound(upper)?));
            let op = if filter.include_upper { "<=" } else { "<" };
            clauses.push(format!("{} {} ?", column, op));
        }
    }
    Ok(clauses.join(" AND "))
}

fn numeric_bound(bound: &RangeBound) -> Result<i64> {
    match bound {
        RangeBound::Numeric(v) => Ok(*v),
        RangeBound::Text(_) => Err(Error::validation("range filters on modified/created/size must be numeric")),
    }
}

fn collect_query_trigrams(plan: &SearchQueryPlan, analyzer: &Analyzer) -> HashSet<String> {
    let mut set = HashSet::new();
    if let Some(root) = &plan.root {
        collect_node_trigrams(root, analyzer, &mut set);
    }
    set
}

fn collect_node_trigrams(node: &QueryNode, analyzer: &Analyzer, set: &mut HashSet<String>) {
    match node {
        QueryNode::Token(token) => {
            for t in analyzer.tokenize(&token.value) {
                set.extend(trigrams(&t.text));
            }
        }
        QueryNode::And(l, r) | QueryNode::Or(l, r) => {
            collect_node_trigrams(l, analyzer, set);
            collect_node_trigrams(r, analyzer, set);
        }
        QueryNode::Not(inner) => collect_node_trigrams(inner, analyzer, set),
    }
}

fn collect_query_terms(plan: &SearchQueryPlan, analyzer: &Analyzer) -> Vec<String> {
    let mut terms = Vec::new();
    if let Some(root) = &plan.root {
        collect_node_terms(root, analyzer, &mut terms);
    }
    terms
}

fn collect_node_terms(node: &QueryNode, analyzer: &Analyzer, terms: &mut Vec<String>) {
    match node {
        QueryNode::Token(token) => terms.extend(analyzer.tokenize(&token.value).into_iter().map(|t| t.text)),
        QueryNode::And(l, r) | QueryNode::Or(l, r) => {
            collect_node_terms(l, analyzer, terms);
            collect_node_terms(r, analyzer, terms);
        }
        QueryNode::Not(inner) => collect_node_terms(inner, analyzer, terms),
    }
}

/// Finds every case-insensitive, non-overlapping occurrence of an
/// analyzed query term inside the file's title and marks it as a
/// highlight span (spec §4.5 snippet).
fn build_snippet(file: &File, plan: &SearchQueryPlan, analyzer: &Analyzer) -> Snippet {
    let terms = collect_query_terms(plan, analyzer);
    let text = file.name.clone();
    let lower_chars: Vec<char> = text.to_lowercase().chars().collect();

    let mut highlights = Vec::new();
    for term in &terms {
        let term_chars: Vec<char> = term.chars().collect();
        if term_chars.is_empty() {
            continue;
        }
        let mut i = 0;
        while i + term_chars.len() <= lower_chars.len() {
            if lower_chars[i..i + term_chars.len()] == term_chars[..] {
                highlights.push(HighlightSpan {
                    start: i,
                    end: i + term_chars.len(),
                });
                i += term_chars.len();
            } else {
                i += 1;
            }
        }
    }
    highlights.sort_by_key(|h| h.start);

    Snippet {
        field: "title".to_string(),
        text,
        highlights,
    }
}

fn file_id_from_bytes(bytes: &[u8]) -> FileId {
    FileId(Uuid::from_slice(bytes).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AnalyzerProfileConfig;
    use crate::core::types::{FileSystemMetadata, FileValidity, SearchIndexState};
    use crate::projection::Projection;
    use crate::query::ast::SortDirection;
    use crate::query::builder::PlanBuilder;
    use crate::query::parser::QueryParser;
    use crate::storage::Storage;
    use std::collections::HashMap as StdHashMap;

    fn analyzer() -> Analyzer {
        Analyzer::from_profile(&AnalyzerProfileConfig::cs_default())
    }

    fn sample_file(name: &str, content_hash: &str, modified_utc: DateTime<Utc>) -> File {
        File {
            id: FileId::new(),
            name: name.to_string(),
            extension: "docx".to_string(),
            mime: "application/vnd.openxmlformats".to_string(),
            author: "alice".to_string(),
            size_bytes: 2048,
            content_hash: content_hash.to_string(),
            created_utc: modified_utc,
            modified_utc,
            is_read_only: false,
            validity: FileValidity::default(),
            fs_metadata: FileSystemMetadata::default(),
            extended_metadata: StdHashMap::new(),
            search_index_state: SearchIndexState::default(),
        }
    }

    fn seed(conn: &rusqlite::Connection, analyzer: &Analyzer, name: &str, content_hash: &str, modified_utc: DateTime<Utc>) -> File {
        let file = sample_file(name, content_hash, modified_utc);
        FileRepository::insert(conn, &file).unwrap();
        Projection::upsert(conn, &file, analyzer, 1).unwrap();
        file
    }

    fn plan_for(text: &str) -> SearchQueryPlan {
        let root = QueryParser::parse(text).unwrap();
        let mut builder = PlanBuilder::new(text).limit(50);
        if let Some(root) = root {
            builder = builder.root(root);
        }
        builder.build()
    }

    #[test]
    fn search_with_scores_finds_matching_title() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        let analyzer = analyzer();
        let now = Utc::now();
        let quarterly = seed(&conn, &analyzer, "Quarterly Report.docx", "hash-exec-1", now);
        seed(&conn, &analyzer, "Vacation Photos.zip", "hash-exec-2", now);

        let plan = plan_for("quarterly");
        let hits = SearchQueryService::search_with_scores(&conn, &plan, &analyzer, 0, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, quarterly.id);
    }

    #[test]
    fn search_with_scores_ranks_stronger_match_first() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        let analyzer = analyzer();
        let now = Utc::now();
        let strong = seed(&conn, &analyzer, "Report Report Report.docx", "hash-exec-3", now);
        seed(&conn, &analyzer, "Report Notes.docx", "hash-exec-4", now);

        let plan = plan_for("report");
        let hits = SearchQueryService::search_with_scores(&conn, &plan, &analyzer, 0, 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, strong.id);
        assert!(hits[0].1 >= hits[1].1);
    }

    #[test]
    fn range_filter_restricts_by_modified_tick() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        let analyzer = analyzer();
        let old = Utc::now() - chrono::Duration::days(400);
        let recent = Utc::now();
        seed(&conn, &analyzer, "Archive Report.docx", "hash-exec-5", old);
        let new_file = seed(&conn, &analyzer, "Archive Report New.docx", "hash-exec-6", recent);

        let cutoff = Utc::now() - chrono::Duration::days(1);
        let plan = PlanBuilder::new("archive")
            .root(QueryParser::parse("archive").unwrap().unwrap())
            .range("modified", Some(RangeBound::Numeric(utc_ticks(cutoff))), None, true, false)
            .limit(50)
            .build();

        let hits = SearchQueryService::search_with_scores(&conn, &plan, &analyzer, 0, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, new_file.id);
    }

    #[test]
    fn query_that_normalizes_to_nothing_returns_empty_not_everything() {
        // "and" alone is a reserved word that is dropped because it also
        // appears verbatim in the raw query text (spec §4.4 S3), leaving
        // emit_fts with nothing to render. A non-empty plan.root with no
        // emitted match expression must yield zero hits, not the corpus.
        use crate::query::builder::QueryBuilder;

        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        let analyzer = analyzer();
        let now = Utc::now();
        seed(&conn, &analyzer, "Report.docx", "hash-exec-empty-1", now);
        seed(&conn, &analyzer, "Invoice.docx", "hash-exec-empty-2", now);

        let plan = PlanBuilder::new("and").root(QueryBuilder::term(None, "and").build()).limit(50).build();

        let hits = SearchQueryService::search_with_scores(&conn, &plan, &analyzer, 0, 10).unwrap();
        assert!(hits.is_empty());

        let fuzzy_hits = SearchQueryService::search_fuzzy_with_scores(&conn, &plan, &analyzer, 0, 10).unwrap();
        assert!(fuzzy_hits.is_empty());

        let (count, is_truncated) = SearchQueryService::count(&conn, &plan, &analyzer, 100).unwrap();
        assert_eq!(count, 0);
        assert!(!is_truncated);

        let telemetry = Telemetry::new();
        let page = SearchQueryService::search_grid(&conn, &plan, &analyzer, now, 100, &telemetry).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total_count, 0);
    }

    #[test]
    fn search_fuzzy_with_scores_tolerates_a_typo() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        let analyzer = analyzer();
        let now = Utc::now();
        let file = seed(&conn, &analyzer, "Andromeda Galaxy.docx", "hash-exec-7", now);

        let plan = plan_for("andromeda");
        let hits = SearchQueryService::search_fuzzy_with_scores(&conn, &plan, &analyzer, 0, 10).unwrap();
        assert!(hits.iter().any(|(id, score)| *id == file.id && *score > 0.0));
    }

    #[test]
    fn count_caps_at_max_candidate_results() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        let analyzer = analyzer();
        let now = Utc::now();
        for i in 0..5 {
            seed(&conn, &analyzer, "Report.docx", &format!("hash-exec-count-{i}"), now);
        }

        let plan = plan_for("report");
        let (count, is_truncated) = SearchQueryService::count(&conn, &plan, &analyzer, 3).unwrap();
        assert_eq!(count, 3);
        assert!(is_truncated);

        let (count, is_truncated) = SearchQueryService::count(&conn, &plan, &analyzer, 100).unwrap();
        assert_eq!(count, 5);
        assert!(!is_truncated);
    }

    #[test]
    fn search_grid_paging_invariants_hold() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        let analyzer = analyzer();
        let now = Utc::now();
        for i in 0..5 {
            seed(&conn, &analyzer, "Invoice.docx", &format!("hash-exec-grid-{i}"), now);
        }
        let telemetry = Telemetry::new();

        let plan = PlanBuilder::new("invoice")
            .root(QueryParser::parse("invoice").unwrap().unwrap())
            .sort("modified", SortDirection::Desc)
            .offset(2)
            .limit(2)
            .candidate_limit(2000)
            .build();

        let page = SearchQueryService::search_grid(&conn, &plan, &analyzer, now, 2000, &telemetry).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_count, 5);
        assert!(page.has_more);
        assert!(!page.is_truncated);
    }

    #[test]
    fn search_hydrates_snippet_with_highlight_span() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        let analyzer = analyzer();
        let file = seed(&conn, &analyzer, "Quarterly Report.docx", "hash-exec-8", Utc::now());

        let plan = plan_for("quarterly");
        let hits = SearchQueryService::search(&conn, &plan, &analyzer, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_id, file.id);
        assert!(!hits[0].snippet.highlights.is_empty());
        assert!(hits[0].sort.normalized_score >= 0.0 && hits[0].sort.normalized_score < 1.0);
    }
}
