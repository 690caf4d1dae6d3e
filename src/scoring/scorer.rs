use std::collections::HashSet;

/// Converts a raw FTS5 `bm25()` value (ascending is worse; typically
/// negative) into an ascending-is-better relevance magnitude. SQLite
/// computes the actual BM25 statistics itself; this crate only reshapes
/// the result for sorting and normalization (spec §4.5).
pub fn bm25_relevance(raw_bm25: f64) -> f64 {
    -raw_bm25
}

/// Squashes an unbounded, ascending-is-better relevance value into
/// `[0, 1)`, approaching 1 as relevance grows without bound. `k` is the
/// relevance value that maps to 0.5; a corpus with larger bm25 magnitudes
/// wants a larger `k` to keep the curve from saturating early.
pub fn normalize_relevance(relevance: f64, k: f64) -> f64 {
    if relevance <= 0.0 {
        return 0.0;
    }
    let k = if k > 0.0 { k } else { f64::EPSILON };
    relevance / (relevance + k)
}

/// Fraction of the query's trigram set also present in a candidate
/// document's trigram set: `|query ∩ doc| / |query|` (spec §4.5
/// "normalised trigram overlap", the fuzzy-match score). A query with no
/// trigrams of its own (every operand shorter than three characters) has
/// nothing to measure overlap against and scores 0.
pub fn trigram_overlap(query_trigrams: &HashSet<String>, doc_trigrams: &HashSet<String>) -> f64 {
    if query_trigrams.is_empty() {
        return 0.0;
    }
    let matched = query_trigrams.intersection(doc_trigrams).count();
    matched as f64 / query_trigrams.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn more_negative_bm25_yields_higher_relevance() {
        assert!(bm25_relevance(-5.0) > bm25_relevance(-1.0));
    }

    #[test]
    fn normalize_relevance_is_bounded_and_monotonic() {
        let low = normalize_relevance(1.0, 2.0);
        let high = normalize_relevance(100.0, 2.0);
        assert!(low > 0.0 && low < 1.0);
        assert!(high > low && high < 1.0);
        assert_eq!(normalize_relevance(0.0, 2.0), 0.0);
    }

    #[test]
    fn full_overlap_scores_one() {
        let query: HashSet<String> = ["alp", "lph", "pha"].iter().map(|s| s.to_string()).collect();
        let doc = query.clone();
        assert_eq!(trigram_overlap(&query, &doc), 1.0);
    }

    #[test]
    fn partial_overlap_is_a_fraction_of_query_size() {
        let query: HashSet<String> = ["alp", "lph", "pha"].iter().map(|s| s.to_string()).collect();
        let doc: HashSet<String> = ["alp", "zzz"].iter().map(|s| s.to_string()).collect();
        assert!((trigram_overlap(&query, &doc) - (1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn empty_query_trigrams_score_zero() {
        let query: HashSet<String> = HashSet::new();
        let doc: HashSet<String> = ["alp"].iter().map(|s| s.to_string()).collect();
        assert_eq!(trigram_overlap(&query, &doc), 0.0);
    }
}
