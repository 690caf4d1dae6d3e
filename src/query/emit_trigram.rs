use crate::analysis::analyzer::Analyzer;
use crate::analysis::filters::ngram::trigrams;
use crate::query::ast::{is_reserved_word, QueryNode, QueryToken, TokenKind};

/// Builds the text stored in `file_trigram` for one analyzed token: the
/// space-joined, unquoted trigram set for tokens of length >= 3, or the
/// token itself for shorter tokens (there are no trigrams to take).
/// Used when populating the index, never when querying it (spec §4.4).
pub fn build_index_entry(token: &str) -> String {
    let grams = trigrams(token);
    if grams.is_empty() {
        token.to_string()
    } else {
        grams.join(" ")
    }
}

/// Builds the quoted `MATCH` fragment for one analyzed token.
///
/// Tokens shorter than 3 characters, and reserved words regardless of
/// length, are quoted as a single literal. Longer tokens decompose into
/// trigrams: `require_all` controls whether those trigrams must appear
/// as one contiguous quoted phrase (`"abc bcd cde"`, effectively an AND
/// of adjacent trigrams) or may match independently via an `OR` of
/// individually-quoted trigrams (looser, more typo-tolerant).
pub fn build_trigram_match(token: &str, require_all: bool) -> String {
    if is_reserved_word(token) {
        return quote(token);
    }
    let grams = trigrams(token);
    if grams.is_empty() {
        return quote(token);
    }
    if require_all {
        quote(&grams.join(" "))
    } else {
        grams.iter().map(|g| quote(g)).collect::<Vec<_>>().join(" OR ")
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Renders a `QueryNode` tree into a trigram-index `MATCH` expression,
/// mirroring `emit_fts`'s tree-walk but routing each analyzed token
/// through `build_trigram_match` instead of verbatim/quoted text.
/// Reserved words are always quoted here; unlike the FTS5 emitter,
/// there is no drop-if-raw exception, because the trigram index has no
/// concept of an accidental boolean operator to guard against.
pub fn emit_trigram(node: &QueryNode, analyzer: &Analyzer, require_all: bool) -> Option<String> {
    match node {
        QueryNode::Token(token) => emit_token(token, analyzer, require_all),
        QueryNode::And(left, right) => combine(emit_trigram(left, analyzer, require_all), emit_trigram(right, analyzer, require_all), "AND"),
        QueryNode::Or(left, right) => combine(emit_trigram(left, analyzer, require_all), emit_trigram(right, analyzer, require_all), "OR"),
        QueryNode::Not(inner) => emit_trigram(inner, analyzer, require_all).map(|s| format!("NOT {}", s)),
    }
}

fn combine(left: Option<String>, right: Option<String>, op: &str) -> Option<String> {
    match (left, right) {
        (Some(l), Some(r)) => Some(format!("({} {} {})", l, op, r)),
        (Some(l), None) => Some(l),
        (None, Some(r)) => Some(r),
        (None, None) => None,
    }
}

fn emit_token(token: &QueryToken, analyzer: &Analyzer, require_all: bool) -> Option<String> {
    let rendered = match token.kind {
        // The trigram index has no wildcard matching of any kind (it only
        // ever matches on literal trigrams), so an interior `*`/`?` is
        // rendered as a quoted literal, same as Phrase: this degrades to
        // an exact-sequence match on the literal wildcard characters
        // rather than matching what the wildcard was meant to stand in
        // for.
        TokenKind::Phrase | TokenKind::Wildcard => Some(quote(&token.value)),
        _ => {
            let analyzed = analyzer.tokenize(&token.value);
            let parts: Vec<String> = analyzed.iter().map(|t| build_trigram_match(&t.text, require_all)).collect();
            if parts.is_empty() {
                None
            } else if parts.len() == 1 {
                Some(parts.into_iter().next().unwrap())
            } else {
                Some(format!("({})", parts.join(" OR ")))
            }
        }
    }?;
    Some(match &token.field {
        Some(field) => format!("{}:{}", field, rendered),
        None => rendered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn short_token_is_quoted_as_a_literal() {
        assert_eq!(build_trigram_match("go", false), "\"go\"");
    }

    #[test]
    fn reserved_word_is_always_quoted() {
        assert_eq!(build_trigram_match("and", false), "\"and\"");
        assert_eq!(build_trigram_match("and", true), "\"and\"");
    }

    #[test]
    fn require_all_joins_trigrams_as_one_phrase() {
        assert_eq!(build_trigram_match("alpha", true), "\"alp lph pha\"");
    }

    #[test]
    fn require_all_false_ors_individual_trigrams() {
        assert_eq!(build_trigram_match("alpha", false), "\"alp\" OR \"lph\" OR \"pha\"");
    }

    #[test]
    fn index_entry_is_unquoted_space_joined_trigrams() {
        assert_eq!(build_index_entry("andromeda"), "and ndr dro rom ome med eda");
    }

    #[test]
    fn index_entry_for_short_token_is_the_token_itself() {
        assert_eq!(build_index_entry("go"), "go");
    }

    proptest! {
        // Unlike the FTS5 emitter, the trigram side never drops a
        // reserved word even when it appeared verbatim in the raw query
        // text: it always renders as a quoted literal, for both
        // require_all settings (spec §4.4).
        #[test]
        fn reserved_words_are_always_quoted_wholesale(require_all in any::<bool>()) {
            for word in ["and", "or", "not", "near", "AND", "Near"] {
                let rendered = build_trigram_match(word, require_all);
                prop_assert_eq!(rendered, format!("\"{}\"", word));
            }
        }
    }
}
