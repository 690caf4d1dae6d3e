use crate::analysis::analyzer::Analyzer;
use crate::query::ast::{is_reserved_word, QueryNode, QueryToken, TokenKind};

/// Renders a `QueryNode` tree into an FTS5 `MATCH` expression string.
///
/// Each `Term`/`Prefix` operand is re-run through the analyzer at
/// emission time, since a single user-typed operand can expand into
/// several analyzed tokens (compounding, synonym expansion). Those
/// tokens form an "OR-list": alternative readings of the same operand
/// position, joined with `OR` rather than `AND`. A reserved word
/// (`and`/`or`/`not`/`near`) found among them is dropped when it
/// appeared verbatim in the user's raw input text (it was almost
/// certainly meant as prose, not an operator already consumed by the
/// parser) and double-quoted when the analyzer introduced it on its own
/// (spec §4.4, scenarios S3/S4). A node with no surviving tokens emits
/// nothing and collapses out of its parent `And`/`Or`/`Not`.
pub fn emit_fts(node: &QueryNode, analyzer: &Analyzer, original_text: &str) -> Option<String> {
    match node {
        QueryNode::Token(token) => emit_token(token, analyzer, original_text),
        QueryNode::And(left, right) => combine(emit_fts(left, analyzer, original_text), emit_fts(right, analyzer, original_text), "AND"),
        QueryNode::Or(left, right) => combine(emit_fts(left, analyzer, original_text), emit_fts(right, analyzer, original_text), "OR"),
        QueryNode::Not(inner) => emit_fts(inner, analyzer, original_text).map(|s| format!("NOT {}", s)),
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

fn emit_token(token: &QueryToken, analyzer: &Analyzer, original_text: &str) -> Option<String> {
    let rendered = match token.kind {
        TokenKind::Phrase => Some(quote(&token.value)),
        // FTS5's MATCH grammar has no infix wildcard operator (only a
        // trailing-`*` prefix query, handled by the Prefix arm below), so
        // an interior `*`/`?` can't be passed through to the engine as a
        // real wildcard. Rendered as a quoted literal: this degrades to an
        // exact-phrase match on the literal wildcard characters rather
        // than matching what the wildcard was meant to stand in for.
        TokenKind::Wildcard => Some(quote(&token.value)),
        TokenKind::Prefix => {
            let analyzed = analyzer.tokenize(&token.value);
            let stem = analyzed.last().map(|t| t.text.clone()).unwrap_or_else(|| token.value.to_lowercase());
            Some(format!("{}*", stem))
        }
        TokenKind::Term => emit_or_list(&token.value, analyzer, original_text),
    }?;
    Some(match &token.field {
        Some(field) => format!("{}:{}", field, rendered),
        None => rendered,
    })
}

fn emit_or_list(value: &str, analyzer: &Analyzer, original_text: &str) -> Option<String> {
    let analyzed = analyzer.tokenize(value);
    let mut survivors: Vec<String> = Vec::new();

    for t in &analyzed {
        if is_reserved_word(&t.text) {
            if raw_contains_word(original_text, &t.text) {
                continue;
            }
            survivors.push(quote(&t.text));
        } else {
            survivors.push(t.text.clone());
        }
    }

    if survivors.is_empty() {
        return None;
    }
    if survivors.len() == 1 {
        return Some(survivors.into_iter().next().unwrap());
    }
    Some(format!("({})", survivors.join(" OR ")))
}

fn raw_contains_word(original_text: &str, word: &str) -> bool {
    original_text.split_whitespace().any(|w| w.eq_ignore_ascii_case(word))
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
