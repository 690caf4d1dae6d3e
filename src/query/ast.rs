use serde::{Deserialize, Serialize};

/// How a single query token should be matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    /// A plain word, run through the analyzer before matching.
    Term,
    /// A word followed by `*`: matched as a prefix after analysis.
    Prefix,
    /// A word containing `*` or `?` interior to the text: passed through
    /// to the engine largely unanalyzed.
    Wildcard,
    /// A double-quoted span: matched as an exact adjacent sequence.
    Phrase,
}

/// One leaf of the query tree: a single field-qualified operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryToken {
    pub field: Option<String>,
    pub value: String,
    pub kind: TokenKind,
}

/// The boolean query tree produced by the parser. `Token` leaves carry the
/// raw (pre-analysis) operand text; analysis happens at emission time, not
/// here, so the same tree can be rendered against either match-expression
/// dialect (spec §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryNode {
    Token(QueryToken),
    And(Box<QueryNode>, Box<QueryNode>),
    Or(Box<QueryNode>, Box<QueryNode>),
    Not(Box<QueryNode>),
}

/// A scalar bound for a `RangeFilter`. Kept distinct from the AST proper:
/// ranges never participate in MATCH-expression emission, only in the
/// generated SQL `WHERE` clause (spec §4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RangeBound {
    Numeric(i64),
    Text(String),
}

/// A half- or fully-bounded range constraint over one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeFilter {
    pub field: String,
    pub lower: Option<RangeBound>,
    pub upper: Option<RangeBound>,
    pub include_lower: bool,
    pub include_upper: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

/// The fully-built, immutable query plan handed to the search service.
/// `root` is `None` for a query with no boolean content (range-only or
/// match-all); `original_text` is retained for the reserved-word raw-input
/// check the emitters perform (spec §4.4, scenarios S3/S4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQueryPlan {
    pub original_text: String,
    pub root: Option<QueryNode>,
    pub filters: Vec<RangeFilter>,
    pub sort: Vec<SortSpec>,
    pub offset: usize,
    pub limit: usize,
    pub candidate_limit: usize,
    pub fuzzy: bool,
}

/// Field qualifiers recognised by the lexer and accepted by the builder.
/// Anything else stays part of the term text (`a:b` with an unknown `a`
/// is just a word containing a colon).
pub const FIELD_QUALIFIERS: &[&str] = &["title", "author", "mime", "metadata_text"];

/// Words the parser treats as boolean operators; also the set the
/// match-expression emitters quote-or-drop per spec §4.4.
pub const RESERVED_WORDS: &[&str] = &["and", "or", "not", "near"];

pub fn is_field_qualifier(word: &str) -> bool {
    FIELD_QUALIFIERS.iter().any(|f| f.eq_ignore_ascii_case(word))
}

pub fn is_reserved_word(word: &str) -> bool {
    RESERVED_WORDS.iter().any(|r| r.eq_ignore_ascii_case(word))
}
