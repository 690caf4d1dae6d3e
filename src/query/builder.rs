use crate::query::ast::{
    QueryNode, QueryToken, RangeBound, RangeFilter, SearchQueryPlan, SortDirection, SortSpec, TokenKind,
};

/// Fluent, immutable builder for a `QueryNode` tree. Every combinator
/// consumes `self` and returns a new value; calling `build` twice on
/// values constructed the same way always yields structurally equal
/// trees (spec §8, property 1).
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    node: QueryNode,
}

impl QueryBuilder {
    pub fn term(field: Option<&str>, value: &str) -> Self {
        QueryBuilder {
            node: QueryNode::Token(QueryToken {
                field: field.map(str::to_string),
                value: value.to_string(),
                kind: TokenKind::Term,
            }),
        }
    }

    pub fn prefix(field: Option<&str>, value: &str) -> Self {
        QueryBuilder {
            node: QueryNode::Token(QueryToken {
                field: field.map(str::to_string),
                value: value.to_string(),
                kind: TokenKind::Prefix,
            }),
        }
    }

    pub fn wildcard(field: Option<&str>, value: &str) -> Self {
        QueryBuilder {
            node: QueryNode::Token(QueryToken {
                field: field.map(str::to_string),
                value: value.to_string(),
                kind: TokenKind::Wildcard,
            }),
        }
    }

    pub fn phrase(field: Option<&str>, value: &str) -> Self {
        QueryBuilder {
            node: QueryNode::Token(QueryToken {
                field: field.map(str::to_string),
                value: value.to_string(),
                kind: TokenKind::Phrase,
            }),
        }
    }

    pub fn and(self, other: QueryBuilder) -> Self {
        QueryBuilder {
            node: QueryNode::And(Box::new(self.node), Box::new(other.node)),
        }
    }

    pub fn or(self, other: QueryBuilder) -> Self {
        QueryBuilder {
            node: QueryNode::Or(Box::new(self.node), Box::new(other.node)),
        }
    }

    pub fn not(self) -> Self {
        QueryBuilder {
            node: QueryNode::Not(Box::new(self.node)),
        }
    }

    pub fn build(self) -> QueryNode {
        self.node
    }
}

/// Assembles a complete `SearchQueryPlan` from a boolean tree, range
/// filters, sort order, and paging bounds. `candidate_limit` defaults to
/// `limit` when never set explicitly.
pub struct PlanBuilder {
    original_text: String,
    root: Option<QueryNode>,
    filters: Vec<RangeFilter>,
    sort: Vec<SortSpec>,
    offset: usize,
    limit: usize,
    candidate_limit: Option<usize>,
    fuzzy: bool,
}

impl PlanBuilder {
    pub fn new(original_text: impl Into<String>) -> Self {
        PlanBuilder {
            original_text: original_text.into(),
            root: None,
            filters: Vec::new(),
            sort: Vec::new(),
            offset: 0,
            limit: 50,
            candidate_limit: None,
            fuzzy: false,
        }
    }

    pub fn root(mut self, node: QueryNode) -> Self {
        self.root = Some(node);
        self
    }

    pub fn range(
        mut self,
        field: impl Into<String>,
        lower: Option<RangeBound>,
        upper: Option<RangeBound>,
        include_lower: bool,
        include_upper: bool,
    ) -> Self {
        self.filters.push(RangeFilter {
            field: field.into(),
            lower,
            upper,
            include_lower,
            include_upper,
        });
        self
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(SortSpec {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn candidate_limit(mut self, candidate_limit: usize) -> Self {
        self.candidate_limit = Some(candidate_limit);
        self
    }

    pub fn fuzzy(mut self, fuzzy: bool) -> Self {
        self.fuzzy = fuzzy;
        self
    }

    pub fn build(self) -> SearchQueryPlan {
        SearchQueryPlan {
            original_text: self.original_text,
            root: self.root,
            filters: self.filters,
            sort: self.sort,
            offset: self.offset,
            limit: self.limit,
            candidate_limit: self.candidate_limit.unwrap_or(self.limit),
            fuzzy: self.fuzzy,
        }
    }
}
