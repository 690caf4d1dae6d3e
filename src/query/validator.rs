use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::query::ast::{QueryNode, SearchQueryPlan};

const MAX_QUERY_DEPTH: usize = 32;
const MAX_CLAUSES: usize = 1024;

/// Structural and resource-bound checks run on a `SearchQueryPlan`
/// before it reaches the search service: tree depth and clause count
/// guard against pathological input, paging bounds are clamped to the
/// configured maxima (spec §4.3, §6).
pub struct QueryValidator<'a> {
    config: &'a Config,
}

impl<'a> QueryValidator<'a> {
    pub fn new(config: &'a Config) -> Self {
        QueryValidator { config }
    }

    pub fn validate(&self, plan: &SearchQueryPlan) -> Result<()> {
        if let Some(root) = &plan.root {
            let depth = tree_depth(root);
            if depth > MAX_QUERY_DEPTH {
                return Err(Error::validation(format!(
                    "query tree depth {} exceeds maximum {}",
                    depth, MAX_QUERY_DEPTH
                )));
            }
            let clauses = clause_count(root);
            if clauses > MAX_CLAUSES {
                return Err(Error::validation(format!(
                    "query has {} clauses, maximum is {}",
                    clauses, MAX_CLAUSES
                )));
            }
        }

        if plan.limit == 0 {
            return Err(Error::validation("limit must be greater than zero"));
        }
        if plan.limit > self.config.max_page_size {
            return Err(Error::validation(format!(
                "limit {} exceeds configured max_page_size {}",
                plan.limit, self.config.max_page_size
            )));
        }
        if plan.candidate_limit > self.config.max_candidate_results {
            return Err(Error::validation(format!(
                "candidate_limit {} exceeds configured max_candidate_results {}",
                plan.candidate_limit, self.config.max_candidate_results
            )));
        }

        Ok(())
    }
}

fn tree_depth(node: &QueryNode) -> usize {
    match node {
        QueryNode::Token(_) => 1,
        QueryNode::And(l, r) | QueryNode::Or(l, r) => 1 + tree_depth(l).max(tree_depth(r)),
        QueryNode::Not(inner) => 1 + tree_depth(inner),
    }
}

fn clause_count(node: &QueryNode) -> usize {
    match node {
        QueryNode::Token(_) => 1,
        QueryNode::And(l, r) | QueryNode::Or(l, r) => clause_count(l) + clause_count(r),
        QueryNode::Not(inner) => clause_count(inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::builder::PlanBuilder;

    #[test]
    fn rejects_limit_above_max_page_size() {
        let config = Config::default();
        let plan = PlanBuilder::new("alpha").limit(config.max_page_size + 1).build();
        assert!(QueryValidator::new(&config).validate(&plan).is_err());
    }

    #[test]
    fn rejects_zero_limit() {
        let config = Config::default();
        let plan = PlanBuilder::new("alpha").limit(0).build();
        assert!(QueryValidator::new(&config).validate(&plan).is_err());
    }

    #[test]
    fn accepts_a_well_formed_plan() {
        let config = Config::default();
        let root = crate::query::parser::QueryParser::parse("alpha AND beta").unwrap();
        let plan = PlanBuilder::new("alpha AND beta").root(root.unwrap()).limit(50).build();
        assert!(QueryValidator::new(&config).validate(&plan).is_ok());
    }
}
