use crate::core::error::{Error, ErrorKind, Result};
use crate::query::ast::{QueryNode, QueryToken, TokenKind};
use crate::query::lexer::{lex, LexToken};

/// Parses a lexed token stream into a `QueryNode` tree by precedence
/// climbing over `NOT` (highest) > `AND` > `OR` (lowest), the same
/// grammar a shunting-yard parser would produce for this operator set.
/// Two operands with no operator between them get an implicit `AND`
/// (spec §4.3).
pub struct QueryParser {
    tokens: Vec<LexToken>,
    pos: usize,
}

impl QueryParser {
    pub fn parse(input: &str) -> Result<Option<QueryNode>> {
        let tokens = lex(input);
        if tokens.is_empty() {
            return Ok(None);
        }
        let mut parser = QueryParser { tokens, pos: 0 };
        let node = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(Error::new(
                ErrorKind::Validation,
                format!("unexpected token at position {} in query", parser.pos),
            ));
        }
        Ok(Some(node))
    }

    fn peek(&self) -> Option<&LexToken> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<LexToken> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn at_operand_start(&self) -> bool {
        matches!(
            self.peek(),
            Some(LexToken::Word(_)) | Some(LexToken::Phrase(_)) | Some(LexToken::Field(_)) | Some(LexToken::LParen) | Some(LexToken::Not)
        )
    }

    fn parse_or(&mut self) -> Result<QueryNode> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(LexToken::Or)) {
            self.advance();
            let right = self.parse_and()?;
            left = QueryNode::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<QueryNode> {
        let mut left = self.parse_not()?;
        loop {
            if matches!(self.peek(), Some(LexToken::And)) {
                self.advance();
                let right = self.parse_not()?;
                left = QueryNode::And(Box::new(left), Box::new(right));
            } else if self.at_operand_start() {
                let right = self.parse_not()?;
                left = QueryNode::And(Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<QueryNode> {
        if matches!(self.peek(), Some(LexToken::Not)) {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(QueryNode::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<QueryNode> {
        let field = if let Some(LexToken::Field(name)) = self.peek() {
            let name = name.clone();
            self.advance();
            Some(name)
        } else {
            None
        };

        match self.advance() {
            Some(LexToken::LParen) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(LexToken::RParen) => Ok(inner),
                    _ => Err(Error::new(ErrorKind::Validation, "unbalanced parenthesis in query")),
                }
            }
            Some(LexToken::Word(word)) => Ok(QueryNode::Token(classify_word(field, &word))),
            Some(LexToken::Phrase(phrase)) => Ok(QueryNode::Token(QueryToken {
                field,
                value: phrase,
                kind: TokenKind::Phrase,
            })),
            other => Err(Error::new(
                ErrorKind::Validation,
                format!("expected a term, phrase, or '(' but found {:?}", other),
            )),
        }
    }
}

fn classify_word(field: Option<String>, word: &str) -> QueryToken {
    if word.len() > 1 && word.ends_with('*') && !word[..word.len() - 1].contains(['*', '?']) {
        return QueryToken {
            field,
            value: word[..word.len() - 1].to_string(),
            kind: TokenKind::Prefix,
        };
    }
    if word.contains('*') || word.contains('?') {
        return QueryToken {
            field,
            value: word.to_string(),
            kind: TokenKind::Wildcard,
        };
    }
    QueryToken {
        field,
        value: word.to_string(),
        kind: TokenKind::Term,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(value: &str) -> QueryNode {
        QueryNode::Token(QueryToken {
            field: None,
            value: value.to_string(),
            kind: TokenKind::Term,
        })
    }

    #[test]
    fn implicit_and_between_bare_words() {
        let parsed = QueryParser::parse("alpha beta").unwrap().unwrap();
        assert_eq!(parsed, QueryNode::And(Box::new(term("alpha")), Box::new(term("beta"))));
    }

    #[test]
    fn explicit_or_binds_looser_than_and() {
        let parsed = QueryParser::parse("alpha AND beta OR gamma").unwrap().unwrap();
        let expected = QueryNode::Or(
            Box::new(QueryNode::And(Box::new(term("alpha")), Box::new(term("beta")))),
            Box::new(term("gamma")),
        );
        assert_eq!(parsed, expected);
    }

    #[test]
    fn not_binds_tighter_than_and() {
        let parsed = QueryParser::parse("NOT alpha beta").unwrap().unwrap();
        let expected = QueryNode::And(Box::new(QueryNode::Not(Box::new(term("alpha")))), Box::new(term("beta")));
        assert_eq!(parsed, expected);
    }

    #[test]
    fn parenthesised_group_overrides_precedence() {
        let parsed = QueryParser::parse("alpha AND (beta OR gamma)").unwrap().unwrap();
        let expected = QueryNode::And(
            Box::new(term("alpha")),
            Box::new(QueryNode::Or(Box::new(term("beta")), Box::new(term("gamma")))),
        );
        assert_eq!(parsed, expected);
    }

    #[test]
    fn field_qualifier_attaches_to_the_next_word() {
        let parsed = QueryParser::parse("title:report").unwrap().unwrap();
        assert_eq!(
            parsed,
            QueryNode::Token(QueryToken {
                field: Some("title".to_string()),
                value: "report".to_string(),
                kind: TokenKind::Term,
            })
        );
    }

    #[test]
    fn trailing_star_is_a_prefix_token() {
        let parsed = QueryParser::parse("repor*").unwrap().unwrap();
        assert_eq!(
            parsed,
            QueryNode::Token(QueryToken {
                field: None,
                value: "repor".to_string(),
                kind: TokenKind::Prefix,
            })
        );
    }

    #[test]
    fn empty_query_has_no_root() {
        assert_eq!(QueryParser::parse("   ").unwrap(), None);
    }

    #[test]
    fn unbalanced_parenthesis_is_rejected() {
        assert!(QueryParser::parse("(alpha AND beta").is_err());
    }
}
