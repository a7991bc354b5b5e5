//! Parser for the filter expression language.
//!
//! Grammar (in rough EBNF):
//!
//! filter     = or_expr EOF
//! or_expr    = and_expr ("OR" and_expr)*
//! and_expr   = sub_expr ("AND" sub_expr)*
//! sub_expr   = "(" or_expr ")" | simple
//! simple     = IDENT comparator operand
//!            | LITERAL "="? IDENT
//! comparator = "LIKE" | "=" | "<>" | "<" "="? | ">" "="?
//! operand    = LITERAL | IDENT

use super::ast::{Comparator, FilterTree, Predicate};
use super::error::FilterError;
use super::lexer::{Token, TokenKind, tokenize};

/// Parser state.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        // tokenize() always terminates the sequence with Eof
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &'static str) -> FilterError {
        let tok = self.peek();
        let found = match tok.kind {
            TokenKind::Identifier => format!("identifier `{}`", tok.text),
            TokenKind::Literal => format!("literal '{}'", tok.text),
            other => other.describe().to_string(),
        };
        FilterError::Parse {
            offset: tok.offset,
            found,
            expected,
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<Token, FilterError> {
        if self.peek_kind() == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    /// Parse the top-level filter; the whole token stream must be consumed.
    fn parse_filter(&mut self) -> Result<FilterTree, FilterError> {
        let tree = self.parse_or_expr()?;
        self.expect(TokenKind::Eof, "AND, OR or end of input")?;
        Ok(tree)
    }

    /// Parse OR expression: and_expr ("OR" and_expr)*
    fn parse_or_expr(&mut self) -> Result<FilterTree, FilterError> {
        let mut children = vec![self.parse_and_expr()?];
        while self.eat(TokenKind::Or) {
            children.push(self.parse_and_expr()?);
        }
        Ok(collapse(children, FilterTree::Or))
    }

    /// Parse AND expression: sub_expr ("AND" sub_expr)*
    fn parse_and_expr(&mut self) -> Result<FilterTree, FilterError> {
        let mut children = vec![self.parse_sub_expr()?];
        while self.eat(TokenKind::And) {
            children.push(self.parse_sub_expr()?);
        }
        Ok(collapse(children, FilterTree::And))
    }

    /// Parse a parenthesized expression or a simple predicate.
    fn parse_sub_expr(&mut self) -> Result<FilterTree, FilterError> {
        if self.eat(TokenKind::LeftParen) {
            let inner = self.parse_or_expr()?;
            self.expect(TokenKind::RightParen, "')'")?;
            return Ok(FilterTree::Sub(Box::new(inner)));
        }
        self.parse_simple()
    }

    fn parse_simple(&mut self) -> Result<FilterTree, FilterError> {
        match self.peek_kind() {
            TokenKind::Identifier => {
                let identifier = self.advance().text;
                let comparator = self.parse_comparator()?;
                let literal = self.parse_operand()?;
                Ok(FilterTree::Simple(Predicate::new(
                    identifier, comparator, literal,
                )))
            }
            // Literal-first form is always an equality test.
            TokenKind::Literal => {
                let literal = self.advance().text;
                self.eat(TokenKind::Equals);
                let identifier = self.expect(TokenKind::Identifier, "identifier")?.text;
                Ok(FilterTree::Simple(Predicate::new(
                    identifier,
                    Comparator::Equal,
                    literal,
                )))
            }
            _ => Err(self.unexpected("identifier, literal or '('")),
        }
    }

    /// Resolve the comparator. `<` and `>` look one token further for a
    /// trailing `=` since the lexer emits `<=` as two tokens.
    fn parse_comparator(&mut self) -> Result<Comparator, FilterError> {
        if self.eat(TokenKind::Like) {
            return Ok(Comparator::Like);
        }
        if self.eat(TokenKind::Equals) {
            return Ok(Comparator::Equal);
        }
        if self.eat(TokenKind::NotEquals) {
            return Ok(Comparator::NotEqual);
        }
        if self.eat(TokenKind::LessThan) {
            return Ok(if self.eat(TokenKind::Equals) {
                Comparator::LessThanOrEqual
            } else {
                Comparator::LessThan
            });
        }
        if self.eat(TokenKind::GreaterThan) {
            return Ok(if self.eat(TokenKind::Equals) {
                Comparator::GreaterThanOrEqual
            } else {
                Comparator::GreaterThan
            });
        }
        Err(self.unexpected("comparator"))
    }

    /// A quoted literal, or a bareword such as the `5` in `age<=5`.
    fn parse_operand(&mut self) -> Result<String, FilterError> {
        match self.peek_kind() {
            TokenKind::Literal | TokenKind::Identifier => Ok(self.advance().text),
            _ => Err(self.unexpected("literal")),
        }
    }
}

fn collapse(mut children: Vec<FilterTree>, wrap: fn(Vec<FilterTree>) -> FilterTree) -> FilterTree {
    if children.len() == 1 {
        children.remove(0)
    } else {
        wrap(children)
    }
}

/// Compile a filter expression into a [`FilterTree`].
pub fn parse_filter(source: &str) -> Result<FilterTree, FilterError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    parser.parse_filter()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(identifier: &str, comparator: Comparator, literal: &str) -> FilterTree {
        FilterTree::Simple(Predicate::new(
            identifier.to_string(),
            comparator,
            literal.to_string(),
        ))
    }

    #[test]
    fn test_simple_equality() {
        assert_eq!(
            parse_filter("name = 'Paris'").unwrap(),
            simple("name", Comparator::Equal, "Paris")
        );
    }

    #[test]
    fn test_less_or_equal_is_one_predicate() {
        assert_eq!(
            parse_filter("age<=5").unwrap(),
            simple("age", Comparator::LessThanOrEqual, "5")
        );
        assert_eq!(
            parse_filter("age >= '18'").unwrap(),
            simple("age", Comparator::GreaterThanOrEqual, "18")
        );
    }

    #[test]
    fn test_all_comparators() {
        let cases = [
            ("a = 'x'", Comparator::Equal),
            ("a <> 'x'", Comparator::NotEqual),
            ("a LIKE 'x'", Comparator::Like),
            ("a < 'x'", Comparator::LessThan),
            ("a <= 'x'", Comparator::LessThanOrEqual),
            ("a > 'x'", Comparator::GreaterThan),
            ("a >= 'x'", Comparator::GreaterThanOrEqual),
        ];
        for (source, expected) in cases {
            assert_eq!(parse_filter(source).unwrap(), simple("a", expected, "x"), "{source}");
        }
    }

    #[test]
    fn test_literal_first_fallback() {
        let expected = simple("city", Comparator::Equal, "Paris");
        assert_eq!(parse_filter("'Paris' = city").unwrap(), expected);
        assert_eq!(parse_filter("'Paris' city").unwrap(), expected);
    }

    #[test]
    fn test_literal_first_never_infers_other_comparators() {
        assert!(matches!(
            parse_filter("'5' < age"),
            Err(FilterError::Parse { offset: 4, .. })
        ));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let tree = parse_filter("a = '1' OR b = '2' AND c = '3'").unwrap();
        assert_eq!(
            tree,
            FilterTree::Or(vec![
                simple("a", Comparator::Equal, "1"),
                FilterTree::And(vec![
                    simple("b", Comparator::Equal, "2"),
                    simple("c", Comparator::Equal, "3"),
                ]),
            ])
        );
    }

    #[test]
    fn test_parentheses_make_sub_expressions() {
        let tree = parse_filter("(a = '1' OR b = '2') AND c = '3'").unwrap();
        assert_eq!(
            tree,
            FilterTree::And(vec![
                FilterTree::Sub(Box::new(FilterTree::Or(vec![
                    simple("a", Comparator::Equal, "1"),
                    simple("b", Comparator::Equal, "2"),
                ]))),
                simple("c", Comparator::Equal, "3"),
            ])
        );
    }

    #[test]
    fn test_trailing_tokens_are_rejected() {
        let err = parse_filter("a = 'x' b").unwrap_err();
        assert_eq!(err.offset(), 8);
        assert!(matches!(err, FilterError::Parse { .. }));
    }

    #[test]
    fn test_dangling_operator() {
        let err = parse_filter("a = 'x' AND").unwrap_err();
        assert!(matches!(err, FilterError::Parse { offset: 11, .. }));
    }

    #[test]
    fn test_unclosed_parenthesis() {
        let err = parse_filter("(a = 'x'").unwrap_err();
        assert!(matches!(err, FilterError::Parse { offset: 8, .. }));
    }

    #[test]
    fn test_empty_input() {
        let err = parse_filter("   ").unwrap_err();
        assert!(matches!(err, FilterError::Parse { offset: 3, .. }));
    }

    #[test]
    fn test_lex_errors_surface() {
        assert_eq!(parse_filter("a = \"x\""), Err(FilterError::Lex { offset: 4 }));
    }

    #[test]
    fn test_display_reparses_to_same_tree() {
        let sources = [
            "a = 'x'",
            "age<=5",
            "'Paris' = city",
            "(a = '1' OR b LIKE 'S%') AND c <> '3'",
            "((x > '2'))",
        ];
        for source in sources {
            let tree = parse_filter(source).unwrap();
            let reparsed = parse_filter(&tree.to_string()).unwrap();
            assert_eq!(tree, reparsed, "{source}");
        }
    }
}
