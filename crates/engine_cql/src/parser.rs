/// Recursive-descent parser for CQL.
///
/// ```text
/// expr    := unary (('&' | '|') unary)*
/// unary   := '!' unary | primary
/// primary := ('EXACT' | 'CONTAINS') '(' name (',' name)* ')' | '(' expr ')'
/// ```
///
/// `&` and `|` share one precedence level and fold left to right, so
/// `A & B | C & D` is `((A & B) | C) & D`. Use parentheses to group
/// differently.
use crate::ast::CqlExpr;
use crate::lexer::{LexError, Lexer, SpannedToken, Token};
use std::fmt;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub col: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.col, self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        Self {
            col: e.col,
            message: e.message,
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Deepest nesting of `(` and `!` accepted before parsing gives up.
pub const MAX_DEPTH: usize = 128;

pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub fn parse(input: &str) -> Result<CqlExpr, ParseError> {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.tokenize()?;
        let mut parser = Self {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.parse_expr()?;
        if !parser.at(&Token::Eof) {
            return Err(parser.error(format!("unexpected {}", parser.peek())));
        }
        Ok(expr)
    }

    // -- Helpers --

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn error(&self, message: String) -> ParseError {
        ParseError {
            col: self.tokens[self.pos].col,
            message,
        }
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {expected}, got {}", self.peek())))
        }
    }

    fn expect_name(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Ident(s) => {
                self.advance();
                Ok(s)
            }
            other => Err(self.error(format!("expected component name, got {other}"))),
        }
    }

    fn descend(&mut self) -> Result<(), ParseError> {
        if self.depth == MAX_DEPTH {
            return Err(self.error(format!("expression nested deeper than {MAX_DEPTH} levels")));
        }
        self.depth += 1;
        Ok(())
    }

    // -- Grammar --

    fn parse_expr(&mut self) -> Result<CqlExpr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            if self.eat(&Token::Amp) {
                let rhs = self.parse_unary()?;
                lhs = CqlExpr::And(Box::new(lhs), Box::new(rhs));
            } else if self.eat(&Token::Pipe) {
                let rhs = self.parse_unary()?;
                lhs = CqlExpr::Or(Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_unary(&mut self) -> Result<CqlExpr, ParseError> {
        if self.at(&Token::Bang) {
            self.descend()?;
            self.advance();
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(CqlExpr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<CqlExpr, ParseError> {
        match self.peek() {
            Token::Exact => {
                self.advance();
                Ok(CqlExpr::Exact(self.parse_names()?))
            }
            Token::Contains => {
                self.advance();
                Ok(CqlExpr::Contains(self.parse_names()?))
            }
            Token::LParen => {
                self.descend()?;
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            other => Err(self.error(format!(
                "expected EXACT, CONTAINS, '!' or '(', got {other}"
            ))),
        }
    }

    fn parse_names(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(&Token::LParen)?;
        let mut names = vec![self.expect_name()?];
        while self.eat(&Token::Comma) {
            names.push(self.expect_name()?);
        }
        self.expect(&Token::RParen)?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains(name: &str) -> CqlExpr {
        CqlExpr::Contains(vec![name.to_string()])
    }

    fn and(a: CqlExpr, b: CqlExpr) -> CqlExpr {
        CqlExpr::And(Box::new(a), Box::new(b))
    }

    fn or(a: CqlExpr, b: CqlExpr) -> CqlExpr {
        CqlExpr::Or(Box::new(a), Box::new(b))
    }

    #[test]
    fn test_parse_single_term() {
        let expr = Parser::parse("EXACT(Health, Attack)").unwrap();
        assert_eq!(
            expr,
            CqlExpr::Exact(vec!["Health".to_string(), "Attack".to_string()])
        );
    }

    #[test]
    fn test_left_to_right_fold() {
        let (a, b, c, d) = (
            contains("A"),
            contains("B"),
            contains("C"),
            contains("D"),
        );
        assert_eq!(
            Parser::parse("CONTAINS(A) & CONTAINS(B) | CONTAINS(C)").unwrap(),
            or(and(a.clone(), b.clone()), c.clone())
        );
        assert_eq!(
            Parser::parse("CONTAINS(A) | CONTAINS(B) & CONTAINS(C)").unwrap(),
            and(or(a.clone(), b.clone()), c.clone())
        );
        assert_eq!(
            Parser::parse("CONTAINS(A) & CONTAINS(B) | CONTAINS(C) & CONTAINS(D)").unwrap(),
            and(or(and(a, b), c), d)
        );
    }

    #[test]
    fn test_parentheses_override_fold() {
        let expr = Parser::parse("CONTAINS(A) | (CONTAINS(B) & CONTAINS(C))").unwrap();
        assert_eq!(
            expr,
            or(contains("A"), and(contains("B"), contains("C")))
        );
    }

    #[test]
    fn test_not_binds_to_next_primary() {
        let expr = Parser::parse("!CONTAINS(A) & CONTAINS(B)").unwrap();
        assert_eq!(
            expr,
            and(CqlExpr::Not(Box::new(contains("A"))), contains("B"))
        );
        let expr = Parser::parse("!!CONTAINS(A)").unwrap();
        assert_eq!(
            expr,
            CqlExpr::Not(Box::new(CqlExpr::Not(Box::new(contains("A")))))
        );
    }

    #[test]
    fn test_display_roundtrips_through_parser() {
        let src = "CONTAINS(A) & !EXACT(B, C) | CONTAINS(D)";
        let expr = Parser::parse(src).unwrap();
        let rendered = expr.to_string();
        assert_eq!(rendered, "((CONTAINS(A) & !EXACT(B, C)) | CONTAINS(D))");
        assert_eq!(Parser::parse(&rendered).unwrap(), expr);
    }

    #[test]
    fn test_malformed_inputs() {
        for src in [
            "",
            "EXACT()",
            "EXACT(A,)",
            "CONTAINS(A",
            "CONTAINS(A) &",
            "CONTAINS(A) CONTAINS(B)",
            "Health",
            "(CONTAINS(A)",
        ] {
            assert!(Parser::parse(src).is_err(), "expected error for {src:?}");
        }
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |n: usize| format!("{}CONTAINS(A){}", "(".repeat(n), ")".repeat(n));
        assert_eq!(Parser::parse(&nested(MAX_DEPTH)).unwrap(), contains("A"));

        let err = Parser::parse(&nested(2000)).unwrap_err();
        assert_eq!(err.col, MAX_DEPTH + 1);
        assert_eq!(err.message, "expression nested deeper than 128 levels");

        let bangs = format!("{}CONTAINS(A)", "!".repeat(MAX_DEPTH + 1));
        assert!(Parser::parse(&bangs).is_err());
        // Depth is released on the way out, so siblings do not accumulate.
        let siblings = vec![nested(MAX_DEPTH); 4].join(" & ");
        assert!(Parser::parse(&siblings).is_ok());
    }

    #[test]
    fn test_error_column() {
        let err = Parser::parse("EXACT()").unwrap_err();
        assert_eq!(err.col, 7);
        assert_eq!(err.message, "expected component name, got )");
    }
}
