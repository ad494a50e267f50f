//! Boolean clause parser.
//!
//! Recursive descent parser for author-written clauses such as
//! `a and not (b or c)`. Grammar:
//!
//! ```text
//! expr    := primary ( ('and' primary)+ | ('or' primary)+ )?
//! primary := IDENTIFIER | 'not' primary | '(' expr ')'
//! ```
//!
//! Mixing `and` with `or` at one nesting level is rejected; parentheses are
//! required to disambiguate. Keywords and identifiers are case-insensitive and
//! every identifier must name a declared condition. Nesting through `not` and
//! parentheses is capped at [`MAX_NESTING`].

use crate::domain::bool_expr::{BoolExpr, ConditionRef};
use crate::domain::error::ParseError;
use std::collections::HashMap;
use std::fmt;

pub const KEYWORDS: [&str; 3] = ["and", "or", "not"];

/// Deepest chain of `not` / `(` a clause may open. Each level adds at most two
/// levels to a stored prediction body, which must stay under serde_json's
/// recursion limit of 128.
pub const MAX_NESTING: usize = 32;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(name) => write!(f, "'{}'", name),
            Token::And => f.write_str("'and'"),
            Token::Or => f.write_str("'or'"),
            Token::Not => f.write_str("'not'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Eof => f.write_str("end of input"),
        }
    }
}

struct Lexeme {
    token: Token,
    start: usize,
    end: usize,
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
    declared: &'a HashMap<String, ConditionRef>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, declared: &'a HashMap<String, ConditionRef>) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
            declared,
        }
    }

    fn lex_at(&self, mut pos: usize) -> Result<Lexeme, ParseError> {
        let bytes = self.input.as_bytes();
        while pos < bytes.len() && (bytes[pos] as char).is_ascii_whitespace() {
            pos += 1;
        }
        let start = pos;
        let Some(ch) = self.input[pos..].chars().next() else {
            return Ok(Lexeme {
                token: Token::Eof,
                start,
                end: start,
            });
        };
        match ch {
            '(' => Ok(Lexeme {
                token: Token::LParen,
                start,
                end: start + 1,
            }),
            ')' => Ok(Lexeme {
                token: Token::RParen,
                start,
                end: start + 1,
            }),
            c if is_ident_char(c) => {
                let len: usize = self.input[start..]
                    .chars()
                    .take_while(|c| is_ident_char(*c))
                    .map(char::len_utf8)
                    .sum();
                let word = self.input[start..start + len].to_lowercase();
                let token = match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Identifier(word),
                };
                Ok(Lexeme {
                    token,
                    start,
                    end: start + len,
                })
            }
            other => Err(ParseError {
                message: format!("unexpected character '{}'", other),
                position: start,
            }),
        }
    }

    fn peek(&self) -> Result<Lexeme, ParseError> {
        self.lex_at(self.pos)
    }

    fn advance(&mut self) -> Result<Lexeme, ParseError> {
        let lexeme = self.lex_at(self.pos)?;
        self.pos = lexeme.end;
        Ok(lexeme)
    }

    fn parse_expr(&mut self) -> Result<BoolExpr, ParseError> {
        let first = self.parse_primary()?;
        let next = self.peek()?;
        match next.token {
            Token::And => self.parse_chain(first, Token::And),
            Token::Or => self.parse_chain(first, Token::Or),
            _ => Ok(first),
        }
    }

    fn parse_chain(&mut self, first: BoolExpr, joiner: Token) -> Result<BoolExpr, ParseError> {
        let mut children = vec![first];
        loop {
            let next = self.peek()?;
            if next.token == joiner {
                self.advance()?;
                children.push(self.parse_primary()?);
            } else if matches!(next.token, Token::And | Token::Or) {
                return Err(ParseError {
                    message: "cannot mix 'and' and 'or' without parentheses".to_string(),
                    position: next.start,
                });
            } else {
                break;
            }
        }
        Ok(match joiner {
            Token::And => BoolExpr::And(children),
            _ => BoolExpr::Or(children),
        })
    }

    fn parse_primary(&mut self) -> Result<BoolExpr, ParseError> {
        if self.depth == MAX_NESTING {
            return Err(ParseError {
                message: "expression nested too deeply".to_string(),
                position: self.peek()?.start,
            });
        }
        self.depth += 1;
        let result = self.parse_atom();
        self.depth -= 1;
        result
    }

    fn parse_atom(&mut self) -> Result<BoolExpr, ParseError> {
        let lexeme = self.advance()?;
        match lexeme.token {
            Token::Identifier(name) => match self.declared.get(&name) {
                Some(r) => Ok(BoolExpr::Literal(*r)),
                None => Err(ParseError {
                    message: format!("undeclared identifier '{}'", name),
                    position: lexeme.start,
                }),
            },
            Token::Not => Ok(BoolExpr::Not(Box::new(self.parse_primary()?))),
            Token::LParen => {
                let inner = self.parse_expr()?;
                let close = self.advance()?;
                if close.token != Token::RParen {
                    return Err(ParseError {
                        message: format!("expected ')', found {}", close.token),
                        position: close.start,
                    });
                }
                Ok(inner)
            }
            other => Err(ParseError {
                message: format!("expected identifier, 'not' or '(', found {}", other),
                position: lexeme.start,
            }),
        }
    }

    fn parse(&mut self) -> Result<BoolExpr, ParseError> {
        let expr = self.parse_expr()?;
        let rest = self.peek()?;
        if rest.token != Token::Eof {
            return Err(ParseError {
                message: format!("unexpected input {}", rest.token),
                position: rest.start,
            });
        }
        Ok(expr)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Parses a clause against the declared condition names (lower-cased keys).
pub fn parse(
    input: &str,
    declared: &HashMap<String, ConditionRef>,
) -> Result<BoolExpr, ParseError> {
    Parser::new(input, declared).parse()
}

/// Whether `name` is usable as a condition identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(is_ident_char)
        && !KEYWORDS.contains(&name.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared() -> HashMap<String, ConditionRef> {
        ["a", "b", "c", "main"]
            .iter()
            .enumerate()
            .map(|(i, n)| (n.to_string(), ConditionRef(i)))
            .collect()
    }

    fn p(input: &str) -> Result<BoolExpr, ParseError> {
        parse(input, &declared())
    }

    #[test]
    fn parse_identifier() {
        assert_eq!(p("main").unwrap(), BoolExpr::literal(3));
    }

    #[test]
    fn identifiers_are_case_insensitive() {
        assert_eq!(p("MaIn").unwrap(), BoolExpr::literal(3));
    }

    #[test]
    fn parse_and_chain() {
        assert_eq!(
            p("a and b and c").unwrap(),
            BoolExpr::And(vec![
                BoolExpr::literal(0),
                BoolExpr::literal(1),
                BoolExpr::literal(2),
            ])
        );
    }

    #[test]
    fn parse_or_chain_uppercase_keywords() {
        assert_eq!(
            p("a OR b").unwrap(),
            BoolExpr::Or(vec![BoolExpr::literal(0), BoolExpr::literal(1)])
        );
    }

    #[test]
    fn parse_not_binds_to_primary() {
        assert_eq!(
            p("not a and b").unwrap(),
            BoolExpr::And(vec![
                BoolExpr::Not(Box::new(BoolExpr::literal(0))),
                BoolExpr::literal(1),
            ])
        );
    }

    #[test]
    fn parse_not_group() {
        assert_eq!(
            p("not (a or b)").unwrap(),
            BoolExpr::Not(Box::new(BoolExpr::Or(vec![
                BoolExpr::literal(0),
                BoolExpr::literal(1),
            ])))
        );
    }

    #[test]
    fn parse_double_not() {
        assert_eq!(
            p("not not a").unwrap(),
            BoolExpr::Not(Box::new(BoolExpr::Not(Box::new(BoolExpr::literal(0)))))
        );
    }

    #[test]
    fn parse_nested_parentheses() {
        assert_eq!(
            p("((a and b) or c)").unwrap(),
            BoolExpr::Or(vec![
                BoolExpr::And(vec![BoolExpr::literal(0), BoolExpr::literal(1)]),
                BoolExpr::literal(2),
            ])
        );
    }

    #[test]
    fn whitespace_handling() {
        assert_eq!(p("  (  a   and\tb )  ").unwrap(), p("(a and b)").unwrap());
    }

    #[test]
    fn error_mixed_and_or() {
        let err = p("a and b or c").unwrap_err();
        assert!(err.message.contains("cannot mix"));
        assert_eq!(err.position, 8);
    }

    #[test]
    fn error_undeclared_identifier() {
        let err = p("a and zzz").unwrap_err();
        assert!(err.message.contains("undeclared identifier 'zzz'"));
        assert_eq!(err.position, 6);
    }

    #[test]
    fn error_missing_paren() {
        let err = p("(a and b").unwrap_err();
        assert!(err.message.contains("expected ')'"));
    }

    #[test]
    fn error_trailing_input() {
        let err = p("a b").unwrap_err();
        assert!(err.message.contains("unexpected input"));
        assert_eq!(err.position, 2);
    }

    #[test]
    fn error_dangling_operator() {
        let err = p("a and").unwrap_err();
        assert!(err.message.contains("found end of input"));
    }

    #[test]
    fn error_empty_input() {
        let err = p("   ").unwrap_err();
        assert!(err.message.contains("expected identifier"));
    }

    #[test]
    fn error_unexpected_character() {
        let err = p("a & b").unwrap_err();
        assert!(err.message.contains("unexpected character '&'"));
        assert_eq!(err.position, 2);
    }

    #[test]
    fn error_display_with_context() {
        let input = "a and nope";
        let err = p(input).unwrap_err();
        let ctx = err.display_with_context(input);
        assert!(ctx.contains("      ^"));
    }

    fn nested_chain(levels: usize) -> String {
        format!("{}b{}", "a and (".repeat(levels), ")".repeat(levels))
    }

    #[test]
    fn nesting_up_to_limit_is_accepted() {
        let nots = format!("{}a", "not ".repeat(MAX_NESTING - 1));
        assert!(p(&nots).is_ok());
        assert!(p(&nested_chain(MAX_NESTING - 1)).is_ok());
    }

    #[test]
    fn error_nested_too_deeply() {
        let nots = format!("{}a", "not ".repeat(MAX_NESTING));
        let err = p(&nots).unwrap_err();
        assert_eq!(err.message, "expression nested too deeply");
        assert_eq!(err.position, MAX_NESTING * 4);

        let err = p(&nested_chain(MAX_NESTING)).unwrap_err();
        assert_eq!(err.message, "expression nested too deeply");

        let parens = format!("{}a{}", "(".repeat(1000), ")".repeat(1000));
        assert!(p(&parens).is_err());
    }

    #[test]
    fn huge_not_chain_fails_without_recursing() {
        let input = format!("{}a", "not ".repeat(200_000));
        let err = p(&input).unwrap_err();
        assert!(err.message.contains("nested too deeply"));
    }

    #[test]
    fn deepest_clause_survives_json_round_trip() {
        let expr = p(&nested_chain(MAX_NESTING - 1)).unwrap();
        let json = serde_json::to_string(&expr).unwrap();
        let back: BoolExpr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, expr);
    }

    #[test]
    fn identifier_validation() {
        assert!(is_valid_identifier("btc_60k"));
        assert!(!is_valid_identifier("AND"));
        assert!(!is_valid_identifier("has space"));
        assert!(!is_valid_identifier(""));
    }
}
