//! Parser for the filter expression language
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or_expr    := and_expr ("OR" and_expr)*
//! and_expr   := unary ("AND" unary)*
//! unary      := "NOT" unary | primary
//! primary    := "(" or_expr ")" | comparison
//! comparison := operand (cmp_op operand | "IN" "(" literal ("," literal)* ")")?
//! operand    := identifier | number | string
//! ```
//!
//! Keywords are case-insensitive. Strings use double or single quotes and
//! ISO dates inside strings become date literals.
//!
//! Mixing `AND` and `OR` at one parenthesis level is where authors most often
//! write something other than what they mean, so the parser reports it unless
//! the caller opts in to conventional precedence (see [`Precedence`]).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::filter::expr::{CmpOp, Expr, Operand};
use crate::models::Value;

/// How to treat `AND` and `OR` mixed without parentheses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precedence {
    /// Reject mixed `AND`/`OR` at the same level
    #[default]
    Explicit,
    /// Accept it, binding `NOT` tighter than `AND` and `AND` tighter than `OR`
    Conventional,
}

/// Errors raised while parsing an expression
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// A character that starts no token
    #[error("unexpected character '{found}' at position {position}")]
    UnexpectedChar {
        /// Byte offset
        position: usize,
        /// The character
        found: char,
    },

    /// A string literal without its closing quote
    #[error("unterminated string starting at position {position}")]
    UnterminatedString {
        /// Byte offset of the opening quote
        position: usize,
    },

    /// A malformed number
    #[error("invalid number '{text}' at position {position}")]
    InvalidNumber {
        /// Byte offset
        position: usize,
        /// The text that failed to parse
        text: String,
    },

    /// A token the grammar does not allow here
    #[error("unexpected {found} at position {position}, expected {expected}")]
    UnexpectedToken {
        /// Byte offset
        position: usize,
        /// Description of the token found
        found: String,
        /// What the parser wanted
        expected: &'static str,
    },

    /// Input ended early
    #[error("unexpected end of expression, expected {expected}")]
    UnexpectedEnd {
        /// What the parser wanted
        expected: &'static str,
    },

    /// The expression is empty
    #[error("empty expression")]
    Empty,

    /// `AND` and `OR` are mixed without parentheses
    #[error(
        "AND and OR are mixed without parentheses at position {position}; \
         add parentheses to make the grouping explicit"
    )]
    AmbiguousPrecedence {
        /// Byte offset of the first OR at the ambiguous level
        position: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Value),
    Cmp(CmpOp),
    And,
    Or,
    Not,
    In,
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::Literal(value) => format!("literal '{value}'"),
            Self::Cmp(_) => "comparison operator".to_string(),
            Self::And => "AND".to_string(),
            Self::Or => "OR".to_string(),
            Self::Not => "NOT".to_string(),
            Self::In => "IN".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::Comma => "','".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        match c {
            '(' | ')' | ',' => {
                chars.next();
                let token = match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    _ => Token::Comma,
                };
                tokens.push((pos, token));
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let next = chars.peek().map(|&(_, n)| n);
                let (op, two_chars) = match (c, next) {
                    ('=', Some('=')) => (CmpOp::Eq, true),
                    ('=', _) => (CmpOp::Eq, false),
                    ('!', Some('=')) | ('<', Some('>')) => (CmpOp::NotEq, true),
                    ('<', Some('=')) => (CmpOp::LtEq, true),
                    ('<', _) => (CmpOp::Lt, false),
                    ('>', Some('=')) => (CmpOp::GtEq, true),
                    ('>', _) => (CmpOp::Gt, false),
                    _ => return Err(ParseError::UnexpectedChar { position: pos, found: c }),
                };
                if two_chars {
                    chars.next();
                }
                tokens.push((pos, Token::Cmp(op)));
            }
            '"' | '\'' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                for (_, ch) in chars.by_ref() {
                    if ch == c {
                        closed = true;
                        break;
                    }
                    text.push(ch);
                }
                if !closed {
                    return Err(ParseError::UnterminatedString { position: pos });
                }
                let value = match NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
                    Ok(date) => Value::Date(date),
                    Err(_) => Value::Str(text),
                };
                tokens.push((pos, Token::Literal(value)));
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let mut text = String::new();
                text.push(c);
                chars.next();
                while let Some(&(_, n)) = chars.peek() {
                    if n.is_ascii_digit() || n == '.' {
                        text.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((pos, Token::Literal(parse_number(pos, &text)?)));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&(_, n)) = chars.peek() {
                    if n.is_alphanumeric() || n == '_' {
                        word.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = match word.to_ascii_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    "IN" => Token::In,
                    "TRUE" => Token::Literal(Value::Bool(true)),
                    "FALSE" => Token::Literal(Value::Bool(false)),
                    _ => Token::Ident(word),
                };
                tokens.push((pos, token));
            }
            other => {
                return Err(ParseError::UnexpectedChar {
                    position: pos,
                    found: other,
                });
            }
        }
    }

    Ok(tokens)
}

fn parse_number(position: usize, text: &str) -> Result<Value, ParseError> {
    let invalid = || ParseError::InvalidNumber {
        position,
        text: text.to_string(),
    };
    if text.contains('.') {
        text.parse::<f64>().map(Value::Float).map_err(|_| invalid())
    } else {
        text.parse::<i64>().map(Value::Int).map_err(|_| invalid())
    }
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    precedence: Precedence,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map_or(0, |(p, _)| *p)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        match self.tokens.get(self.pos) {
            Some((position, token)) => ParseError::UnexpectedToken {
                position: *position,
                found: token.describe(),
                expected,
            },
            None => ParseError::UnexpectedEnd { expected },
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let (first, mut mixed) = self.parse_and()?;
        let mut terms = vec![first];
        let mut first_or = None;

        while self.peek() == Some(&Token::Or) {
            first_or.get_or_insert(self.position());
            self.advance();
            let (term, conjunction) = self.parse_and()?;
            mixed |= conjunction;
            terms.push(term);
        }

        if terms.len() == 1 {
            return Ok(terms.remove(0));
        }

        if mixed && self.precedence == Precedence::Explicit {
            return Err(ParseError::AmbiguousPrecedence {
                position: first_or.unwrap_or(0),
            });
        }

        Ok(Expr::Or(terms))
    }

    /// Returns the conjunction and whether it joined more than one factor at this level
    fn parse_and(&mut self) -> Result<(Expr, bool), ParseError> {
        let mut factors = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::And) {
            self.advance();
            factors.push(self.parse_unary()?);
        }
        if factors.len() == 1 {
            Ok((factors.remove(0), false))
        } else {
            Ok((Expr::And(factors), true))
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        if self.peek() == Some(&Token::LParen) {
            self.advance();
            let inner = self.parse_or()?;
            self.expect(&Token::RParen, "')'")?;
            return Ok(inner);
        }
        self.parse_comparison()
    }

    fn expect(&mut self, token: &Token, expected: &'static str) -> Result<(), ParseError> {
        if self.peek() == Some(token) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(Operand::Var(name)),
            Some(Token::Literal(value)) => Ok(Operand::Literal(value)),
            Some(_) => {
                self.pos -= 1;
                Err(self.unexpected("a variable name or literal"))
            }
            None => Err(ParseError::UnexpectedEnd {
                expected: "a variable name or literal",
            }),
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_operand()?;

        match self.peek() {
            Some(Token::Cmp(op)) => {
                let op = *op;
                self.advance();
                let right = self.parse_operand()?;
                Ok(Expr::Compare { left, op, right })
            }
            Some(Token::In) => {
                self.advance();
                self.expect(&Token::LParen, "'(' after IN")?;
                let mut values = Vec::new();
                loop {
                    match self.advance() {
                        Some(Token::Literal(value)) => values.push(value),
                        Some(_) => {
                            self.pos -= 1;
                            return Err(self.unexpected("a literal in the IN list"));
                        }
                        None => {
                            return Err(ParseError::UnexpectedEnd {
                                expected: "a literal in the IN list",
                            });
                        }
                    }
                    match self.advance() {
                        Some(Token::Comma) => {}
                        Some(Token::RParen) => break,
                        Some(_) => {
                            self.pos -= 1;
                            return Err(self.unexpected("',' or ')'"));
                        }
                        None => return Err(ParseError::UnexpectedEnd { expected: "')'" }),
                    }
                }
                Ok(Expr::In(left, values))
            }
            _ => match left {
                Operand::Var(name) => Ok(Expr::Var(name)),
                Operand::Literal(Value::Bool(true)) => Ok(Expr::AlwaysTrue),
                Operand::Literal(Value::Bool(false)) => Ok(Expr::Not(Box::new(Expr::AlwaysTrue))),
                Operand::Literal(_) => Err(self.unexpected("a comparison after a literal")),
            },
        }
    }
}

/// Parse an expression string
pub fn parse_expression(input: &str, precedence: Precedence) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        precedence,
    };
    let expr = parser.parse_or()?;

    if parser.pos < parser.tokens.len() {
        return Err(parser.unexpected("end of expression"));
    }

    Ok(expr)
}
