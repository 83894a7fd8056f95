//! Activity guard conditions.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or   := and ("or" and)*
//! and  := not ("and" not)*
//! not  := "!" not | atom
//! atom := "true" | "false" | name | "(" or ")"
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tessera_value::OrderedMap;

use crate::error::{Result, WfeError};

/// A boolean expression over dataflow variable names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Condition {
    Literal(bool),
    Var(String),
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    pub fn parse(text: &str) -> Result<Condition> {
        let tokens = tokenize(text)?;
        let mut parser = Parser {
            text,
            tokens,
            pos: 0,
        };
        let cond = parser.or()?;
        match parser.peek() {
            None => Ok(cond),
            Some(tok) => Err(parser.error(format!("unexpected '{tok}'"))),
        }
    }

    /// Conjunction of two conditions.
    pub fn and(a: Condition, b: Condition) -> Condition {
        Condition::And(Box::new(a), Box::new(b))
    }

    /// Evaluate against the dataflow. A variable holds when it is present
    /// and truthy.
    pub fn evaluate(&self, dataflow: &OrderedMap) -> bool {
        match self {
            Condition::Literal(b) => *b,
            Condition::Var(name) => dataflow.get(name).is_some_and(|v| v.is_truthy()),
            Condition::Not(inner) => !inner.evaluate(dataflow),
            Condition::And(a, b) => a.evaluate(dataflow) && b.evaluate(dataflow),
            Condition::Or(a, b) => a.evaluate(dataflow) || b.evaluate(dataflow),
        }
    }

    /// Variable names referenced, in first-seen order.
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Literal(_) => {}
            Condition::Var(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Condition::Not(inner) => inner.collect_names(out),
            Condition::And(a, b) | Condition::Or(a, b) => {
                a.collect_names(out);
                b.collect_names(out);
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Condition::Or(..) => 1,
            Condition::And(..) => 2,
            Condition::Not(_) => 3,
            Condition::Literal(_) | Condition::Var(_) => 4,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Literal(b) => write!(f, "{b}"),
            Condition::Var(name) => f.write_str(name),
            Condition::Not(inner) => {
                f.write_str("!")?;
                inner.fmt_operand(f, 3)
            }
            Condition::And(a, b) => {
                a.fmt_operand(f, 2)?;
                f.write_str(" and ")?;
                b.fmt_operand(f, 3)
            }
            Condition::Or(a, b) => {
                a.fmt_operand(f, 1)?;
                f.write_str(" or ")?;
                b.fmt_operand(f, 2)
            }
        }
    }
}

impl FromStr for Condition {
    type Err = WfeError;

    fn from_str(s: &str) -> Result<Self> {
        Condition::parse(s)
    }
}

impl TryFrom<String> for Condition {
    type Error = WfeError;

    fn try_from(s: String) -> Result<Self> {
        Condition::parse(&s)
    }
}

impl From<Condition> for String {
    fn from(c: Condition) -> Self {
        c.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Bang,
    Open,
    Close,
    Word(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Bang => f.write_str("!"),
            Token::Open => f.write_str("("),
            Token::Close => f.write_str(")"),
            Token::Word(w) => f.write_str(w),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.')
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '!' => {
                chars.next();
                tokens.push(Token::Bang);
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            c if is_name_char(c) => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if !is_name_char(c) {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Word(text[start..end].to_string()));
            }
            other => {
                return Err(WfeError::InvalidCondition {
                    text: text.to_string(),
                    reason: format!("unexpected character '{other}'"),
                });
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w == keyword)
    }

    fn error(&self, reason: impl Into<String>) -> WfeError {
        WfeError::InvalidCondition {
            text: self.text.to_string(),
            reason: reason.into(),
        }
    }

    fn or(&mut self) -> Result<Condition> {
        let mut left = self.and()?;
        while self.at_keyword("or") {
            self.pos += 1;
            let right = self.and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Condition> {
        let mut left = self.not()?;
        while self.at_keyword("and") {
            self.pos += 1;
            let right = self.not()?;
            left = Condition::and(left, right);
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Condition> {
        if self.peek() == Some(&Token::Bang) {
            self.pos += 1;
            return Ok(Condition::Not(Box::new(self.not()?)));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Condition> {
        match self.next() {
            Some(Token::Open) => {
                let inner = self.or()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(self.error("missing ')'")),
                }
            }
            Some(Token::Word(w)) => match w.as_str() {
                "true" => Ok(Condition::Literal(true)),
                "false" => Ok(Condition::Literal(false)),
                "and" | "or" => Err(self.error(format!("unexpected '{w}'"))),
                _ => Ok(Condition::Var(w)),
            },
            Some(tok) => Err(self.error(format!("unexpected '{tok}'"))),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}
