//! Row-filter expressions
//!
//! A small boolean expression language used for permission filters:
//!
//! ```text
//! city == 'Paris' and (age >= 18 or role in ['admin', 'owner'])
//! not `country code` != "FR"
//! ```
//!
//! Supported syntax:
//! - comparisons: `==`, `!=`, `<`, `<=`, `>`, `>=`, `in`, `not in`
//! - boolean operators: `and`/`&`, `or`/`|`, `not`/`~`, parentheses
//! - literals: quoted strings, numbers, `true`/`false`, `null`/`None`, `[..]` lists
//! - identifiers: bare (`user.name` reads nested objects) or backticked

use crate::error::{Error, Result};
use crate::types::JsonObject;
use serde_json::{json, Number, Value};
use std::cmp::Ordering;

/// Deepest accepted expression tree: parentheses, `not` and chained `and`/`or`
const MAX_DEPTH: usize = 512;

// ============================================================================
// AST
// ============================================================================

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl CmpOp {
    /// Operator with its operands swapped
    fn flipped(self) -> Self {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
            other => other,
        }
    }

    fn mongo(self) -> &'static str {
        match self {
            CmpOp::Eq => "$eq",
            CmpOp::Ne => "$ne",
            CmpOp::Lt => "$lt",
            CmpOp::Le => "$lte",
            CmpOp::Gt => "$gt",
            CmpOp::Ge => "$gte",
            CmpOp::In => "$in",
            CmpOp::NotIn => "$nin",
        }
    }
}

/// Comparison operand
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Column reference
    Column(String),
    /// Scalar literal
    Literal(Value),
    /// List literal (right-hand side of `in`)
    List(Vec<Value>),
}

impl Operand {
    fn resolve(&self, row: &JsonObject) -> Value {
        match self {
            Operand::Column(name) => lookup(row, name).cloned().unwrap_or(Value::Null),
            Operand::Literal(value) => value.clone(),
            Operand::List(items) => Value::Array(items.clone()),
        }
    }
}

/// Parsed filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare {
        left: Operand,
        op: CmpOp,
        right: Operand,
    },
    /// Bare operand used as a condition
    Truthy(Operand),
}

impl Expr {
    /// Parse an expression
    pub fn parse(expression: &str) -> Result<Expr> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser {
            source: expression,
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(parser.error(format!("unexpected token {token:?}")));
        }
        Ok(expr)
    }

    /// Evaluate against a single row; missing columns read as null
    pub fn evaluate(&self, row: &JsonObject) -> bool {
        match self {
            Expr::And(l, r) => l.evaluate(row) && r.evaluate(row),
            Expr::Or(l, r) => l.evaluate(row) || r.evaluate(row),
            Expr::Not(inner) => !inner.evaluate(row),
            Expr::Compare { left, op, right } => {
                compare(&left.resolve(row), *op, &right.resolve(row))
            }
            Expr::Truthy(operand) => truthy(&operand.resolve(row)),
        }
    }

    /// Translate into a MongoDB `$match` condition
    pub fn to_mongo(&self) -> Result<Value> {
        Ok(match self {
            Expr::And(l, r) => json!({"$and": [l.to_mongo()?, r.to_mongo()?]}),
            Expr::Or(l, r) => json!({"$or": [l.to_mongo()?, r.to_mongo()?]}),
            Expr::Not(inner) => json!({"$nor": [inner.to_mongo()?]}),
            Expr::Truthy(Operand::Column(name)) => json!({ name.as_str(): {"$eq": true} }),
            Expr::Truthy(other) => {
                json!({"$expr": truthy(&other.resolve(&JsonObject::new()))})
            }
            Expr::Compare { left, op, right } => compare_to_mongo(left, *op, right)?,
        })
    }
}

fn compare_to_mongo(left: &Operand, op: CmpOp, right: &Operand) -> Result<Value> {
    let unsupported = |what: &str| {
        Err(Error::filter(
            format!("{left:?} {op:?} {right:?}"),
            format!("{what} cannot be translated to a MongoDB condition"),
        ))
    };

    match (left, right) {
        (Operand::Column(name), Operand::Literal(_) | Operand::List(_)) => {
            let value = value_of(right);
            if matches!(op, CmpOp::In | CmpOp::NotIn) && !value.is_array() {
                return unsupported("membership in a scalar");
            }
            Ok(json!({ name.as_str(): { op.mongo(): value } }))
        }
        (Operand::Literal(_), Operand::Column(_)) => {
            if matches!(op, CmpOp::In | CmpOp::NotIn) {
                return unsupported("membership in a column");
            }
            compare_to_mongo(right, op.flipped(), left)
        }
        (Operand::Column(a), Operand::Column(b)) => {
            if matches!(op, CmpOp::In | CmpOp::NotIn) {
                return unsupported("membership in a column");
            }
            Ok(json!({"$expr": { op.mongo(): [format!("${a}"), format!("${b}")] }}))
        }
        _ => {
            let row = JsonObject::new();
            Ok(json!({"$expr": compare(&left.resolve(&row), op, &right.resolve(&row))}))
        }
    }
}

fn value_of(operand: &Operand) -> Value {
    operand.resolve(&JsonObject::new())
}

// ============================================================================
// Evaluation
// ============================================================================

/// Exact key first, then a dotted path into nested objects
fn lookup<'a>(row: &'a JsonObject, name: &str) -> Option<&'a Value> {
    if let Some(value) = row.get(name) {
        return Some(value);
    }
    let mut parts = name.split('.');
    let mut current = row.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare(left: &Value, op: CmpOp, right: &Value) -> bool {
    match op {
        CmpOp::Eq => values_equal(left, right),
        CmpOp::Ne => !values_equal(left, right),
        CmpOp::Lt => ordering(left, right) == Some(Ordering::Less),
        CmpOp::Le => matches!(ordering(left, right), Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Gt => ordering(left, right) == Some(Ordering::Greater),
        CmpOp::Ge => matches!(
            ordering(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CmpOp::In => right
            .as_array()
            .is_some_and(|items| items.iter().any(|item| values_equal(left, item))),
        CmpOp::NotIn => !compare(left, CmpOp::In, right),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(Number),
    Bool(bool),
    Null,
    Cmp(CmpOp),
    And,
    Or,
    Not,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl Token {
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            Token::Ident(_)
                | Token::Str(_)
                | Token::Num(_)
                | Token::Bool(_)
                | Token::Null
                | Token::RParen
                | Token::RBracket
        )
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let err = |message: String| Error::filter(source, message);
    let chars: Vec<char> = source.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Cmp(CmpOp::Eq));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Cmp(CmpOp::Ne));
                i += 2;
            }
            '<' | '>' => {
                let inclusive = next == Some('=');
                tokens.push(Token::Cmp(match (c, inclusive) {
                    ('<', false) => CmpOp::Lt,
                    ('<', true) => CmpOp::Le,
                    ('>', false) => CmpOp::Gt,
                    _ => CmpOp::Ge,
                }));
                i += if inclusive { 2 } else { 1 };
            }
            '&' | '|' => {
                tokens.push(if c == '&' { Token::And } else { Token::Or });
                i += if next == Some(c) { 2 } else { 1 };
            }
            '~' | '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '\'' | '"' => {
                let (text, end) = read_quoted(&chars, i, c)
                    .ok_or_else(|| err(format!("unterminated string at offset {i}")))?;
                tokens.push(Token::Str(text));
                i = end;
            }
            '`' => {
                let (text, end) = read_quoted(&chars, i, '`')
                    .ok_or_else(|| err(format!("unterminated identifier at offset {i}")))?;
                tokens.push(Token::Ident(text));
                i = end;
            }
            c if c.is_ascii_digit()
                || (c == '-'
                    && next.is_some_and(|n| n.is_ascii_digit() || n == '.')
                    && !tokens.last().is_some_and(Token::ends_operand)) =>
            {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || matches!(chars[i], '.' | 'e' | 'E')
                        || (matches!(chars[i], '+' | '-') && matches!(chars[i - 1], 'e' | 'E')))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Num(parse_number(&text).ok_or_else(|| {
                    err(format!("invalid number {text:?}"))
                })?));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '.'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" | "True" => Token::Bool(true),
                    "false" | "False" => Token::Bool(false),
                    "null" | "None" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(err(format!("unexpected character {other:?} at offset {i}"))),
        }
    }

    Ok(tokens)
}

/// Read a quoted run starting at `start`; returns the text and the index after
/// the closing quote. Backslash escapes the next character.
fn read_quoted(chars: &[char], start: usize, quote: char) -> Option<(String, usize)> {
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                text.push(chars[i + 1]);
                i += 2;
            }
            c if c == quote => return Some((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    None
}

fn parse_number(text: &str) -> Option<Number> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::from(i));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> Error {
        Error::filter(self.source, message)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.advance() {
            Some(ref token) if token == expected => Ok(()),
            Some(token) => Err(self.error(format!("expected {expected:?}, found {token:?}"))),
            None => Err(self.error(format!("expected {expected:?}, found end of input"))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let entry = self.depth;
        let result = self.parse_or_chain();
        self.depth = entry;
        result
    }

    fn parse_or_chain(&mut self) -> Result<Expr> {
        let mut expr = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            self.deepen()?;
            expr = Expr::Or(Box::new(expr), Box::new(self.parse_and()?));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let entry = self.depth;
        let result = self.parse_and_chain();
        self.depth = entry;
        result
    }

    fn parse_and_chain(&mut self) -> Result<Expr> {
        let mut expr = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            self.deepen()?;
            expr = Expr::And(Box::new(expr), Box::new(self.parse_not()?));
        }
        Ok(expr)
    }

    /// Each chained operand adds one level to the left-deep tree
    fn deepen(&mut self) -> Result<()> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    /// Run `parse` one nesting level deeper
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let entry = self.depth;
        self.deepen()?;
        let result = parse(self);
        self.depth = entry;
        result
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let expr = self.nested(Self::parse_or)?;
            self.expect(&Token::RParen)?;
            return Ok(expr);
        }

        let left = self.parse_operand()?;
        let op = match self.peek() {
            Some(Token::Cmp(op)) => {
                let op = *op;
                self.pos += 1;
                op
            }
            Some(Token::In) => {
                self.pos += 1;
                CmpOp::In
            }
            Some(Token::Not) if self.peek_at(1) == Some(&Token::In) => {
                self.pos += 2;
                CmpOp::NotIn
            }
            _ => return Ok(Expr::Truthy(left)),
        };
        let right = self.parse_operand()?;
        Ok(Expr::Compare { left, op, right })
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(Operand::Column(name)),
            Some(Token::Str(s)) => Ok(Operand::Literal(Value::String(s))),
            Some(Token::Num(n)) => Ok(Operand::Literal(Value::Number(n))),
            Some(Token::Bool(b)) => Ok(Operand::Literal(Value::Bool(b))),
            Some(Token::Null) => Ok(Operand::Literal(Value::Null)),
            Some(Token::LBracket) => self.parse_list(),
            Some(token) => Err(self.error(format!("expected an operand, found {token:?}"))),
            None => Err(self.error("expected an operand, found end of input")),
        }
    }

    fn parse_list(&mut self) -> Result<Operand> {
        let mut items = Vec::new();
        if self.peek() == Some(&Token::RBracket) {
            self.pos += 1;
            return Ok(Operand::List(items));
        }
        loop {
            match self.parse_operand()? {
                Operand::Literal(value) => items.push(value),
                other => {
                    return Err(self.error(format!("lists may only hold literals, found {other:?}")))
                }
            }
            match self.advance() {
                Some(Token::Comma) => {}
                Some(Token::RBracket) => return Ok(Operand::List(items)),
                Some(token) => {
                    return Err(self.error(format!("expected ',' or ']', found {token:?}")))
                }
                None => return Err(self.error("unterminated list")),
            }
        }
    }
}
