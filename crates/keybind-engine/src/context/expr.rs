//! When-clause expressions.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or      := and ('||' and)*
//! and     := unary ('&&' unary)*
//! unary   := '!' unary | primary
//! primary := '(' or ')' | 'true' | 'false' | key [op rhs]
//! op      := '==' | '!=' | '<' | '<=' | '>' | '>=' | '=~' /re/flags | 'in' | 'not in'
//! ```
//!
//! Values follow the usual when-clause conventions: a bare key is true when
//! its value is truthy, `==` uses loose equality, comparisons are numeric.

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Error parsing a when-clause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    /// Input ended where more was expected
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    /// A token that cannot appear here
    #[error("unexpected '{found}' at offset {position}")]
    UnexpectedToken { found: String, position: usize },
    /// A character that starts no token (e.g. a lone `&`)
    #[error("unexpected character '{ch}' at offset {position}")]
    UnexpectedChar { ch: char, position: usize },
    /// Quoted string without closing quote
    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),
    /// Regex literal without closing slash
    #[error("unterminated regular expression starting at offset {0}")]
    UnterminatedRegex(usize),
    /// Regex literal that does not compile
    #[error("invalid regular expression /{pattern}/: {message}")]
    InvalidRegex { pattern: String, message: String },
    /// Right-hand side of a comparison is not a number
    #[error("expected a number, found '{0}'")]
    InvalidNumber(String),
}

/// Read access to context values for evaluation.
pub trait ContextValues {
    fn get_value(&self, key: &str) -> Option<Value>;
}

impl ContextValues for std::collections::HashMap<String, Value> {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }
}

impl ContextValues for std::collections::BTreeMap<String, Value> {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }
}

/// Literal on the right of `==`/`!=`.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    Bool(bool),
    Str(String),
}

impl fmt::Display for ExprValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Str(s) => write_word(f, s),
        }
    }
}

/// Compiled regex literal. Compares by source text and flags.
#[derive(Debug, Clone)]
pub struct ExprRegex {
    pub source: String,
    pub flags: String,
    regex: Regex,
}

impl ExprRegex {
    /// Compile `/source/flags`. Flags `i`, `m` and `s` are honored; `g`,
    /// `u` and `y` are accepted and ignored.
    pub fn new(source: &str, flags: &str) -> Result<Self, ExprError> {
        let inline: String = flags.chars().filter(|c| matches!(c, 'i' | 'm' | 's')).collect();
        let pattern = if inline.is_empty() {
            source.to_string()
        } else {
            format!("(?{}){}", inline, source)
        };
        let regex = Regex::new(&pattern).map_err(|e| ExprError::InvalidRegex {
            pattern: source.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            flags: flags.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for ExprRegex {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.flags == other.flags
    }
}

/// Parsed when-clause.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextKeyExpr {
    True,
    False,
    /// `key`: value is truthy.
    Defined(String),
    Not(Box<ContextKeyExpr>),
    Equals(String, ExprValue),
    NotEquals(String, ExprValue),
    Greater(String, f64),
    GreaterEquals(String, f64),
    Smaller(String, f64),
    SmallerEquals(String, f64),
    Regex(String, ExprRegex),
    /// `key in source`: the value of `key` is an element (or object key) of the value of `source`.
    In(String, String),
    NotIn(String, String),
    And(Vec<ContextKeyExpr>),
    Or(Vec<ContextKeyExpr>),
}

impl ContextKeyExpr {
    /// Parse when-clause text. Blank text yields `None`.
    pub fn parse(text: &str) -> Result<Option<Self>, ExprError> {
        let tokens = lex(text)?;
        if tokens.is_empty() {
            return Ok(None);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some((position, token)) = parser.tokens.get(parser.pos) {
            return Err(ExprError::UnexpectedToken {
                found: token.to_string(),
                position: *position,
            });
        }
        Ok(Some(expr))
    }

    /// Evaluate against `ctx`.
    pub fn evaluate(&self, ctx: &dyn ContextValues) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::Defined(key) => ctx.get_value(key).as_ref().is_some_and(is_truthy),
            Self::Not(inner) => !inner.evaluate(ctx),
            Self::Equals(key, value) => loose_eq(ctx.get_value(key).as_ref(), value),
            Self::NotEquals(key, value) => !loose_eq(ctx.get_value(key).as_ref(), value),
            Self::Greater(key, n) => to_number(ctx.get_value(key).as_ref()) > *n,
            Self::GreaterEquals(key, n) => to_number(ctx.get_value(key).as_ref()) >= *n,
            Self::Smaller(key, n) => to_number(ctx.get_value(key).as_ref()) < *n,
            Self::SmallerEquals(key, n) => to_number(ctx.get_value(key).as_ref()) <= *n,
            Self::Regex(key, regex) => match ctx.get_value(key) {
                Some(Value::String(s)) => regex.is_match(&s),
                Some(Value::Number(n)) => regex.is_match(&n.to_string()),
                Some(Value::Bool(b)) => regex.is_match(&b.to_string()),
                _ => false,
            },
            Self::In(key, source) => evaluate_in(ctx, key, source),
            Self::NotIn(key, source) => !evaluate_in(ctx, key, source),
            Self::And(items) => items.iter().all(|e| e.evaluate(ctx)),
            Self::Or(items) => items.iter().any(|e| e.evaluate(ctx)),
        }
    }

    /// Every context key the expression reads.
    pub fn keys(&self) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys(&self, keys: &mut BTreeSet<String>) {
        match self {
            Self::True | Self::False => {}
            Self::Defined(key)
            | Self::Equals(key, _)
            | Self::NotEquals(key, _)
            | Self::Greater(key, _)
            | Self::GreaterEquals(key, _)
            | Self::Smaller(key, _)
            | Self::SmallerEquals(key, _)
            | Self::Regex(key, _) => {
                keys.insert(key.clone());
            }
            Self::In(key, source) | Self::NotIn(key, source) => {
                keys.insert(key.clone());
                keys.insert(source.clone());
            }
            Self::Not(inner) => inner.collect_keys(keys),
            Self::And(items) | Self::Or(items) => {
                for item in items {
                    item.collect_keys(keys);
                }
            }
        }
    }
}

impl fmt::Display for ContextKeyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
            Self::Defined(key) => write!(f, "{}", key),
            Self::Not(inner) => match inner.as_ref() {
                Self::Defined(_) | Self::Not(_) | Self::True | Self::False => write!(f, "!{}", inner),
                _ => write!(f, "!({})", inner),
            },
            Self::Equals(key, value) => write!(f, "{} == {}", key, value),
            Self::NotEquals(key, value) => write!(f, "{} != {}", key, value),
            Self::Greater(key, n) => write!(f, "{} > {}", key, n),
            Self::GreaterEquals(key, n) => write!(f, "{} >= {}", key, n),
            Self::Smaller(key, n) => write!(f, "{} < {}", key, n),
            Self::SmallerEquals(key, n) => write!(f, "{} <= {}", key, n),
            Self::Regex(key, regex) => write!(f, "{} =~ /{}/{}", key, regex.source, regex.flags),
            Self::In(key, source) => write!(f, "{} in {}", key, source),
            Self::NotIn(key, source) => write!(f, "{} not in {}", key, source),
            Self::And(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|e| match e {
                        Self::Or(_) => format!("({})", e),
                        _ => e.to_string(),
                    })
                    .collect();
                write!(f, "{}", parts.join(" && "))
            }
            Self::Or(items) => {
                let parts: Vec<String> = items.iter().map(|e| e.to_string()).collect();
                write!(f, "{}", parts.join(" || "))
            }
        }
    }
}

/// JS-style truthiness.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        0.0
    } else {
        s.parse().unwrap_or(f64::NAN)
    }
}

fn to_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn loose_eq(value: Option<&Value>, literal: &ExprValue) -> bool {
    let bool_num = |b: bool| if b { 1.0 } else { 0.0 };
    match (value, literal) {
        (Some(Value::String(a)), ExprValue::Str(b)) => a == b,
        (Some(Value::Bool(a)), ExprValue::Bool(b)) => a == b,
        (Some(Value::Number(n)), ExprValue::Str(s)) => n.as_f64() == Some(string_to_number(s)),
        (Some(Value::Number(n)), ExprValue::Bool(b)) => n.as_f64() == Some(bool_num(*b)),
        (Some(Value::Bool(a)), ExprValue::Str(s)) => bool_num(*a) == string_to_number(s),
        (Some(Value::String(a)), ExprValue::Bool(b)) => string_to_number(a) == bool_num(*b),
        _ => false,
    }
}

fn evaluate_in(ctx: &dyn ContextValues, key: &str, source: &str) -> bool {
    let item = ctx.get_value(key);
    match (ctx.get_value(source), item) {
        (Some(Value::Array(list)), Some(item)) => list.contains(&item),
        (Some(Value::Object(map)), Some(Value::String(item))) => map.contains_key(&item),
        _ => false,
    }
}

const WORD_STOP: &[char] = &['(', ')', '!', '&', '|', '=', '<', '>', '\'', '"'];

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !WORD_STOP.contains(&c)
}

fn write_word(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    let bare = !s.is_empty() && s.chars().all(is_word_char) && s != "true" && s != "false";
    if bare {
        write!(f, "{}", s)
    } else if s.contains('\'') {
        write!(f, "\"{}\"", s)
    } else {
        write!(f, "'{}'", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Bang,
    AndAnd,
    OrOr,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Tilde,
    Regex { source: String, flags: String },
    Str(String),
    Word(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
            Self::Bang => write!(f, "!"),
            Self::AndAnd => write!(f, "&&"),
            Self::OrOr => write!(f, "||"),
            Self::EqEq => write!(f, "=="),
            Self::NotEq => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::Le => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::Ge => write!(f, ">="),
            Self::Tilde => write!(f, "=~"),
            Self::Regex { source, flags } => write!(f, "/{}/{}", source, flags),
            Self::Str(s) => write!(f, "'{}'", s),
            Self::Word(w) => write!(f, "{}", w),
        }
    }
}

fn lex(text: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let peek = |i: usize| chars.get(i).map(|(_, c)| *c);

    while i < chars.len() {
        let (start, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let token = match c {
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '!' if peek(i + 1) == Some('=') => {
                i += 2;
                if peek(i) == Some('=') {
                    i += 1;
                }
                Token::NotEq
            }
            '!' => {
                i += 1;
                Token::Bang
            }
            '&' | '|' if peek(i + 1) == Some(c) => {
                i += 2;
                if c == '&' {
                    Token::AndAnd
                } else {
                    Token::OrOr
                }
            }
            '=' if peek(i + 1) == Some('=') => {
                i += 2;
                if peek(i) == Some('=') {
                    i += 1;
                }
                Token::EqEq
            }
            '=' if peek(i + 1) == Some('~') => {
                i += 2;
                tokens.push((start, Token::Tilde));
                while peek(i).is_some_and(char::is_whitespace) {
                    i += 1;
                }
                let (regex_start, first) = match chars.get(i) {
                    Some(&(pos, ch)) => (pos, ch),
                    None => return Err(ExprError::UnexpectedEnd),
                };
                if first != '/' {
                    return Err(ExprError::UnexpectedChar {
                        ch: first,
                        position: regex_start,
                    });
                }
                i += 1;
                let mut source = String::new();
                loop {
                    match peek(i) {
                        None => return Err(ExprError::UnterminatedRegex(regex_start)),
                        Some('\\') => {
                            source.push('\\');
                            if let Some(next) = peek(i + 1) {
                                source.push(next);
                            }
                            i += 2;
                        }
                        Some('/') => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            source.push(ch);
                            i += 1;
                        }
                    }
                }
                let mut flags = String::new();
                while let Some(ch) = peek(i).filter(char::is_ascii_alphabetic) {
                    flags.push(ch);
                    i += 1;
                }
                tokens.push((regex_start, Token::Regex { source, flags }));
                continue;
            }
            '<' | '>' => {
                let eq = peek(i + 1) == Some('=');
                i += if eq { 2 } else { 1 };
                match (c, eq) {
                    ('<', false) => Token::Lt,
                    ('<', true) => Token::Le,
                    (_, false) => Token::Gt,
                    (_, true) => Token::Ge,
                }
            }
            '\'' | '"' => {
                let mut value = String::new();
                i += 1;
                loop {
                    match peek(i) {
                        None => return Err(ExprError::UnterminatedString(start)),
                        Some(ch) if ch == c => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            value.push(ch);
                            i += 1;
                        }
                    }
                }
                Token::Str(value)
            }
            _ if is_word_char(c) => {
                let mut word = String::new();
                while let Some(ch) = peek(i).filter(|ch| is_word_char(*ch)) {
                    word.push(ch);
                    i += 1;
                }
                Token::Word(word)
            }
            _ => return Err(ExprError::UnexpectedChar { ch: c, position: start }),
        };
        tokens.push((start, token));
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(_, t)| t)
    }

    fn next(&mut self) -> Result<(usize, Token), ExprError> {
        let item = self.tokens.get(self.pos).cloned().ok_or(ExprError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(item)
    }

    fn unexpected(position: usize, token: &Token) -> ExprError {
        ExprError::UnexpectedToken {
            found: token.to_string(),
            position,
        }
    }

    fn parse_or(&mut self) -> Result<ContextKeyExpr, ExprError> {
        let mut items = Vec::new();
        push_flat(&mut items, self.parse_and()?, true);
        while self.peek() == Some(&Token::OrOr) {
            self.pos += 1;
            push_flat(&mut items, self.parse_and()?, true);
        }
        Ok(collapse(items, ContextKeyExpr::Or))
    }

    fn parse_and(&mut self) -> Result<ContextKeyExpr, ExprError> {
        let mut items = Vec::new();
        push_flat(&mut items, self.parse_unary()?, false);
        while self.peek() == Some(&Token::AndAnd) {
            self.pos += 1;
            push_flat(&mut items, self.parse_unary()?, false);
        }
        Ok(collapse(items, ContextKeyExpr::And))
    }

    fn parse_unary(&mut self) -> Result<ContextKeyExpr, ExprError> {
        if self.peek() == Some(&Token::Bang) {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(ContextKeyExpr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<ContextKeyExpr, ExprError> {
        let (position, token) = self.next()?;
        match token {
            Token::LParen => {
                let expr = self.parse_or()?;
                match self.next()? {
                    (_, Token::RParen) => Ok(expr),
                    (p, t) => Err(Self::unexpected(p, &t)),
                }
            }
            Token::Word(w) if w == "true" => Ok(ContextKeyExpr::True),
            Token::Word(w) if w == "false" => Ok(ContextKeyExpr::False),
            Token::Word(key) => self.parse_operation(key),
            other => Err(Self::unexpected(position, &other)),
        }
    }

    fn parse_operation(&mut self, key: String) -> Result<ContextKeyExpr, ExprError> {
        let expr = match self.peek() {
            Some(Token::EqEq) => {
                self.pos += 1;
                ContextKeyExpr::Equals(key, self.parse_value()?)
            }
            Some(Token::NotEq) => {
                self.pos += 1;
                ContextKeyExpr::NotEquals(key, self.parse_value()?)
            }
            Some(Token::Lt) => {
                self.pos += 1;
                ContextKeyExpr::Smaller(key, self.parse_number()?)
            }
            Some(Token::Le) => {
                self.pos += 1;
                ContextKeyExpr::SmallerEquals(key, self.parse_number()?)
            }
            Some(Token::Gt) => {
                self.pos += 1;
                ContextKeyExpr::Greater(key, self.parse_number()?)
            }
            Some(Token::Ge) => {
                self.pos += 1;
                ContextKeyExpr::GreaterEquals(key, self.parse_number()?)
            }
            Some(Token::Tilde) => {
                self.pos += 1;
                match self.next()? {
                    (_, Token::Regex { source, flags }) => {
                        ContextKeyExpr::Regex(key, ExprRegex::new(&source, &flags)?)
                    }
                    (p, t) => return Err(Self::unexpected(p, &t)),
                }
            }
            Some(Token::Word(w)) if w == "in" => {
                self.pos += 1;
                ContextKeyExpr::In(key, self.parse_key()?)
            }
            Some(Token::Word(w))
                if w == "not" && matches!(self.peek_at(1), Some(Token::Word(next)) if next == "in") =>
            {
                self.pos += 2;
                ContextKeyExpr::NotIn(key, self.parse_key()?)
            }
            _ => ContextKeyExpr::Defined(key),
        };
        Ok(expr)
    }

    fn parse_value(&mut self) -> Result<ExprValue, ExprError> {
        match self.next()? {
            (_, Token::Word(w)) if w == "true" => Ok(ExprValue::Bool(true)),
            (_, Token::Word(w)) if w == "false" => Ok(ExprValue::Bool(false)),
            (_, Token::Word(w)) | (_, Token::Str(w)) => Ok(ExprValue::Str(w)),
            (p, t) => Err(Self::unexpected(p, &t)),
        }
    }

    fn parse_key(&mut self) -> Result<String, ExprError> {
        match self.next()? {
            (_, Token::Word(w)) | (_, Token::Str(w)) => Ok(w),
            (p, t) => Err(Self::unexpected(p, &t)),
        }
    }

    fn parse_number(&mut self) -> Result<f64, ExprError> {
        match self.next()? {
            (_, Token::Word(w)) | (_, Token::Str(w)) => {
                w.trim().parse().map_err(|_| ExprError::InvalidNumber(w))
            }
            (p, t) => Err(Self::unexpected(p, &t)),
        }
    }
}

fn push_flat(items: &mut Vec<ContextKeyExpr>, expr: ContextKeyExpr, or: bool) {
    match expr {
        ContextKeyExpr::Or(inner) if or => items.extend(inner),
        ContextKeyExpr::And(inner) if !or => items.extend(inner),
        other => items.push(other),
    }
}

fn collapse(
    mut items: Vec<ContextKeyExpr>,
    wrap: fn(Vec<ContextKeyExpr>) -> ContextKeyExpr,
) -> ContextKeyExpr {
    if items.len() == 1 {
        items.remove(0)
    } else {
        wrap(items)
    }
}
