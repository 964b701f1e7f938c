//! Read-only expression language for pulling audit metadata out of an invocation.
//!
//! Expressions are evaluated against the named parameters of the audited call, the
//! call's result (bound to `#result`), and the requesting user's id (`#userId`).
//!
//! Supported syntax:
//!
//! - variables: `#dto`, `#result`, `#userId`
//! - navigation: `#dto.operationType.desc`, null-safe `#dto?.reason`, index `#dto.ids[0]`
//! - literals: `'text'` (with `''` as an escaped quote), `"text"`, `42`, `1.5`,
//!   `true`, `false`, `null`, inline lists `{1, 2, #id}`
//! - grouping with parentheses and `+` (numeric addition when both sides are numbers,
//!   string concatenation otherwise)
//!
//! Nothing here can call into code: method invocations are rejected at parse time.
//! Callers that only want a value use [`eval_string`] / [`eval_list`], which log and
//! swallow every error so auditing can never fail the audited operation.

use serde_json::{Number, Value};
use tracing::warn;

/// Variable name the wrapped operation's result is bound to.
pub const RESULT_VAR: &str = "result";

/// Variable name the requesting user's id is bound to.
pub const USER_ID_VAR: &str = "userId";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("unexpected character {ch:?} at {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unterminated string literal starting at {0}")]
    UnterminatedString(usize),
    #[error("invalid number literal {0:?}")]
    InvalidNumber(String),
    #[error("unexpected {found} at {pos}")]
    UnexpectedToken { found: String, pos: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("method invocation is not permitted: {0}()")]
    Invocation(String),
    #[error("cannot read {0} of null")]
    NullNavigation(String),
    #[error("no property {0:?}")]
    NoSuchProperty(String),
    #[error("index {0} out of bounds")]
    IndexOutOfBounds(usize),
    #[error("cannot index into {0}")]
    NotIndexable(&'static str),
    #[error("cannot add {0} and {1}")]
    UnsupportedOperands(&'static str, &'static str),
}

/// Bindings visible to an expression.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvalContext<'a> {
    params: &'a [(String, Value)],
    result: Option<&'a Value>,
    user_id: Option<i64>,
}

impl<'a> EvalContext<'a> {
    pub fn new(params: &'a [(String, Value)]) -> Self {
        Self {
            params,
            result: None,
            user_id: None,
        }
    }

    pub fn with_result(mut self, result: Option<&'a Value>) -> Self {
        self.result = result;
        self
    }

    pub fn with_user_id(mut self, user_id: Option<i64>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Unbound names resolve to `null`.
    fn lookup(&self, name: &str) -> Value {
        if name == RESULT_VAR
            && let Some(result) = self.result
        {
            return result.clone();
        }
        if let Some((_, value)) = self.params.iter().find(|(n, _)| n == name) {
            return value.clone();
        }
        if name == USER_ID_VAR
            && let Some(id) = self.user_id
        {
            return Value::from(id);
        }
        Value::Null
    }
}

/// Evaluate `expression`, surfacing any parse or navigation error.
pub fn evaluate(expression: &str, ctx: &EvalContext<'_>) -> Result<Value, ExprError> {
    let tokens = lex(expression)?;
    let mut parser = Parser {
        tokens: &tokens,
        cursor: 0,
    };
    let ast = parser.parse_expr()?;
    if let Some((token, pos)) = parser.peek_with_pos() {
        return Err(ExprError::UnexpectedToken {
            found: token.describe(),
            pos,
        });
    }
    eval_node(&ast, ctx)
}

/// Evaluate in scalar context. Blank expressions and failures yield `""`.
pub fn eval_string(expression: &str, ctx: &EvalContext<'_>) -> String {
    if expression.trim().is_empty() {
        return String::new();
    }
    match evaluate(expression, ctx) {
        Ok(value) => render(&value),
        Err(e) => {
            warn!(expression, error = %e, "Failed to evaluate audit expression");
            String::new()
        }
    }
}

/// Evaluate in list context. Only array-shaped results are returned.
pub fn eval_list(expression: &str, ctx: &EvalContext<'_>) -> Option<Vec<Value>> {
    if expression.trim().is_empty() {
        return None;
    }
    match evaluate(expression, ctx) {
        Ok(Value::Array(items)) => Some(items),
        Ok(other) => {
            warn!(
                expression,
                kind = kind_of(&other),
                "Audit list expression did not produce a list"
            );
            None
        }
        Err(e) => {
            warn!(expression, error = %e, "Failed to evaluate audit expression");
            None
        }
    }
}

/// Scalar string form of a resolved value.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Hash,
    Ident(String),
    Str(String),
    Num(Number),
    Dot,
    SafeDot,
    Plus,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Hash => "'#'".to_owned(),
            Token::Ident(name) => format!("identifier {name:?}"),
            Token::Str(s) => format!("string {s:?}"),
            Token::Num(n) => format!("number {n}"),
            Token::Dot => "'.'".to_owned(),
            Token::SafeDot => "'?.'".to_owned(),
            Token::Plus => "'+'".to_owned(),
            Token::Comma => "','".to_owned(),
            Token::LParen => "'('".to_owned(),
            Token::RParen => "')'".to_owned(),
            Token::LBracket => "'['".to_owned(),
            Token::RBracket => "']'".to_owned(),
            Token::LBrace => "'{'".to_owned(),
            Token::RBrace => "'}'".to_owned(),
        }
    }

    /// Whether a `-` after this token starts a negative literal rather than an operator.
    fn allows_sign(token: Option<&Token>) -> bool {
        matches!(
            token,
            None | Some(
                Token::Plus | Token::Comma | Token::LParen | Token::LBracket | Token::LBrace
            )
        )
    }
}

fn lex(input: &str) -> Result<Vec<(Token, usize)>, ExprError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens: Vec<(Token, usize)> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, ch) = chars[i];
        match ch {
            c if c.is_whitespace() => i += 1,
            '#' => {
                tokens.push((Token::Hash, pos));
                i += 1;
            }
            '.' => {
                tokens.push((Token::Dot, pos));
                i += 1;
            }
            '?' => {
                if chars.get(i + 1).map(|&(_, c)| c) == Some('.') {
                    tokens.push((Token::SafeDot, pos));
                    i += 2;
                } else {
                    return Err(ExprError::UnexpectedChar { ch, pos });
                }
            }
            '+' => {
                tokens.push((Token::Plus, pos));
                i += 1;
            }
            ',' => {
                tokens.push((Token::Comma, pos));
                i += 1;
            }
            '(' => {
                tokens.push((Token::LParen, pos));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, pos));
                i += 1;
            }
            '[' => {
                tokens.push((Token::LBracket, pos));
                i += 1;
            }
            ']' => {
                tokens.push((Token::RBracket, pos));
                i += 1;
            }
            '{' => {
                tokens.push((Token::LBrace, pos));
                i += 1;
            }
            '}' => {
                tokens.push((Token::RBrace, pos));
                i += 1;
            }
            '\'' | '"' => {
                let quote = ch;
                let mut text = String::new();
                let mut j = i + 1;
                loop {
                    let Some(&(_, c)) = chars.get(j) else {
                        return Err(ExprError::UnterminatedString(pos));
                    };
                    if c == quote {
                        // A doubled quote is an escaped quote character.
                        if chars.get(j + 1).map(|&(_, c)| c) == Some(quote) {
                            text.push(quote);
                            j += 2;
                            continue;
                        }
                        break;
                    }
                    text.push(c);
                    j += 1;
                }
                tokens.push((Token::Str(text), pos));
                i = j + 1;
            }
            c if c.is_ascii_digit()
                || (c == '-'
                    && chars.get(i + 1).is_some_and(|&(_, c)| c.is_ascii_digit())
                    && Token::allows_sign(tokens.last().map(|(t, _)| t))) =>
            {
                let mut j = i + 1;
                while chars.get(j).is_some_and(|&(_, c)| c.is_ascii_digit()) {
                    j += 1;
                }
                let is_decimal = chars.get(j).map(|&(_, c)| c) == Some('.')
                    && chars.get(j + 1).is_some_and(|&(_, c)| c.is_ascii_digit());
                if is_decimal {
                    j += 1;
                    while chars.get(j).is_some_and(|&(_, c)| c.is_ascii_digit()) {
                        j += 1;
                    }
                }
                let literal: String = chars[i..j].iter().map(|&(_, c)| c).collect();
                tokens.push((Token::Num(parse_number(&literal, is_decimal)?), pos));
                i = j;
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut j = i + 1;
                while chars
                    .get(j)
                    .is_some_and(|&(_, c)| c.is_alphanumeric() || c == '_' || c == '$')
                {
                    j += 1;
                }
                let name: String = chars[i..j].iter().map(|&(_, c)| c).collect();
                tokens.push((Token::Ident(name), pos));
                i = j;
            }
            _ => return Err(ExprError::UnexpectedChar { ch, pos }),
        }
    }

    Ok(tokens)
}

fn parse_number(literal: &str, is_decimal: bool) -> Result<Number, ExprError> {
    let invalid = || ExprError::InvalidNumber(literal.to_owned());
    if !is_decimal && let Ok(n) = literal.parse::<i64>() {
        return Ok(Number::from(n));
    }
    let f: f64 = literal.parse().map_err(|_| invalid())?;
    Number::from_f64(f).ok_or_else(invalid)
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Property(String),
    Index(usize),
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Property(name) => write!(f, "property {name:?}"),
            Step::Index(i) => write!(f, "index {i}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Literal(Value),
    Variable(String),
    Navigate {
        target: Box<Node>,
        step: Step,
        null_safe: bool,
    },
    List(Vec<Node>),
    Add(Box<Node>, Box<Node>),
}

struct Parser<'t> {
    tokens: &'t [(Token, usize)],
    cursor: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(t, _)| t)
    }

    fn peek_with_pos(&self) -> Option<(&Token, usize)> {
        self.tokens.get(self.cursor).map(|(t, p)| (t, *p))
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprError> {
        match self.next() {
            Some((token, _)) if token == expected => Ok(()),
            Some((token, pos)) => Err(ExprError::UnexpectedToken {
                found: token.describe(),
                pos,
            }),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn reject_invocation(&self, name: &str) -> Result<(), ExprError> {
        if self.peek() == Some(&Token::LParen) {
            return Err(ExprError::Invocation(name.to_owned()));
        }
        Ok(())
    }

    fn parse_expr(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.parse_postfix()?;
        while self.peek() == Some(&Token::Plus) {
            self.cursor += 1;
            let rhs = self.parse_postfix()?;
            lhs = Node::Add(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_postfix(&mut self) -> Result<Node, ExprError> {
        let mut node = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot | Token::SafeDot) => {
                    let null_safe = self.peek() == Some(&Token::SafeDot);
                    self.cursor += 1;
                    let name = match self.next() {
                        Some((Token::Ident(name), _)) => name,
                        Some((token, pos)) => {
                            return Err(ExprError::UnexpectedToken {
                                found: token.describe(),
                                pos,
                            });
                        }
                        None => return Err(ExprError::UnexpectedEnd),
                    };
                    self.reject_invocation(&name)?;
                    node = Node::Navigate {
                        target: Box::new(node),
                        step: Step::Property(name),
                        null_safe,
                    };
                }
                Some(Token::LBracket) => {
                    self.cursor += 1;
                    let step = match self.next() {
                        Some((Token::Num(n), pos)) => match n.as_u64() {
                            Some(i) => Step::Index(i as usize),
                            None => {
                                return Err(ExprError::UnexpectedToken {
                                    found: format!("number {n}"),
                                    pos,
                                });
                            }
                        },
                        Some((Token::Str(key), _)) => Step::Property(key),
                        Some((token, pos)) => {
                            return Err(ExprError::UnexpectedToken {
                                found: token.describe(),
                                pos,
                            });
                        }
                        None => return Err(ExprError::UnexpectedEnd),
                    };
                    self.expect(Token::RBracket)?;
                    node = Node::Navigate {
                        target: Box::new(node),
                        step,
                        null_safe: false,
                    };
                }
                _ => return Ok(node),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Node, ExprError> {
        let Some((token, pos)) = self.next() else {
            return Err(ExprError::UnexpectedEnd);
        };
        match token {
            Token::Hash => match self.next() {
                Some((Token::Ident(name), _)) => {
                    self.reject_invocation(&name)?;
                    Ok(Node::Variable(name))
                }
                Some((token, pos)) => Err(ExprError::UnexpectedToken {
                    found: token.describe(),
                    pos,
                }),
                None => Err(ExprError::UnexpectedEnd),
            },
            Token::Str(s) => Ok(Node::Literal(Value::String(s))),
            Token::Num(n) => Ok(Node::Literal(Value::Number(n))),
            Token::Ident(name) => {
                self.reject_invocation(&name)?;
                match name.as_str() {
                    "true" => Ok(Node::Literal(Value::Bool(true))),
                    "false" => Ok(Node::Literal(Value::Bool(false))),
                    "null" => Ok(Node::Literal(Value::Null)),
                    // Bare identifiers would address a root object; there is none.
                    _ => Err(ExprError::UnexpectedToken {
                        found: Token::Ident(name).describe(),
                        pos,
                    }),
                }
            }
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBrace => {
                let mut items = Vec::new();
                if self.peek() == Some(&Token::RBrace) {
                    self.cursor += 1;
                    return Ok(Node::List(items));
                }
                loop {
                    items.push(self.parse_expr()?);
                    match self.next() {
                        Some((Token::Comma, _)) => continue,
                        Some((Token::RBrace, _)) => return Ok(Node::List(items)),
                        Some((token, pos)) => {
                            return Err(ExprError::UnexpectedToken {
                                found: token.describe(),
                                pos,
                            });
                        }
                        None => return Err(ExprError::UnexpectedEnd),
                    }
                }
            }
            other => Err(ExprError::UnexpectedToken {
                found: other.describe(),
                pos,
            }),
        }
    }
}

fn eval_node(node: &Node, ctx: &EvalContext<'_>) -> Result<Value, ExprError> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Variable(name) => Ok(ctx.lookup(name)),
        Node::Navigate {
            target,
            step,
            null_safe,
        } => {
            let base = eval_node(target, ctx)?;
            navigate(base, step, *null_safe)
        }
        Node::List(items) => items
            .iter()
            .map(|item| eval_node(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Node::Add(lhs, rhs) => add(eval_node(lhs, ctx)?, eval_node(rhs, ctx)?),
    }
}

fn navigate(base: Value, step: &Step, null_safe: bool) -> Result<Value, ExprError> {
    if base.is_null() {
        return if null_safe {
            Ok(Value::Null)
        } else {
            Err(ExprError::NullNavigation(step.to_string()))
        };
    }
    match (step, base) {
        (Step::Property(name), Value::Object(mut map)) => map
            .remove(name)
            .ok_or_else(|| ExprError::NoSuchProperty(name.clone())),
        (Step::Property(name), _) => Err(ExprError::NoSuchProperty(name.clone())),
        (Step::Index(i), Value::Array(mut items)) => {
            if *i < items.len() {
                Ok(items.swap_remove(*i))
            } else {
                Err(ExprError::IndexOutOfBounds(*i))
            }
        }
        (Step::Index(_), other) => Err(ExprError::NotIndexable(kind_of(&other))),
    }
}

fn add(lhs: Value, rhs: Value) -> Result<Value, ExprError> {
    match (&lhs, &rhs) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64())
                && let Some(sum) = x.checked_add(y)
            {
                return Ok(Value::from(sum));
            }
            let sum = a.as_f64().unwrap_or(f64::NAN) + b.as_f64().unwrap_or(f64::NAN);
            Number::from_f64(sum)
                .map(Value::Number)
                .ok_or(ExprError::UnsupportedOperands("number", "number"))
        }
        (Value::String(_), _) | (_, Value::String(_)) => Ok(Value::String(format!(
            "{}{}",
            concat_form(&lhs),
            concat_form(&rhs)
        ))),
        _ => Err(ExprError::UnsupportedOperands(kind_of(&lhs), kind_of(&rhs))),
    }
}

/// Concatenation spells `null` out, unlike scalar rendering.
fn concat_form(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        other => render(other),
    }
}
