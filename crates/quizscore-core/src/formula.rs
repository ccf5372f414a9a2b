//! Restricted expression language for `formula` rules.
//!
//! Formulas are authored by admins and stored as data, so they are parsed by
//! a small recursive-descent parser into an [`Expr`] tree and evaluated
//! against a fixed namespace of scale scores. There are no function calls,
//! no assignment and no way to reach anything outside the namespace.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or         := and (("||" | "or") and)*
//! and        := not (("&&" | "and") not)*
//! not        := ("!" | "not") not | comparison
//! comparison := additive (cmp additive)?
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/") unary)*
//! unary      := "-" unary | primary
//! primary    := number | "true" | "false" | ident | "[" name "]" | "(" or ")"
//! cmp        := ">=" | ">" | "<=" | "<" | "==" | "!="
//! ```
//!
//! Identifiers are Unicode letters, digits and `_`, not starting with a
//! digit. Any other scale key, including one spelled like a keyword, is
//! written in brackets: `[self-esteem] > 3`.
//!
//! The depth limit counts parentheses, unary operators and every chained
//! binary operator, so it bounds the depth of the parsed tree.
//!
//! Each call to [`compile`] builds its own parser; nothing is cached between
//! calls.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::FormulaError;
use crate::model::Comparison;

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

/// A parsed formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Bool(bool),
    Var(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Arith {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Compare {
        op: Comparison,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// The result of evaluating an expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
}

impl Value {
    /// Booleans as-is; numbers are true when non-zero.
    pub fn truthy(self) -> bool {
        match self {
            Value::Bool(b) => b,
            Value::Number(n) => n != 0.0,
        }
    }

    fn number(self, op: &str) -> Result<f64, FormulaError> {
        match self {
            Value::Number(n) => Ok(n),
            Value::Bool(_) => Err(FormulaError::TypeMismatch(format!(
                "operator '{op}' expects numbers, got a boolean"
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl Expr {
    /// Every variable name the expression references.
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Number(_) | Expr::Bool(_) => {}
            Expr::Var(name) => {
                names.insert(name);
            }
            Expr::Neg(e) | Expr::Not(e) => e.collect_variables(names),
            Expr::Arith { lhs, rhs, .. }
            | Expr::Compare { lhs, rhs, .. }
            | Expr::And(lhs, rhs)
            | Expr::Or(lhs, rhs) => {
                lhs.collect_variables(names);
                rhs.collect_variables(names);
            }
        }
    }

    /// Evaluate against a variable namespace.
    pub fn eval(&self, vars: &BTreeMap<&str, f64>) -> Result<Value, FormulaError> {
        match self {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Var(name) => vars
                .get(name.as_str())
                .copied()
                .map(Value::Number)
                .ok_or_else(|| FormulaError::UnknownVariable(name.clone())),
            Expr::Neg(e) => Ok(Value::Number(-e.eval(vars)?.number("-")?)),
            Expr::Not(e) => Ok(Value::Bool(!e.eval(vars)?.truthy())),
            Expr::Arith { op, lhs, rhs } => {
                let l = lhs.eval(vars)?.number(op.symbol())?;
                let r = rhs.eval(vars)?.number(op.symbol())?;
                let value = match op {
                    ArithOp::Add => l + r,
                    ArithOp::Sub => l - r,
                    ArithOp::Mul => l * r,
                    ArithOp::Div => {
                        if r == 0.0 {
                            return Err(FormulaError::DivisionByZero);
                        }
                        l / r
                    }
                };
                if !value.is_finite() {
                    return Err(FormulaError::NonFinite);
                }
                Ok(Value::Number(value))
            }
            Expr::Compare { op, lhs, rhs } => {
                match (lhs.eval(vars)?, rhs.eval(vars)?) {
                    (Value::Number(l), Value::Number(r)) => Ok(Value::Bool(op.apply(l, r))),
                    (Value::Bool(l), Value::Bool(r)) => match op {
                        Comparison::Eq => Ok(Value::Bool(l == r)),
                        Comparison::Ne => Ok(Value::Bool(l != r)),
                        _ => Err(FormulaError::TypeMismatch(format!(
                            "operator '{op}' cannot order booleans"
                        ))),
                    },
                    _ => Err(FormulaError::TypeMismatch(format!(
                        "operator '{op}' cannot compare a number with a boolean"
                    ))),
                }
            }
            Expr::And(lhs, rhs) => {
                if !lhs.eval(vars)?.truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(rhs.eval(vars)?.truthy()))
            }
            Expr::Or(lhs, rhs) => {
                if lhs.eval(vars)?.truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(rhs.eval(vars)?.truthy()))
            }
        }
    }
}

/// Parse `source`, rejecting sources longer than `max_len` bytes or nesting
/// deeper than `max_depth`.
pub fn compile(source: &str, max_len: usize, max_depth: usize) -> Result<Expr, FormulaError> {
    if source.len() > max_len {
        return Err(FormulaError::TooLong {
            len: source.len(),
            max: max_len,
        });
    }
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        max_depth,
        end: source.len(),
    };
    let expr = parser.parse_or()?;
    if let Some((position, token)) = parser.tokens.get(parser.pos) {
        return Err(FormulaError::Parse {
            position: *position,
            message: format!("unexpected {token}"),
        });
    }
    Ok(expr)
}

/// Compile and evaluate `source`, returning its truthiness.
///
/// Every referenced variable must exist in `vars` before evaluation starts,
/// so an unknown name is reported regardless of short-circuiting.
pub fn evaluate(
    source: &str,
    vars: &BTreeMap<&str, f64>,
    max_len: usize,
    max_depth: usize,
) -> Result<bool, FormulaError> {
    let expr = compile(source, max_len, max_depth)?;
    if let Some(unknown) = expr.variables().into_iter().find(|v| !vars.contains_key(v)) {
        return Err(FormulaError::UnknownVariable(unknown.to_string()));
    }
    Ok(expr.eval(vars)?.truthy())
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    True,
    False,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Cmp(Comparison),
    And,
    Or,
    Not,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {n}"),
            Token::Ident(name) => write!(f, "identifier '{name}'"),
            Token::True => write!(f, "'true'"),
            Token::False => write!(f, "'false'"),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::Cmp(op) => write!(f, "'{op}'"),
            Token::And => write!(f, "'and'"),
            Token::Or => write!(f, "'or'"),
            Token::Not => write!(f, "'not'"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    let parse_error = |position: usize, message: String| FormulaError::Parse { position, message };

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c.is_ascii_digit() || c == '.' {
            let mut end = start;
            let mut seen_exponent = false;
            while let Some(&(i, d)) = chars.peek() {
                let exponent_sign = seen_exponent
                    && (d == '+' || d == '-')
                    && matches!(source[..i].chars().last(), Some('e' | 'E'));
                if d.is_ascii_digit() || d == '.' || exponent_sign {
                    end = i + d.len_utf8();
                    chars.next();
                } else if (d == 'e' || d == 'E') && !seen_exponent {
                    seen_exponent = true;
                    end = i + 1;
                    chars.next();
                } else {
                    break;
                }
            }
            let literal = &source[start..end];
            let value = literal
                .parse::<f64>()
                .map_err(|_| parse_error(start, format!("invalid number '{literal}'")))?;
            tokens.push((start, Token::Number(value)));
            continue;
        }

        if c == '[' {
            chars.next();
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some((_, ']')) => break,
                    Some((_, d)) => name.push(d),
                    None => return Err(parse_error(start, "unclosed '['".into())),
                }
            }
            if name.is_empty() {
                return Err(parse_error(start, "empty variable name '[]'".into()));
            }
            tokens.push((start, Token::Ident(name)));
            continue;
        }

        if is_ident_start(c) {
            let mut end = start;
            while let Some(&(i, d)) = chars.peek() {
                if is_ident_continue(d) {
                    end = i + d.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let word = &source[start..end];
            let token = match word.to_ascii_lowercase().as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "true" => Token::True,
                "false" => Token::False,
                _ => Token::Ident(word.to_string()),
            };
            tokens.push((start, token));
            continue;
        }

        chars.next();
        let next_is_eq = matches!(chars.peek(), Some(&(_, '=')));
        let token = match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '>' | '<' | '=' | '!' if next_is_eq => {
                chars.next();
                Token::Cmp(match c {
                    '>' => Comparison::Ge,
                    '<' => Comparison::Le,
                    '=' => Comparison::Eq,
                    _ => Comparison::Ne,
                })
            }
            '>' => Token::Cmp(Comparison::Gt),
            '<' => Token::Cmp(Comparison::Lt),
            '!' => Token::Not,
            '&' | '|' => {
                if matches!(chars.peek(), Some(&(_, d)) if d == c) {
                    chars.next();
                    if c == '&' {
                        Token::And
                    } else {
                        Token::Or
                    }
                } else {
                    return Err(parse_error(start, format!("expected '{c}{c}'")));
                }
            }
            '=' => return Err(parse_error(start, "assignment is not supported, use '=='".into())),
            other => return Err(parse_error(start, format!("unexpected character '{other}'"))),
        };
        tokens.push((start, token));
    }

    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whether a formula can reference `name` at all, bare or in brackets.
pub fn is_referenceable(name: &str) -> bool {
    !name.is_empty() && !name.contains(']')
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
    max_depth: usize,
    /// Byte offset reported for errors at end of input.
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn error(&self, message: impl Into<String>) -> FormulaError {
        FormulaError::Parse {
            position: self.position(),
            message: message.into(),
        }
    }

    fn enter(&mut self) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(FormulaError::TooDeep {
                max: self.max_depth,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Release the depth taken by `links` chained binary operators.
    fn leave_chain(&mut self, links: usize) {
        self.depth -= links;
    }

    fn parse_or(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.parse_and()?;
        let mut links = 0;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            self.enter()?;
            links += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.leave_chain(links);
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.parse_not()?;
        let mut links = 0;
        while self.peek() == Some(&Token::And) {
            self.advance();
            self.enter()?;
            links += 1;
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        self.leave_chain(links);
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, FormulaError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            self.enter()?;
            let inner = self.parse_not()?;
            self.leave();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, FormulaError> {
        let lhs = self.parse_additive()?;
        let Some(Token::Cmp(op)) = self.peek().cloned() else {
            return Ok(lhs);
        };
        self.advance();
        let rhs = self.parse_additive()?;
        if matches!(self.peek(), Some(Token::Cmp(_))) {
            return Err(self.error("comparisons cannot be chained, use 'and'"));
        }
        Ok(Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.parse_term()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => {
                    self.leave_chain(links);
                    return Ok(lhs);
                }
            };
            self.advance();
            self.enter()?;
            links += 1;
            let rhs = self.parse_term()?;
            lhs = Expr::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.parse_unary()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Slash) => ArithOp::Div,
                _ => {
                    self.leave_chain(links);
                    return Ok(lhs);
                }
            };
            self.advance();
            self.enter()?;
            links += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, FormulaError> {
        if self.peek() == Some(&Token::Minus) {
            self.advance();
            self.enter()?;
            let inner = self.parse_unary()?;
            self.leave();
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, FormulaError> {
        let position = self.position();
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    return Err(self.error(format!("function calls are not supported: '{name}'")));
                }
                Ok(Expr::Var(name))
            }
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.parse_or()?;
                self.leave();
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(FormulaError::Parse {
                        position,
                        message: "unclosed '('".into(),
                    }),
                }
            }
            Some(token) => Err(FormulaError::Parse {
                position,
                message: format!("expected a value, found {token}"),
            }),
            None => Err(FormulaError::Parse {
                position,
                message: "unexpected end of expression".into(),
            }),
        }
    }
}
