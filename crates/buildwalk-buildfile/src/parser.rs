//! Recursive-descent parser producing top-level statements.
//!
//! Handles the expression forms that appear in BUILD files: calls with
//! keyword and star arguments, lists, tuples, dicts, list comprehensions,
//! conditional expressions, attribute access, indexing/slicing and binary
//! operators. Function definitions and control-flow statements are not
//! allowed in BUILD files and are rejected.

use std::path::Path;

use crate::error::ParseError;
use crate::lexer::{Spanned, Token};

/// Binary operators by precedence level, lowest first.
const BINARY_LEVELS: &[&[&str]] = &[
    &["or"],
    &["and"],
    &["==", "!=", "<", ">", "<=", ">=", "in", "not in"],
    &["|"],
    &["^"],
    &["&"],
    &["+", "-"],
    &["*", "/", "//", "%"],
];

const ASSIGN_OPS: &[&str] = &["=", "+=", "-=", "*=", "/=", "%="];

/// Deepest expression nesting accepted before the file is rejected.
const MAX_NESTING: usize = 100;

const UNSUPPORTED_STATEMENTS: &[&str] = &[
    "def", "if", "for", "while", "return", "class", "try", "with", "lambda",
];

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    Str(String),
    Number(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Paren(Box<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Comprehension {
        body: Box<Expr>,
        clauses: Vec<Clause>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Arg>,
    },
    Dot {
        value: Box<Expr>,
        name: String,
    },
    Index {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        value: Box<Expr>,
        lo: Option<Box<Expr>>,
        hi: Option<Box<Expr>>,
    },
    Unary {
        op: &'static str,
        operand: Box<Expr>,
    },
    Binary {
        op: &'static str,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        then: Box<Expr>,
        cond: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

/// A `for` or `if` clause of a list comprehension.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    For { vars: Expr, iter: Expr },
    If(Expr),
}

/// A call argument. `star` is `""`, `"*"` or `"**"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub star: &'static str,
    pub value: Expr,
}

/// A top-level statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr { expr: Expr, line: usize },
    Assign {
        target: Expr,
        op: &'static str,
        value: Expr,
        line: usize,
    },
}

impl Stmt {
    pub fn line(&self) -> usize {
        match self {
            Stmt::Expr { line, .. } | Stmt::Assign { line, .. } => *line,
        }
    }
}

pub(crate) struct Parser<'a> {
    path: &'a Path,
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(path: &'a Path, tokens: Vec<Spanned>) -> Self {
        Self {
            path,
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn position(&self) -> (usize, usize) {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| (t.line, t.column))
            .unwrap_or((1, 1))
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let (line, column) = self.position();
        ParseError::new(self.path, line, column, message)
    }

    fn unexpected(&self) -> ParseError {
        let found = match self.peek() {
            Token::Ident(s) => format!("'{}'", s),
            Token::Str(_) => "string".to_string(),
            Token::Number(n) => format!("'{}'", n),
            Token::Punct(p) => format!("'{}'", p),
            Token::Newline => "newline".to_string(),
            Token::Eof => "end of file".to_string(),
        };
        self.error(format!("syntax error: unexpected {}", found))
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Token::Punct(q) if *q == p)
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s == kw)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.is_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), ParseError> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    pub(crate) fn parse_file(mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            match self.peek() {
                Token::Eof => break,
                Token::Newline => {
                    self.pos += 1;
                }
                Token::Punct(";") => {
                    self.pos += 1;
                }
                _ => {
                    stmts.push(self.statement()?);
                    if self.eat_punct(";") {
                        continue;
                    }
                    match self.peek() {
                        Token::Newline | Token::Eof => {}
                        _ => return Err(self.unexpected()),
                    }
                }
            }
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        let (line, _) = self.position();
        if let Token::Ident(kw) = self.peek() {
            if UNSUPPORTED_STATEMENTS.contains(&kw.as_str()) {
                return Err(self.error(format!(
                    "'{}' statements are not allowed in BUILD files",
                    kw
                )));
            }
        }

        let expr = self.expression_list()?;
        for &op in ASSIGN_OPS {
            if self.eat_punct(op) {
                let value = self.expression_list()?;
                return Ok(Stmt::Assign {
                    target: expr,
                    op,
                    value,
                    line,
                });
            }
        }
        Ok(Stmt::Expr { expr, line })
    }

    /// `a, b` at statement level forms a tuple.
    fn expression_list(&mut self) -> Result<Expr, ParseError> {
        let first = self.expression()?;
        if !self.is_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            if self.at_expression_end() {
                break;
            }
            items.push(self.expression()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn at_expression_end(&self) -> bool {
        match self.peek() {
            Token::Newline | Token::Eof => true,
            Token::Punct(p) => matches!(*p, ")" | "]" | "}" | "=" | ";") || ASSIGN_OPS.contains(p),
            _ => false,
        }
    }

    /// Run `f` one nesting level deeper, failing past [`MAX_NESTING`].
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!(
                "expression nested more than {} levels deep",
                MAX_NESTING
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    pub(crate) fn expression(&mut self) -> Result<Expr, ParseError> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr, ParseError> {
        let then = self.binary(0)?;
        if self.is_keyword("if") && !self.in_comprehension_clause() {
            self.pos += 1;
            let cond = self.binary(0)?;
            if !self.eat_keyword("else") {
                return Err(self.error("syntax error: expected 'else' in conditional expression"));
            }
            let otherwise = self.expression()?;
            return Ok(Expr::Conditional {
                then: Box::new(then),
                cond: Box::new(cond),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(then)
    }

    /// Conditional expressions never end with `]`, so an `if` whose
    /// condition is followed by `]` or `for` belongs to a comprehension.
    fn in_comprehension_clause(&self) -> bool {
        let mut depth = 0usize;
        let mut i = self.pos + 1;
        while let Some(t) = self.tokens.get(i) {
            match &t.token {
                Token::Punct("(" | "[" | "{") => depth += 1,
                Token::Punct(")" | "}") if depth > 0 => depth -= 1,
                Token::Punct("]") => {
                    if depth == 0 {
                        return true;
                    }
                    depth -= 1;
                }
                Token::Ident(s) if depth == 0 && s == "else" => return false,
                Token::Ident(s) if depth == 0 && s == "for" => return true,
                Token::Newline | Token::Eof => return false,
                Token::Punct(")" | "}") | Token::Punct(",") if depth == 0 => return false,
                _ => {}
            }
            i += 1;
        }
        false
    }

    fn binary(&mut self, level: usize) -> Result<Expr, ParseError> {
        if level >= BINARY_LEVELS.len() {
            return self.unary();
        }
        let mut lhs = self.binary(level + 1)?;
        loop {
            let op = match self.binary_op(BINARY_LEVELS[level]) {
                Some(op) => op,
                None => return Ok(lhs),
            };
            let rhs = self.binary(level + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn binary_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        if ops.contains(&"not in") && self.is_keyword("not") {
            if let Token::Ident(next) = self.peek_at(1) {
                if next == "in" {
                    self.pos += 2;
                    return Some("not in");
                }
            }
        }
        let op = ops.iter().find(|op| match self.peek() {
            Token::Punct(p) => p == *op,
            Token::Ident(s) => s == *op,
            _ => false,
        })?;
        self.pos += 1;
        Some(*op)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = if self.eat_punct("-") {
            Some("-")
        } else if self.eat_punct("+") {
            Some("+")
        } else if self.eat_punct("~") {
            Some("~")
        } else if self.eat_keyword("not") {
            Some("not")
        } else {
            None
        };
        match op {
            Some(op) => Ok(Expr::Unary {
                op,
                operand: Box::new(self.nested(Self::unary)?),
            }),
            None => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_punct("(") {
                let args = self.call_args()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                };
            } else if self.eat_punct(".") {
                match self.advance() {
                    Token::Ident(name) => {
                        expr = Expr::Dot {
                            value: Box::new(expr),
                            name,
                        }
                    }
                    _ => {
                        self.pos -= 1;
                        return Err(self.unexpected());
                    }
                }
            } else if self.eat_punct("[") {
                expr = self.index_or_slice(expr)?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn index_or_slice(&mut self, value: Expr) -> Result<Expr, ParseError> {
        let lo = if self.is_punct(":") {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        if self.eat_punct(":") {
            let hi = if self.is_punct("]") {
                None
            } else {
                Some(Box::new(self.expression()?))
            };
            self.expect_punct("]")?;
            return Ok(Expr::Slice {
                value: Box::new(value),
                lo,
                hi,
            });
        }
        self.expect_punct("]")?;
        match lo {
            Some(index) => Ok(Expr::Index {
                value: Box::new(value),
                index,
            }),
            None => Err(self.unexpected()),
        }
    }

    fn call_args(&mut self) -> Result<Vec<Arg>, ParseError> {
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            let star = if self.eat_punct("**") {
                "**"
            } else if self.eat_punct("*") {
                "*"
            } else {
                ""
            };
            let name = match (self.peek(), self.peek_at(1)) {
                (Token::Ident(name), Token::Punct("=")) if star.is_empty() => Some(name.clone()),
                _ => None,
            };
            if name.is_some() {
                self.pos += 2;
            }
            let value = self.expression()?;
            args.push(Arg { name, star, value });
            if !self.eat_punct(",") {
                self.expect_punct(")")?;
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.pos += 1;
                Ok(Expr::Ident(name))
            }
            Token::Str(mut value) => {
                self.pos += 1;
                // Adjacent string literals concatenate.
                while let Token::Str(next) = self.peek() {
                    value.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Str(value))
            }
            Token::Number(n) => {
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Token::Punct("(") => {
                self.pos += 1;
                self.paren()
            }
            Token::Punct("[") => {
                self.pos += 1;
                self.list()
            }
            Token::Punct("{") => {
                self.pos += 1;
                self.dict()
            }
            _ => Err(self.unexpected()),
        }
    }

    fn paren(&mut self) -> Result<Expr, ParseError> {
        if self.eat_punct(")") {
            return Ok(Expr::Tuple(Vec::new()));
        }
        let first = self.expression()?;
        if self.eat_punct(")") {
            return Ok(Expr::Paren(Box::new(first)));
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            if self.is_punct(")") {
                break;
            }
            items.push(self.expression()?);
        }
        self.expect_punct(")")?;
        Ok(Expr::Tuple(items))
    }

    fn list(&mut self) -> Result<Expr, ParseError> {
        if self.eat_punct("]") {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expression()?;
        if self.is_keyword("for") {
            let clauses = self.comprehension_clauses()?;
            self.expect_punct("]")?;
            return Ok(Expr::Comprehension {
                body: Box::new(first),
                clauses,
            });
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            if self.is_punct("]") {
                break;
            }
            items.push(self.expression()?);
        }
        self.expect_punct("]")?;
        Ok(Expr::List(items))
    }

    fn comprehension_clauses(&mut self) -> Result<Vec<Clause>, ParseError> {
        let mut clauses = Vec::new();
        loop {
            if self.eat_keyword("for") {
                let vars = self.loop_vars()?;
                if !self.eat_keyword("in") {
                    return Err(self.error("syntax error: expected 'in' in comprehension"));
                }
                let iter = self.binary(0)?;
                clauses.push(Clause::For { vars, iter });
            } else if self.eat_keyword("if") {
                clauses.push(Clause::If(self.binary(0)?));
            } else {
                return Ok(clauses);
            }
        }
    }

    fn loop_vars(&mut self) -> Result<Expr, ParseError> {
        let mut vars = Vec::new();
        loop {
            vars.push(self.postfix()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        if vars.len() == 1 {
            Ok(vars.remove(0))
        } else {
            Ok(Expr::Tuple(vars))
        }
    }

    fn dict(&mut self) -> Result<Expr, ParseError> {
        let mut entries = Vec::new();
        while !self.eat_punct("}") {
            let key = self.expression()?;
            self.expect_punct(":")?;
            let value = self.expression()?;
            entries.push((key, value));
            if !self.eat_punct(",") {
                self.expect_punct("}")?;
                break;
            }
        }
        Ok(Expr::Dict(entries))
    }
}
