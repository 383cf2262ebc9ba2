//! Reader for Bazel BUILD files.
//!
//! Parses the Starlark subset used in BUILD files into top-level statements
//! and exposes the pieces a tree walker needs: directive comments
//! (`# gazelle:key value`), rule calls with their attributes, and the
//! generated outputs declared through `out`/`outs` attributes.

mod error;
mod format;
mod lexer;
mod parser;

pub use error::ParseError;
pub use lexer::Comment;
pub use parser::{Arg, Clause, Expr, Stmt};

use std::path::{Path, PathBuf};

use lexer::tokenize;
use parser::Parser;

/// Directive prefix used when none is configured.
pub const DEFAULT_DIRECTIVE_PREFIX: &str = "gazelle";

/// Attributes whose values name generated files.
const OUTPUT_ATTRS: &[&str] = &["out", "outs"];

/// A `# <prefix>:<key> <value>` comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub key: String,
    pub value: String,
    pub line: usize,
}

/// Value of a rule attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    List(Vec<String>),
    /// Any other expression, kept as parsed.
    Expr(Expr),
}

impl AttrValue {
    fn from_expr(expr: &Expr) -> Self {
        match expr {
            Expr::Str(s) => AttrValue::Str(s.clone()),
            Expr::List(items) => {
                let strings: Option<Vec<String>> = items
                    .iter()
                    .map(|item| match item {
                        Expr::Str(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect();
                match strings {
                    Some(strings) => AttrValue::List(strings),
                    None => AttrValue::Expr(expr.clone()),
                }
            }
            other => AttrValue::Expr(other.clone()),
        }
    }
}

/// A top-level call statement such as `go_library(name = "x", ...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub kind: String,
    pub line: usize,
    /// Keyword arguments in declaration order.
    pub attrs: Vec<(String, AttrValue)>,
}

impl Rule {
    pub fn name(&self) -> Option<&str> {
        self.attr_string("name")
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// The attribute's value if it is a plain string.
    pub fn attr_string(&self, key: &str) -> Option<&str> {
        match self.attr(key)? {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The attribute's value if it is a list of plain strings.
    pub fn attr_strings(&self, key: &str) -> Option<&[String]> {
        match self.attr(key)? {
            AttrValue::List(items) => Some(items),
            _ => None,
        }
    }
}

/// A parsed build file.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildFile {
    pub path: PathBuf,
    /// Slash-separated package path relative to the repository root.
    pub pkg: String,
    pub directive_prefix: String,
    pub directives: Vec<Directive>,
    pub rules: Vec<Rule>,
    pub comments: Vec<Comment>,
    pub stmts: Vec<Stmt>,
}

impl BuildFile {
    /// Parse build file contents.
    ///
    /// `prefix` selects which comments are directives; `gazelle` accepts
    /// `# gazelle:exclude vendor`.
    pub fn parse(
        path: impl AsRef<Path>,
        pkg: &str,
        src: &[u8],
        prefix: &str,
    ) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let text = std::str::from_utf8(src)
            .map_err(|e| ParseError::new(path, 0, 0, format!("invalid UTF-8: {}", e)))?;

        let lexed = tokenize(path, text)?;
        let stmts = Parser::new(path, lexed.tokens).parse_file()?;
        let directives = parse_directives(&lexed.comments, prefix);
        let rules = stmts.iter().filter_map(rule_from_stmt).collect();

        Ok(Self {
            path: path.to_path_buf(),
            pkg: pkg.to_string(),
            directive_prefix: prefix.to_string(),
            directives,
            rules,
            comments: lexed.comments,
            stmts,
        })
    }

    /// Values of every directive with the given key, in file order.
    pub fn directive_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.directives
            .iter()
            .filter(move |d| d.key == key)
            .map(|d| d.value.as_str())
    }

    /// Every file named by an `out` or `outs` attribute, in rule order.
    pub fn generated_outputs(&self) -> Vec<&str> {
        let mut outputs = Vec::new();
        for rule in &self.rules {
            for attr in OUTPUT_ATTRS {
                if let Some(out) = rule.attr_string(attr) {
                    outputs.push(out);
                } else if let Some(outs) = rule.attr_strings(attr) {
                    outputs.extend(outs.iter().map(String::as_str));
                }
            }
        }
        outputs
    }
}

fn rule_from_stmt(stmt: &Stmt) -> Option<Rule> {
    let (expr, line) = match stmt {
        Stmt::Expr { expr, line } => (expr, *line),
        Stmt::Assign { .. } => return None,
    };
    let (func, args) = match expr {
        Expr::Call { func, args } => (func, args),
        _ => return None,
    };
    let kind = match func.as_ref() {
        Expr::Ident(kind) if kind != "load" => kind.clone(),
        _ => return None,
    };
    let attrs = args
        .iter()
        .filter_map(|arg| {
            let name = arg.name.as_ref()?;
            Some((name.clone(), AttrValue::from_expr(&arg.value)))
        })
        .collect();
    Some(Rule { kind, line, attrs })
}

fn parse_directives(comments: &[Comment], prefix: &str) -> Vec<Directive> {
    let pattern = format!(r"^#\s*{}:([\w-]+)\s*(.*?)\s*$", regex_lite::escape(prefix));
    let re = match regex_lite::Regex::new(&pattern) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    comments
        .iter()
        .filter_map(|c| {
            let caps = re.captures(&c.text)?;
            Some(Directive {
                key: caps.get(1)?.as_str().to_string(),
                value: caps.get(2).map(|m| m.as_str()).unwrap_or("").to_string(),
                line: c.line,
            })
        })
        .collect()
}
