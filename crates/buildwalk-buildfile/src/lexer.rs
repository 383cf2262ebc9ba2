//! Tokenizer for the Starlark subset used in BUILD files.
//!
//! Newlines are significant only outside brackets, where they terminate
//! statements. Comments are not tokens; they are collected separately so
//! directives can be read from them.

use std::path::Path;

use crate::error::ParseError;

/// Multi-character punctuation, longest first.
const PUNCT2: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=", "->",
];

const PUNCT1: &[&str] = &[
    "(", ")", "[", "]", "{", "}", ",", ":", ";", ".", "=", "+", "-", "*", "/", "%", "<", ">",
    "|", "&", "^", "~",
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Str(String),
    Number(String),
    Punct(&'static str),
    Newline,
    Eof,
}

#[derive(Debug, Clone)]
pub(crate) struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

/// A `#` comment, with the text starting at the `#`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub line: usize,
    pub text: String,
}

#[derive(Debug)]
pub(crate) struct Lexed {
    pub tokens: Vec<Spanned>,
    pub comments: Vec<Comment>,
}

struct Lexer<'a> {
    path: &'a Path,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    /// Open brackets with their positions, innermost last.
    open: Vec<(char, usize, usize)>,
    tokens: Vec<Spanned>,
    comments: Vec<Comment>,
}

pub(crate) fn tokenize(path: &Path, src: &str) -> Result<Lexed, ParseError> {
    let mut lexer = Lexer {
        path,
        chars: src.chars().collect(),
        pos: 0,
        line: 1,
        column: 1,
        open: Vec::new(),
        tokens: Vec::new(),
        comments: Vec::new(),
    };
    lexer.run()?;
    Ok(Lexed {
        tokens: lexer.tokens,
        comments: lexer.comments,
    })
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> ParseError {
        ParseError::new(self.path, line, column, message)
    }

    fn push(&mut self, token: Token, line: usize, column: usize) {
        self.tokens.push(Spanned {
            token,
            line,
            column,
        });
    }

    fn run(&mut self) -> Result<(), ParseError> {
        while let Some(c) = self.peek() {
            let (line, column) = (self.line, self.column);
            match c {
                '\n' => {
                    self.bump();
                    let last_is_newline = matches!(
                        self.tokens.last().map(|t| &t.token),
                        None | Some(Token::Newline)
                    );
                    if self.open.is_empty() && !last_is_newline {
                        self.push(Token::Newline, line, column);
                    }
                }
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.bump();
                    self.bump();
                }
                '#' => self.comment(line),
                '"' | '\'' => {
                    let value = self.string(false)?;
                    self.push(Token::Str(value), line, column);
                }
                'r' | 'b' if matches!(self.peek_at(1), Some('"' | '\'')) => {
                    let raw = c == 'r';
                    self.bump();
                    let value = self.string(raw)?;
                    self.push(Token::Str(value), line, column);
                }
                c if c.is_ascii_digit() => {
                    let value = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
                    self.push(Token::Number(value), line, column);
                }
                c if c.is_alphabetic() || c == '_' => {
                    let value = self.take_while(|c| c.is_alphanumeric() || c == '_');
                    self.push(Token::Ident(value), line, column);
                }
                _ => self.punct(line, column)?,
            }
        }

        if let Some(&(bracket, line, column)) = self.open.last() {
            return Err(self.error(
                line,
                column,
                format!("unexpected end of file: unclosed '{}'", bracket),
            ));
        }
        let (line, column) = (self.line, self.column);
        if !matches!(self.tokens.last().map(|t| &t.token), None | Some(Token::Newline)) {
            self.push(Token::Newline, line, column);
        }
        self.push(Token::Eof, line, column);
        Ok(())
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    fn comment(&mut self, line: usize) {
        let text = self.take_while(|c| c != '\n');
        self.comments.push(Comment {
            line,
            text: text.trim_end().to_string(),
        });
    }

    fn string(&mut self, raw: bool) -> Result<String, ParseError> {
        let (line, column) = (self.line, self.column);
        let quote = match self.bump() {
            Some(q) => q,
            None => return Err(self.error(line, column, "expected string")),
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut out = String::new();
        loop {
            let c = match self.bump() {
                Some(c) => c,
                None => return Err(self.error(line, column, "unterminated string literal")),
            };
            if c == quote {
                if !triple {
                    return Ok(out);
                }
                if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                    self.bump();
                    self.bump();
                    return Ok(out);
                }
                out.push(c);
                continue;
            }
            if c == '\n' && !triple {
                return Err(self.error(line, column, "unterminated string literal"));
            }
            if c == '\\' {
                let next = match self.bump() {
                    Some(n) => n,
                    None => return Err(self.error(line, column, "unterminated string literal")),
                };
                if raw {
                    out.push('\\');
                    out.push(next);
                    continue;
                }
                match next {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    '\\' | '"' | '\'' => out.push(next),
                    '\n' => {}
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
                continue;
            }
            out.push(c);
        }
    }

    fn punct(&mut self, line: usize, column: usize) -> Result<(), ParseError> {
        let two: String = self.chars[self.pos..].iter().take(2).collect();
        let p = PUNCT2
            .iter()
            .find(|p| **p == two)
            .or_else(|| PUNCT1.iter().find(|p| two.starts_with(**p)))
            .copied();
        let p = match p {
            Some(p) => p,
            None => {
                let c = self.peek().unwrap_or(' ');
                return Err(self.error(line, column, format!("unexpected character '{}'", c)));
            }
        };
        for _ in 0..p.chars().count() {
            self.bump();
        }

        match p {
            "(" | "[" | "{" => self.open.push((p.chars().next().unwrap_or('('), line, column)),
            ")" | "]" | "}" => {
                let expected = match p {
                    ")" => '(',
                    "]" => '[',
                    _ => '{',
                };
                match self.open.pop() {
                    Some((open, _, _)) if open == expected => {}
                    _ => return Err(self.error(line, column, format!("unexpected '{}'", p))),
                }
            }
            _ => {}
        }
        self.push(Token::Punct(p), line, column);
        Ok(())
    }
}
