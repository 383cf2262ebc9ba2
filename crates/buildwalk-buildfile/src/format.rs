//! Rendering parsed build files back to text.
//!
//! Output is canonical rather than faithful: directives are written first,
//! other comments are dropped, and top-level calls put one argument per line.

use std::fmt::{self, Write as _};

use crate::parser::{Arg, Clause, Expr, Stmt};
use crate::BuildFile;

const INDENT: &str = "    ";

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{} = ", name)?;
        }
        write!(f, "{}{}", self.star, self.value)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ident(name) => f.write_str(name),
            Expr::Str(s) => f.write_str(&quote(s)),
            Expr::Number(n) => f.write_str(n),
            Expr::List(items) => {
                f.write_str("[")?;
                write_joined(f, items)?;
                f.write_str("]")
            }
            Expr::Tuple(items) => {
                f.write_str("(")?;
                write_joined(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Expr::Paren(inner) => write!(f, "({})", inner),
            Expr::Dict(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Expr::Comprehension { body, clauses } => {
                write!(f, "[{}", body)?;
                for clause in clauses {
                    match clause {
                        Clause::For { vars, iter } => write!(f, " for {} in {}", vars, iter)?,
                        Clause::If(cond) => write!(f, " if {}", cond)?,
                    }
                }
                f.write_str("]")
            }
            Expr::Call { func, args } => {
                write!(f, "{}(", func)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Expr::Dot { value, name } => write!(f, "{}.{}", value, name),
            Expr::Index { value, index } => write!(f, "{}[{}]", value, index),
            Expr::Slice { value, lo, hi } => {
                write!(f, "{}[", value)?;
                if let Some(lo) = lo {
                    write!(f, "{}", lo)?;
                }
                f.write_str(":")?;
                if let Some(hi) = hi {
                    write!(f, "{}", hi)?;
                }
                f.write_str("]")
            }
            Expr::Unary { op, operand } => {
                if *op == "not" {
                    write!(f, "not {}", operand)
                } else {
                    write!(f, "{}{}", op, operand)
                }
            }
            Expr::Binary { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op, rhs),
            Expr::Conditional {
                then,
                cond,
                otherwise,
            } => write!(f, "{} if {} else {}", then, cond, otherwise),
        }
    }
}

fn format_stmt(out: &mut String, stmt: &Stmt) {
    // Writing into a String cannot fail.
    match stmt {
        Stmt::Expr {
            expr: Expr::Call { func, args },
            ..
        } if args.iter().any(|a| a.name.is_some()) => {
            let _ = writeln!(out, "{}(", func);
            for arg in args {
                let _ = writeln!(out, "{}{},", INDENT, arg);
            }
            out.push_str(")\n");
        }
        Stmt::Expr { expr, .. } => {
            let _ = writeln!(out, "{}", expr);
        }
        Stmt::Assign {
            target, op, value, ..
        } => {
            let _ = writeln!(out, "{} {} {}", target, op, value);
        }
    }
}

impl BuildFile {
    /// Render the file in canonical form.
    pub fn format(&self) -> String {
        let mut out = String::new();
        for d in &self.directives {
            if d.value.is_empty() {
                let _ = writeln!(out, "# {}:{}", self.directive_prefix, d.key);
            } else {
                let _ = writeln!(out, "# {}:{} {}", self.directive_prefix, d.key, d.value);
            }
        }
        for (i, stmt) in self.stmts.iter().enumerate() {
            if i > 0 || !self.directives.is_empty() {
                out.push('\n');
            }
            format_stmt(&mut out, stmt);
        }
        out
    }
}
