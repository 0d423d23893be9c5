//! SQL identifier and literal quoting.
//!
//! Every identifier emitted by the builder is double-quoted, with embedded `"`
//! escaped as `""`. String literals (JSON keys, path segments) are single-quoted
//! with embedded `'` escaped as `''`.
//!
//! # Example
//! ```
//! use relsql::ident::{Ident, quote_ident};
//!
//! assert_eq!(quote_ident("users").unwrap(), r#""users""#);
//! assert_eq!(Ident::new(r#"we"ird"#).unwrap().to_sql(), r#""we""ird""#);
//! ```

use crate::error::{CompileError, CompileResult};

/// A validated SQL identifier (table, column, alias or CTE name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    /// Validate `name` as an identifier.
    ///
    /// Any character is allowed except NUL; the name can't be empty.
    pub fn new(name: impl Into<String>) -> CompileResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(CompileError::structural("identifier cannot be empty"));
        }
        if name.contains('\0') {
            return Err(CompileError::structural(
                "identifier cannot contain NUL character",
            ));
        }
        Ok(Self(name))
    }

    /// The raw (unquoted) name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render the identifier as quoted SQL.
    pub fn to_sql(&self) -> String {
        let mut out = String::with_capacity(self.0.len() + 2);
        self.write_sql(&mut out);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        out.push('"');
        for ch in self.0.chars() {
            if ch == '"' {
                out.push('"');
                out.push('"');
            } else {
                out.push(ch);
            }
        }
        out.push('"');
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Quote `name` as an identifier.
pub fn quote_ident(name: &str) -> CompileResult<String> {
    Ok(Ident::new(name)?.to_sql())
}

/// Append `name` as a quoted identifier.
pub(crate) fn write_ident(out: &mut String, name: &str) -> CompileResult<()> {
    Ident::new(name)?.write_sql(out);
    Ok(())
}

/// Append `"qualifier"."name"`, or just `"name"` without a qualifier.
pub(crate) fn write_qualified(
    out: &mut String,
    qualifier: Option<&str>,
    name: &str,
) -> CompileResult<()> {
    if let Some(qualifier) = qualifier {
        write_ident(out, qualifier)?;
        out.push('.');
    }
    write_ident(out, name)
}

/// Append `value` as a single-quoted SQL string literal.
pub(crate) fn write_literal(out: &mut String, value: &str) {
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push('\'');
            out.push('\'');
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
}
