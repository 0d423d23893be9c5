//! Statement chains rendered as a single `WITH` query.
//!
//! Every element except the last becomes a named CTE (`"R0"`, `"R1"`, …); the
//! last element is the body. Elements only read from earlier elements, so the
//! rendered order is also the execution order.
//!
//! ```
//! use relsql::sql::{self, Chain, Record, Render, SqlExpr};
//!
//! let mut chain = Chain::new("R");
//! let parent = chain.push(
//!     sql::insert("users")
//!         .record(Record::new().with("name", SqlExpr::value("ann")))
//!         .returning([sql::Projection::column(None, "id")]),
//! );
//! chain.push(
//!     sql::insert("posts")
//!         .record(Record::new().with("title", SqlExpr::value("hi")).with("userId", SqlExpr::reference(&parent, "id"))),
//! );
//!
//! let compiled = chain.build().unwrap();
//! assert_eq!(
//!     compiled.sql,
//!     r#"WITH "R0" AS (INSERT INTO "users" ("name") VALUES (:0) RETURNING "id") INSERT INTO "posts" ("title","userId") SELECT :1, "R0"."id" FROM "R0""#,
//! );
//! ```

use super::context::{BuildContext, Render};
use super::delete::DeleteStatement;
use super::insert::InsertStatement;
use super::select::SelectStatement;
use super::update::UpdateStatement;
use crate::error::{CompileError, CompileResult};
use crate::ident::write_ident;

/// Any statement that can take part in a chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

impl Statement {
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Select(_) => "select",
            Statement::Insert(_) => "insert",
            Statement::Update(_) => "update",
            Statement::Delete(_) => "delete",
        }
    }
}

impl Render for Statement {
    fn render(&self, out: &mut String, ctx: &mut BuildContext) -> CompileResult<()> {
        match self {
            Statement::Select(s) => s.render(out, ctx),
            Statement::Insert(s) => s.render(out, ctx),
            Statement::Update(s) => s.render(out, ctx),
            Statement::Delete(s) => s.render(out, ctx),
        }
    }
}

impl From<SelectStatement> for Statement {
    fn from(s: SelectStatement) -> Self {
        Statement::Select(s)
    }
}

impl From<InsertStatement> for Statement {
    fn from(s: InsertStatement) -> Self {
        Statement::Insert(s)
    }
}

impl From<UpdateStatement> for Statement {
    fn from(s: UpdateStatement) -> Self {
        Statement::Update(s)
    }
}

impl From<DeleteStatement> for Statement {
    fn from(s: DeleteStatement) -> Self {
        Statement::Delete(s)
    }
}

/// An ordered list of statements; element `i` is named `"<prefix>i"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    prefix: String,
    statements: Vec<Statement>,
}

impl Chain {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            statements: Vec::new(),
        }
    }

    /// Build a chain from a complete statement list.
    pub fn with(statements: Vec<Statement>, prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            statements,
        }
    }

    /// The name the next pushed statement will get.
    pub fn next_alias(&self) -> String {
        self.alias(self.statements.len())
    }

    pub fn alias(&self, index: usize) -> String {
        format!("{}{}", self.prefix, index)
    }

    /// Append a statement and return its name.
    pub fn push(&mut self, statement: impl Into<Statement>) -> String {
        let alias = self.next_alias();
        self.statements.push(statement.into());
        alias
    }

    /// Name of the most recently pushed statement.
    pub fn last_alias(&self) -> Option<String> {
        self.statements.len().checked_sub(1).map(|i| self.alias(i))
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }
}

impl Render for Chain {
    fn render(&self, out: &mut String, ctx: &mut BuildContext) -> CompileResult<()> {
        let Some((body, ctes)) = self.statements.split_last() else {
            return Err(CompileError::structural("statement chain is empty"));
        };
        if !ctes.is_empty() {
            out.push_str("WITH ");
            for (i, statement) in ctes.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_ident(out, &self.alias(i))?;
                out.push_str(" AS (");
                statement.render(out, ctx)?;
                out.push(')');
            }
            out.push(' ');
        }
        body.render(out, ctx)
    }
}
