//! PostgreSQL statement builder.
//!
//! Statements are plain data: build them with the fluent constructors below,
//! then render with [`Render::build`]. Rendering takes `&self`, so the same
//! statement renders to the same text and parameters every time.
//!
//! Rendering rules shared by every statement:
//! - identifiers are always double-quoted;
//! - `null` values are inlined as `null` and never bound;
//! - every other value is bound, numbered left to right from zero.

mod condition;
mod context;
mod cte;
mod delete;
mod expr;
mod insert;
mod patch;
mod record;
mod select;
mod update;

#[cfg(test)]
mod tests;

pub use condition::{CompareOp, Condition};
pub use context::{BuildContext, CompiledQuery, Render};
pub use cte::{Chain, Statement};
pub use delete::DeleteStatement;
pub use expr::{ArithOp, ColumnRef, Direction, OrderBy, Projection, SqlExpr};
pub use insert::InsertStatement;
pub use patch::{JsonPatch, PatchMode};
pub use record::{Assignment, Record};
pub use select::{FromItem, SelectStatement};
pub use update::UpdateStatement;

/// `SELECT … FROM "table"`
pub fn select(table: impl Into<String>) -> SelectStatement {
    SelectStatement::new().from(FromItem::table(table))
}

/// `INSERT INTO "table" …`
pub fn insert(table: impl Into<String>) -> InsertStatement {
    InsertStatement::new().table(table)
}

/// `UPDATE ONLY "table" …`
pub fn update(table: impl Into<String>) -> UpdateStatement {
    UpdateStatement::new().table(table)
}

/// `DELETE FROM "table" …`
pub fn delete(table: impl Into<String>) -> DeleteStatement {
    DeleteStatement::new().table(table)
}
