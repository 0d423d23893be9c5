use super::condition::Condition;
use super::context::{BuildContext, Render};
use super::expr::{Projection, write_projections};
use crate::error::{CompileError, CompileResult};
use crate::ident::write_ident;

/// A DELETE statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteStatement {
    table: Option<String>,
    where_: Option<Condition>,
    returning: Vec<Projection>,
}

impl DeleteStatement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn where_opt(mut self, condition: Option<Condition>) -> Self {
        self.where_ = condition;
        self
    }

    pub fn returning(mut self, columns: impl IntoIterator<Item = Projection>) -> Self {
        self.returning.extend(columns);
        self
    }
}

impl Render for DeleteStatement {
    fn render(&self, out: &mut String, ctx: &mut BuildContext) -> CompileResult<()> {
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| CompileError::structural("DELETE requires a table"))?;
        out.push_str("DELETE FROM ");
        write_ident(out, table)?;
        if let Some(condition) = &self.where_ {
            out.push_str(" WHERE ");
            condition.render(out, ctx)?;
        }
        if !self.returning.is_empty() {
            out.push_str(" RETURNING ");
            write_projections(out, ctx, &self.returning)?;
        }
        Ok(())
    }
}
