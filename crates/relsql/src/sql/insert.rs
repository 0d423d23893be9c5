use super::context::{BuildContext, Render};
use super::expr::{Projection, write_projections};
use super::record::Record;
use crate::error::{CompileError, CompileResult};
use crate::ident::write_ident;

/// An INSERT statement.
///
/// When the record references columns of earlier chain elements the row is
/// produced by `INSERT … SELECT … FROM "<source>"` instead of `VALUES`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InsertStatement {
    table: Option<String>,
    record: Option<Record>,
    returning: Vec<Projection>,
}

impl InsertStatement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn record(mut self, record: Record) -> Self {
        self.record = Some(record);
        self
    }

    pub fn returning(mut self, columns: impl IntoIterator<Item = Projection>) -> Self {
        self.returning.extend(columns);
        self
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }
}

impl Render for InsertStatement {
    fn render(&self, out: &mut String, ctx: &mut BuildContext) -> CompileResult<()> {
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| CompileError::structural("INSERT requires a table"))?;
        let record = self
            .record
            .as_ref()
            .ok_or_else(|| CompileError::structural("INSERT requires a record"))?;

        out.push_str("INSERT INTO ");
        write_ident(out, table)?;

        if record.is_empty() {
            out.push_str(" DEFAULT VALUES");
        } else {
            out.push_str(" (");
            for (i, (column, _)) in record.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_ident(out, column)?;
            }
            out.push(')');

            let sources = record.sources();
            if sources.is_empty() {
                out.push_str(" VALUES (");
                for (i, (_, value)) in record.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    value.render(out, ctx)?;
                }
                out.push(')');
            } else {
                out.push_str(" SELECT ");
                for (i, (_, value)) in record.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    value.render(out, ctx)?;
                }
                out.push_str(" FROM ");
                for (i, source) in sources.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write_ident(out, source)?;
                }
            }
        }

        if !self.returning.is_empty() {
            out.push_str(" RETURNING ");
            write_projections(out, ctx, &self.returning)?;
        }
        Ok(())
    }
}
