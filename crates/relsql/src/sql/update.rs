use super::condition::Condition;
use super::context::{BuildContext, Render};
use super::expr::{Projection, write_projections};
use super::record::{Assignment, Record};
use crate::error::{CompileError, CompileResult};
use crate::ident::write_ident;

/// An `UPDATE ONLY` statement.
///
/// `FROM` lists the chain elements the statement joins against; any element
/// referenced by a SET value is added automatically.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateStatement {
    table: Option<String>,
    set: Vec<Assignment>,
    from: Vec<String>,
    where_: Option<Condition>,
    returning: Vec<Projection>,
}

impl UpdateStatement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Assign every column of `record`.
    pub fn record(mut self, record: Record) -> Self {
        for (column, value) in record.iter() {
            self.set.push(Assignment::column(column, value.clone()));
        }
        self
    }

    pub fn set(mut self, assignment: Assignment) -> Self {
        self.set.push(assignment);
        self
    }

    pub fn assignments(mut self, assignments: impl IntoIterator<Item = Assignment>) -> Self {
        self.set.extend(assignments);
        self
    }

    pub fn from(mut self, source: impl Into<String>) -> Self {
        let source = source.into();
        if !self.from.contains(&source) {
            self.from.push(source);
        }
        self
    }

    pub fn where_(mut self, condition: Condition) -> Self {
        self.where_ = Some(match self.where_.take() {
            Some(existing) => existing.and_also(condition),
            None => condition,
        });
        self
    }

    pub fn where_opt(self, condition: Option<Condition>) -> Self {
        match condition {
            Some(condition) => self.where_(condition),
            None => self,
        }
    }

    pub fn returning(mut self, columns: impl IntoIterator<Item = Projection>) -> Self {
        self.returning.extend(columns);
        self
    }

    fn sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = self.from.iter().map(String::as_str).collect();
        for assignment in &self.set {
            assignment.value.collect_sources(&mut sources);
        }
        sources
    }
}

impl Render for UpdateStatement {
    fn render(&self, out: &mut String, ctx: &mut BuildContext) -> CompileResult<()> {
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| CompileError::structural("UPDATE requires a table"))?;
        if self.set.is_empty() {
            return Err(CompileError::structural("UPDATE requires a record"));
        }

        out.push_str("UPDATE ONLY ");
        write_ident(out, table)?;
        out.push_str(" SET ");
        for (i, assignment) in self.set.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            assignment.target.write(out)?;
            out.push_str(" = ");
            assignment.value.render(out, ctx)?;
        }

        let sources = self.sources();
        if !sources.is_empty() {
            out.push_str(" FROM ");
            for (i, source) in sources.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_ident(out, source)?;
            }
        }
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
