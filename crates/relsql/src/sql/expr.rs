//! Value expressions.

use super::context::{BuildContext, Render};
use super::select::SelectStatement;
use crate::error::CompileResult;
use crate::ident::{write_ident, write_literal, write_qualified};
use crate::param::SqlParameter;
use serde_json::Value;

/// A (possibly qualified) column, optionally addressing keys inside a JSON value.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
    pub path: Vec<String>,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            name: name.into(),
            path: Vec::new(),
        }
    }

    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            qualifier: Some(qualifier.into()),
            name: name.into(),
            path: Vec::new(),
        }
    }

    /// Qualify with `qualifier` when one is given.
    pub fn maybe_qualified(qualifier: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            qualifier: qualifier.map(str::to_string),
            name: name.into(),
            path: Vec::new(),
        }
    }

    /// Address a key inside the JSON value of this column.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.path.push(key.into());
        self
    }

    pub fn with_path(mut self, path: Vec<String>) -> Self {
        self.path = path;
        self
    }

    /// `"q"."col"['a']['b']` (jsonb subscript form, usable as an assignment target).
    pub(crate) fn write(&self, out: &mut String) -> CompileResult<()> {
        write_qualified(out, self.qualifier.as_deref(), &self.name)?;
        for key in &self.path {
            out.push('[');
            write_literal(out, key);
            out.push(']');
        }
        Ok(())
    }

    /// `"q"."col"->'a'->>'b'` (the addressed key as text).
    pub(crate) fn write_text(&self, out: &mut String) -> CompileResult<()> {
        write_qualified(out, self.qualifier.as_deref(), &self.name)?;
        let last = self.path.len().saturating_sub(1);
        for (i, key) in self.path.iter().enumerate() {
            out.push_str(if i == last { "->>" } else { "->" });
            write_literal(out, key);
        }
        Ok(())
    }
}

/// Arithmetic operator of an atomic update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: SqlExpr,
    pub direction: Direction,
}

impl OrderBy {
    pub fn new(expr: SqlExpr, direction: Direction) -> Self {
        Self { expr, direction }
    }

    pub(crate) fn write(&self, out: &mut String, ctx: &mut BuildContext) -> CompileResult<()> {
        self.expr.render(out, ctx)?;
        out.push_str(match self.direction {
            Direction::Asc => " ASC",
            Direction::Desc => " DESC",
        });
        Ok(())
    }
}

/// A SQL value expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    /// The literal `null`; never bound.
    Null,
    /// A bound parameter.
    Param(SqlParameter),
    /// A column of the statement's own table or an alias in scope.
    Column(ColumnRef),
    /// The addressed JSON key of a column as text (`"col"->>'k'`).
    Text(ColumnRef),
    /// A column of an earlier chain element; the statement reads `FROM` it.
    Reference { source: String, column: String },
    /// Atomic arithmetic against the current value of `target`.
    ///
    /// With a JSON key path the value is read as text, cast to `cast`, and
    /// written back as `jsonb`.
    Operation {
        target: ColumnRef,
        op: ArithOp,
        operand: SqlParameter,
        cast: &'static str,
    },
    /// `(expr)::ty`
    Cast(Box<SqlExpr>, &'static str),
    /// `json_build_object('k', v, …)`
    JsonObject(Vec<(String, SqlExpr)>),
    /// `COALESCE(json_agg(v ORDER BY …), '[]'::json)`
    JsonAgg {
        value: Box<SqlExpr>,
        order: Vec<OrderBy>,
    },
    /// `COALESCE("col", '{}'::jsonb) || jsonb_build_object('k', v, …)`
    JsonbMerge {
        target: ColumnRef,
        entries: Vec<(String, SqlExpr)>,
    },
    /// A parenthesized scalar subquery.
    Subquery(Box<SelectStatement>),
    /// Trusted SQL text.
    Raw(String),
}

impl SqlExpr {
    /// Bind `value`, inlining `null`.
    pub fn value(value: impl Into<Value>) -> Self {
        match value.into() {
            Value::Null => SqlExpr::Null,
            other => SqlExpr::Param(SqlParameter::new(other)),
        }
    }

    /// Bind an already encoded parameter, inlining a `null` value.
    pub fn param(param: SqlParameter) -> Self {
        if param.value.is_null() {
            SqlExpr::Null
        } else {
            SqlExpr::Param(param)
        }
    }

    /// Bind `value` as one opaque parameter, bypassing any JSON expansion.
    pub fn raw_value(value: impl Into<Value>) -> Self {
        SqlExpr::Param(SqlParameter::new(value))
    }

    pub fn column(name: impl Into<String>) -> Self {
        SqlExpr::Column(ColumnRef::new(name))
    }

    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        SqlExpr::Column(ColumnRef::qualified(qualifier, name))
    }

    /// `"source"."column"` of an earlier chain element.
    pub fn reference(source: impl Into<String>, column: impl Into<String>) -> Self {
        SqlExpr::Reference {
            source: source.into(),
            column: column.into(),
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        SqlExpr::Raw(sql.into())
    }

    pub fn cast(self, ty: &'static str) -> Self {
        SqlExpr::Cast(Box::new(self), ty)
    }

    pub fn subquery(query: SelectStatement) -> Self {
        SqlExpr::Subquery(Box::new(query))
    }

    /// Collect the chain elements this expression reads from.
    pub(crate) fn collect_sources<'a>(&'a self, sources: &mut Vec<&'a str>) {
        match self {
            SqlExpr::Reference { source, .. } => {
                if !sources.contains(&source.as_str()) {
                    sources.push(source);
                }
            }
            SqlExpr::Cast(inner, _) => inner.collect_sources(sources),
            SqlExpr::JsonObject(entries) | SqlExpr::JsonbMerge { entries, .. } => {
                for (_, value) in entries {
                    value.collect_sources(sources);
                }
            }
            SqlExpr::JsonAgg { value, .. } => value.collect_sources(sources),
            _ => {}
        }
    }
}

impl Render for SqlExpr {
    fn render(&self, out: &mut String, ctx: &mut BuildContext) -> CompileResult<()> {
        match self {
            SqlExpr::Null => out.push_str("null"),
            SqlExpr::Param(param) => ctx.bind(out, param),
            SqlExpr::Column(column) => column.write(out)?,
            SqlExpr::Text(column) => column.write_text(out)?,
            SqlExpr::Reference { source, column } => {
                write_qualified(out, Some(source), column)?;
            }
            SqlExpr::Operation {
                target,
                op,
                operand,
                cast,
            } => {
                if target.path.is_empty() {
                    out.push('(');
                    target.write(out)?;
                    out.push(' ');
                    out.push_str(op.as_sql());
                    out.push_str(" (");
                    ctx.bind(out, operand);
                    out.push_str("))");
                } else {
                    out.push_str("((");
                    target.write_text(out)?;
                    out.push_str(")::");
                    out.push_str(cast);
                    out.push(' ');
                    out.push_str(op.as_sql());
                    out.push_str(" (");
                    ctx.bind(out, operand);
                    out.push_str(")::");
                    out.push_str(cast);
                    out.push_str(")::text::jsonb");
                }
            }
            SqlExpr::Cast(inner, ty) => {
                out.push('(');
                inner.render(out, ctx)?;
                out.push_str(")::");
                out.push_str(ty);
            }
            SqlExpr::JsonObject(entries) => {
                out.push_str("json_build_object(");
                write_entries(out, ctx, entries)?;
                out.push(')');
            }
            SqlExpr::JsonAgg { value, order } => {
                out.push_str("COALESCE(json_agg(");
                value.render(out, ctx)?;
                if !order.is_empty() {
                    out.push_str(" ORDER BY ");
                    write_order(out, ctx, order)?;
                }
                out.push_str("), '[]'::json)");
            }
            SqlExpr::JsonbMerge { target, entries } => {
                out.push_str("COALESCE(");
                target.write(out)?;
                out.push_str(", '{}'::jsonb) || jsonb_build_object(");
                write_entries(out, ctx, entries)?;
                out.push(')');
            }
            SqlExpr::Subquery(query) => {
                out.push('(');
                query.render(out, ctx)?;
                out.push(')');
            }
            SqlExpr::Raw(sql) => out.push_str(sql),
        }
        Ok(())
    }
}

fn write_entries(
    out: &mut String,
    ctx: &mut BuildContext,
    entries: &[(String, SqlExpr)],
) -> CompileResult<()> {
    for (i, (key, value)) in entries.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_literal(out, key);
        out.push_str(", ");
        value.render(out, ctx)?;
    }
    Ok(())
}

pub(crate) fn write_order(
    out: &mut String,
    ctx: &mut BuildContext,
    order: &[OrderBy],
) -> CompileResult<()> {
    for (i, item) in order.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write(out, ctx)?;
    }
    Ok(())
}

/// An output column: `expr [AS "alias"]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

impl Projection {
    pub fn new(expr: SqlExpr) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: SqlExpr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }

    /// `"qualifier"."name"`
    pub fn column(qualifier: Option<&str>, name: impl Into<String>) -> Self {
        Self::new(SqlExpr::Column(ColumnRef::maybe_qualified(qualifier, name)))
    }
}

pub(crate) fn write_projections(
    out: &mut String,
    ctx: &mut BuildContext,
    columns: &[Projection],
) -> CompileResult<()> {
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        column.expr.render(out, ctx)?;
        if let Some(alias) = &column.alias {
            out.push_str(" AS ");
            write_ident(out, alias)?;
        }
    }
    Ok(())
}
