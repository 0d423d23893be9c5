//! Boolean expressions for WHERE clauses.
//!
//! [`Condition`] is a tree: `And`/`Or`/`Not` groups over leaf predicates.
//! Rendering binds parameters in textual order through the shared
//! [`BuildContext`], so a condition can sit anywhere in a statement.

use super::context::{BuildContext, Render};
use super::expr::{ColumnRef, SqlExpr};
use super::select::SelectStatement;
use crate::error::CompileResult;
use crate::ident::write_literal;

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    /// jsonb containment (`@>`).
    Contains,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Like => "LIKE",
            CompareOp::Contains => "@>",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// All children hold. Empty renders `TRUE`.
    And(Vec<Condition>),
    /// Any child holds. Empty renders `FALSE`.
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Compare {
        left: SqlExpr,
        op: CompareOp,
        right: SqlExpr,
    },
    NullCheck {
        expr: SqlExpr,
        is_null: bool,
    },
    /// `expr IN (…)`; an empty list is always false.
    InList {
        expr: SqlExpr,
        values: Vec<SqlExpr>,
    },
    Between {
        expr: SqlExpr,
        low: SqlExpr,
        high: SqlExpr,
    },
    /// `starts_with(expr, prefix)`
    StartsWith {
        expr: SqlExpr,
        prefix: SqlExpr,
    },
    /// `strpos(expr, needle) > 0`; the needle is matched literally.
    ContainsText {
        expr: SqlExpr,
        needle: SqlExpr,
    },
    /// jsonb key existence: `"col"['a'] ? 'b'`.
    HasKey {
        column: ColumnRef,
        key: String,
    },
    Exists {
        query: Box<SelectStatement>,
        negated: bool,
    },
    Raw(String),
}

impl Condition {
    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition::And(conditions)
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition::Or(conditions)
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    pub fn compare(left: SqlExpr, op: CompareOp, right: SqlExpr) -> Self {
        Condition::Compare { left, op, right }
    }

    pub fn eq(left: SqlExpr, right: SqlExpr) -> Self {
        Self::compare(left, CompareOp::Eq, right)
    }

    pub fn is_null(expr: SqlExpr) -> Self {
        Condition::NullCheck {
            expr,
            is_null: true,
        }
    }

    pub fn is_not_null(expr: SqlExpr) -> Self {
        Condition::NullCheck {
            expr,
            is_null: false,
        }
    }

    pub fn exists(query: SelectStatement) -> Self {
        Condition::Exists {
            query: Box::new(query),
            negated: false,
        }
    }

    pub fn not_exists(query: SelectStatement) -> Self {
        Condition::Exists {
            query: Box::new(query),
            negated: true,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Condition::Raw(sql.into())
    }

    /// Combine two conditions with AND, flattening nested groups.
    pub fn and_also(self, other: Condition) -> Self {
        let mut items = match self {
            Condition::And(items) => items,
            single => vec![single],
        };
        match other {
            Condition::And(more) => items.extend(more),
            single => items.push(single),
        }
        Condition::And(items)
    }

    /// Collapse a list of conditions: none gives `None`, one gives itself.
    pub fn all(mut conditions: Vec<Condition>) -> Option<Condition> {
        match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(Condition::And(conditions)),
        }
    }

    fn write_and(&self, out: &mut String, ctx: &mut BuildContext, first: &mut bool) -> CompileResult<()> {
        match self {
            Condition::And(items) => {
                for item in items {
                    item.write_and(out, ctx, first)?;
                }
            }
            other => {
                if !*first {
                    out.push_str(" AND ");
                }
                *first = false;
                other.render(out, ctx)?;
            }
        }
        Ok(())
    }
}

impl Render for Condition {
    fn render(&self, out: &mut String, ctx: &mut BuildContext) -> CompileResult<()> {
        match self {
            Condition::And(_) => {
                let mut first = true;
                self.write_and(out, ctx, &mut first)?;
                if first {
                    out.push_str("TRUE");
                }
            }
            Condition::Or(items) => {
                if items.is_empty() {
                    out.push_str("FALSE");
                    return Ok(());
                }
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" OR ");
                    }
                    out.push('(');
                    item.render(out, ctx)?;
                    out.push(')');
                }
                out.push(')');
            }
            Condition::Not(inner) => {
                out.push_str("NOT (");
                inner.render(out, ctx)?;
                out.push(')');
            }
            Condition::Compare { left, op, right } => {
                left.render(out, ctx)?;
                out.push(' ');
                out.push_str(op.as_sql());
                out.push(' ');
                right.render(out, ctx)?;
            }
            Condition::NullCheck { expr, is_null } => {
                expr.render(out, ctx)?;
                out.push_str(if *is_null { " IS NULL" } else { " IS NOT NULL" });
            }
            Condition::InList { expr, values } => {
                if values.is_empty() {
                    out.push_str("FALSE");
                    return Ok(());
                }
                expr.render(out, ctx)?;
                out.push_str(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    value.render(out, ctx)?;
                }
                out.push(')');
            }
            Condition::Between { expr, low, high } => {
                expr.render(out, ctx)?;
                out.push_str(" BETWEEN ");
                low.render(out, ctx)?;
                out.push_str(" AND ");
                high.render(out, ctx)?;
            }
            Condition::StartsWith { expr, prefix } => {
                out.push_str("starts_with(");
                expr.render(out, ctx)?;
                out.push_str(", ");
                prefix.render(out, ctx)?;
                out.push(')');
            }
            Condition::ContainsText { expr, needle } => {
                out.push_str("strpos(");
                expr.render(out, ctx)?;
                out.push_str(", ");
                needle.render(out, ctx)?;
                out.push_str(") > 0");
            }
            Condition::HasKey { column, key } => {
                column.write(out)?;
                out.push_str(" ? ");
                write_literal(out, key);
            }
            Condition::Exists { query, negated } => {
                if *negated {
                    out.push_str("NOT ");
                }
                out.push_str("EXISTS (");
                query.render(out, ctx)?;
                out.push(')');
            }
            Condition::Raw(sql) => out.push_str(sql),
        }
        Ok(())
    }
}
