use super::condition::Condition;
use super::context::{BuildContext, Render};
use super::expr::{OrderBy, Projection, SqlExpr, write_order, write_projections};
use crate::error::CompileResult;
use crate::ident::write_ident;

/// The `FROM` item of a SELECT.
#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    /// `"table" [AS "alias"]`
    Table { name: String, alias: Option<String> },
    /// `(SELECT …) AS "alias"`
    Subquery {
        query: Box<SelectStatement>,
        alias: String,
    },
    /// `(SELECT * FROM "R1" UNION ALL SELECT * FROM "R2") AS "alias"`
    UnionAll { sources: Vec<String>, alias: String },
}

impl FromItem {
    pub fn table(name: impl Into<String>) -> Self {
        FromItem::Table {
            name: name.into(),
            alias: None,
        }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        FromItem::Table {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }

    /// The name other clauses use to qualify columns of this item.
    pub fn scope(&self) -> &str {
        match self {
            FromItem::Table { name, alias } => alias.as_deref().unwrap_or(name),
            FromItem::Subquery { alias, .. } | FromItem::UnionAll { alias, .. } => alias,
        }
    }

    fn write(&self, out: &mut String, ctx: &mut BuildContext) -> CompileResult<()> {
        match self {
            FromItem::Table { name, alias } => {
                write_ident(out, name)?;
                if let Some(alias) = alias {
                    out.push_str(" AS ");
                    write_ident(out, alias)?;
                }
            }
            FromItem::Subquery { query, alias } => {
                out.push('(');
                query.render(out, ctx)?;
                out.push_str(") AS ");
                write_ident(out, alias)?;
            }
            FromItem::UnionAll { sources, alias } => {
                out.push('(');
                for (i, source) in sources.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" UNION ALL ");
                    }
                    out.push_str("SELECT * FROM ");
                    write_ident(out, source)?;
                }
                out.push_str(") AS ");
                write_ident(out, alias)?;
            }
        }
        Ok(())
    }
}

/// A SELECT statement.
///
/// ```
/// use relsql::sql::{self, Render, SqlExpr, Condition, Projection};
///
/// let query = sql::select("users")
///     .column(Projection::column(None, "id"))
///     .where_(Condition::eq(SqlExpr::column("name"), SqlExpr::value("ann")))
///     .limit(10);
/// let compiled = query.build().unwrap();
/// assert_eq!(compiled.sql, r#"SELECT "id" FROM "users" WHERE "name" = :0 LIMIT :1"#);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStatement {
    columns: Vec<Projection>,
    from: Option<FromItem>,
    where_: Option<Condition>,
    order: Vec<OrderBy>,
    limit: Option<SqlExpr>,
    offset: Option<SqlExpr>,
}

impl SelectStatement {
    /// A SELECT without a FROM clause.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(mut self, from: FromItem) -> Self {
        self.from = Some(from);
        self
    }

    pub fn column(mut self, column: Projection) -> Self {
        self.columns.push(column);
        self
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = Projection>) -> Self {
        self.columns.extend(columns);
        self
    }

    /// Add a WHERE condition (AND-ed with any existing one).
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

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    pub fn order(mut self, order: impl IntoIterator<Item = OrderBy>) -> Self {
        self.order.extend(order);
        self
    }

    /// Bound `LIMIT`.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(SqlExpr::value(limit));
        self
    }

    /// Bound `OFFSET`.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(SqlExpr::value(offset));
        self
    }

    pub fn has_pagination(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    pub fn from_item(&self) -> Option<&FromItem> {
        self.from.as_ref()
    }
}

impl Render for SelectStatement {
    fn render(&self, out: &mut String, ctx: &mut BuildContext) -> CompileResult<()> {
        out.push_str("SELECT ");
        if self.columns.is_empty() {
            out.push('*');
        } else {
            write_projections(out, ctx, &self.columns)?;
        }
        if let Some(from) = &self.from {
            out.push_str(" FROM ");
            from.write(out, ctx)?;
        }
        if let Some(condition) = &self.where_ {
            out.push_str(" WHERE ");
            condition.render(out, ctx)?;
        }
        if !self.order.is_empty() {
            out.push_str(" ORDER BY ");
            write_order(out, ctx, &self.order)?;
        }
        if let Some(limit) = &self.limit {
            out.push_str(" LIMIT ");
            limit.render(out, ctx)?;
        }
        if let Some(offset) = &self.offset {
            out.push_str(" OFFSET ");
            offset.render(out, ctx)?;
        }
        Ok(())
    }
}
