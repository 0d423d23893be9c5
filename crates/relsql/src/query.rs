//! Query descriptions and the [`QueryCompiler`] facade.
//!
//! The query types mirror the JSON a table client sends (`where` is spelled
//! `filter` on the Rust side):
//!
//! ```
//! use relsql::query::SelectQuery;
//! use serde_json::json;
//!
//! let query: SelectQuery = serde_json::from_value(json!({
//!     "select": { "id": true },
//!     "where": { "name": { "startsWith": "A" } },
//!     "take": 10
//! }))
//! .unwrap();
//! assert_eq!(query.take, Some(10));
//! assert!(query.filter.is_some());
//! ```

use crate::config::CompilerConfig;
use crate::error::{CompileResult, join_path};
use crate::insert::InsertCompiler;
use crate::projection::{ProjectionCompiler, compile_order};
use crate::relation::RelationRepository;
use crate::sql::{self, CompiledQuery, Projection, Render, SelectStatement, SqlExpr};
use crate::update::UpdateCompiler;
use crate::validate::{RecordValidator, SchemaValidator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// `{ data, select?, include? }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsertQuery {
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Value>,
}

impl InsertQuery {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    pub fn select(mut self, select: Value) -> Self {
        self.select = Some(select);
        self
    }
}

/// `{ data, where?, select?, include? }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateQuery {
    pub data: Value,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Value>,
}

impl UpdateQuery {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn select(mut self, select: Value) -> Self {
        self.select = Some(select);
        self
    }
}

/// `{ select?, where?, include?, order?, skip?, take? }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Value>,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take: Option<u64>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, select: Value) -> Self {
        self.select = Some(select);
        self
    }

    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn include(mut self, include: Value) -> Self {
        self.include = Some(include);
        self
    }

    pub fn order(mut self, order: Value) -> Self {
        self.order = Some(order);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: u64) -> Self {
        self.take = Some(take);
        self
    }
}

/// `{ where?, select?, include? }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteQuery {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Value>,
}

/// `{ where? }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CountQuery {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
}

/// Compiles query descriptions against one relation repository.
///
/// Every call starts from fresh parameter and alias counters, so one compiler
/// can be shared across threads.
#[derive(Clone)]
pub struct QueryCompiler<'a> {
    repository: &'a RelationRepository,
    config: CompilerConfig,
    validator: Arc<dyn RecordValidator>,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(repository: &'a RelationRepository) -> Self {
        Self {
            repository,
            config: CompilerConfig::default(),
            validator: Arc::new(SchemaValidator),
        }
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default [`SchemaValidator`].
    pub fn with_validator(mut self, validator: impl RecordValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn repository(&self) -> &'a RelationRepository {
        self.repository
    }

    pub fn insert(&self, table: &str, query: &InsertQuery) -> CompileResult<CompiledQuery> {
        let chain = InsertCompiler::new(self.repository, self.validator.as_ref(), &self.config)
            .compile(table, &query.data, query.select.as_ref(), query.include.as_ref())?;
        self.finish(table, "insert", chain.len(), &chain)
    }

    pub fn update(&self, table: &str, query: &UpdateQuery) -> CompileResult<CompiledQuery> {
        let chain = UpdateCompiler::new(self.repository, self.validator.as_ref(), &self.config)
            .compile(
                table,
                &query.data,
                query.filter.as_ref(),
                query.select.as_ref(),
                query.include.as_ref(),
            )?;
        self.finish(table, "update", chain.len(), &chain)
    }

    pub fn select(&self, table: &str, query: &SelectQuery) -> CompileResult<CompiledQuery> {
        let statement = self.select_statement(table, query)?;
        self.finish(table, "select", 1, &statement)
    }

    /// Like [`select`](Self::select), limited to one row.
    pub fn find_one(&self, table: &str, query: &SelectQuery) -> CompileResult<CompiledQuery> {
        let query = SelectQuery {
            take: Some(1),
            ..query.clone()
        };
        let statement = self.select_statement(table, &query)?;
        self.finish(table, "find_one", 1, &statement)
    }

    /// `DELETE FROM "table" [WHERE …] [RETURNING …]`. Without a filter every row is deleted.
    pub fn delete(&self, table: &str, query: &DeleteQuery) -> CompileResult<CompiledQuery> {
        let mut projections = ProjectionCompiler::new(self.repository, &self.config);
        let condition = match &query.filter {
            Some(filter) => projections.filters().compile(filter, table, None)?,
            None => None,
        };
        let mut statement = sql::delete(table).where_opt(condition);
        if query.select.is_some() || query.include.is_some() {
            statement = statement.returning(projections.compile(
                query.select.as_ref(),
                query.include.as_ref(),
                table,
                table,
            )?);
        }
        self.finish(table, "delete", 1, &statement)
    }

    /// `SELECT COUNT(1) AS "count" FROM "table" [WHERE …]`
    pub fn count(&self, table: &str, query: &CountQuery) -> CompileResult<CompiledQuery> {
        let mut projections = ProjectionCompiler::new(self.repository, &self.config);
        let condition = match &query.filter {
            Some(filter) => projections.filters().compile(filter, table, None)?,
            None => None,
        };
        let statement = sql::select(table)
            .column(Projection::aliased(SqlExpr::raw("COUNT(1)"), "count"))
            .where_opt(condition);
        self.finish(table, "count", 1, &statement)
    }

    fn select_statement(&self, table: &str, query: &SelectQuery) -> CompileResult<SelectStatement> {
        let info = self.repository.table(table)?;
        let mut projections = ProjectionCompiler::new(self.repository, &self.config);
        let columns = projections.compile(
            query.select.as_ref(),
            query.include.as_ref(),
            table,
            table,
        )?;
        let condition = match &query.filter {
            Some(filter) => projections.filters().compile(filter, table, Some(table))?,
            None => None,
        };
        let order = match &query.order {
            Some(order) => compile_order(order, info, Some(table), &join_path(table, "order"))?,
            None => Vec::new(),
        };

        let mut statement = sql::select(table)
            .columns(columns)
            .where_opt(condition)
            .order(order);
        if let Some(take) = query.take {
            statement = statement.limit(take);
        }
        if let Some(skip) = query.skip {
            statement = statement.offset(skip);
        }
        Ok(statement)
    }

    fn finish(
        &self,
        table: &str,
        operation: &'static str,
        statements: usize,
        statement: &impl Render,
    ) -> CompileResult<CompiledQuery> {
        let compiled = statement.build_with(self.config.placeholder_style)?;
        debug!(
            target: "relsql.compile",
            table,
            operation,
            statements,
            param_count = compiled.params.len(),
            "compiled query"
        );
        trace!(target: "relsql.sql", sql = %self.truncate_sql(&compiled.sql));
        Ok(compiled)
    }

    fn truncate_sql<'s>(&self, sql: &'s str) -> std::borrow::Cow<'s, str> {
        match self.config.max_logged_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_bytes(sql, max)).into(),
            _ => sql.into(),
        }
    }
}

fn truncate_bytes(sql: &str, max_bytes: usize) -> &str {
    let mut end = max_bytes.min(sql.len());
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}
