//! Parse rendered SQL with libpg_query (`check` feature).
//!
//! Only [`PlaceholderStyle::Dollar`](crate::config::PlaceholderStyle::Dollar)
//! output parses; `:N` placeholders are not PostgreSQL syntax.

use crate::error::{CompileError, CompileResult};
use crate::sql::CompiledQuery;

/// What the parser saw in one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlSummary {
    /// Tables read or written, sorted, CTE names excluded.
    pub tables: Vec<String>,
    pub cte_names: Vec<String>,
}

pub fn check_sql(sql: &str) -> CompileResult<SqlSummary> {
    let parsed = pg_query::parse(sql)
        .map_err(|e| CompileError::structural(format!("rendered SQL does not parse: {e}")))?;
    let cte_names = parsed.cte_names.clone();
    let mut tables = Vec::new();
    for (node, _depth, _context, _has_filter_columns) in parsed.protobuf.nodes() {
        if let pg_query::NodeRef::RangeVar(v) = node {
            if !cte_names.contains(&v.relname) {
                tables.push(v.relname.to_string());
            }
        }
    }
    tables.sort();
    tables.dedup();
    Ok(SqlSummary { tables, cte_names })
}

impl CompiledQuery {
    /// Parse this query's SQL text.
    pub fn check(&self) -> CompileResult<SqlSummary> {
        check_sql(&self.sql)
    }
}
