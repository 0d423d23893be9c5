//! Projection (SELECT list) compiler.
//!
//! A select tree maps field names to `true`/`false`, relation aliases to
//! `true` (all related fields) or a nested select tree, and object columns to
//! a select tree over their JSON keys. An include tree maps relation aliases
//! to `true` or to options:
//!
//! ```json
//! { "posts": { "where": {…}, "order": {"createdAt": "desc"}, "skip": 0, "take": 10,
//!              "select": {…}, "include": {…} } }
//! ```
//!
//! Relations become correlated subqueries: singular relations yield one
//! `json_build_object(…)`, plural relations a `COALESCE(json_agg(…), '[]'::json)`.

use crate::alias::AliasGenerator;
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult, join_path};
use crate::filter::FilterCompiler;
use crate::relation::{Relation, RelationRepository, TableInfo};
use crate::schema::{FieldSchema, ObjectSchema};
use crate::sql::{ColumnRef, Direction, FromItem, OrderBy, Projection, SelectStatement, SqlExpr};
use serde_json::{Map, Value};

/// Options of one include entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct IncludeOptions<'v> {
    pub filter: Option<&'v Value>,
    pub order: Option<&'v Value>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub select: Option<&'v Value>,
    pub include: Option<&'v Value>,
}

impl<'v> IncludeOptions<'v> {
    pub fn parse(value: Option<&'v Value>, path: &str) -> CompileResult<Self> {
        let mut options = Self::default();
        let map = match value {
            None | Some(Value::Bool(true)) => return Ok(options),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(CompileError::malformed(
                    path,
                    "include entry must be true or an object",
                ));
            }
        };
        for (key, value) in map {
            let key_path = join_path(path, key);
            match key.as_str() {
                "where" => options.filter = Some(value),
                "order" => options.order = Some(value),
                "skip" => options.skip = Some(parse_count(value, &key_path)?),
                "take" => options.take = Some(parse_count(value, &key_path)?),
                "select" => options.select = Some(value),
                "include" => options.include = Some(value),
                _ => return Err(CompileError::unexpected_field(key_path)),
            }
        }
        Ok(options)
    }

    pub fn is_paginated(&self) -> bool {
        self.skip.is_some() || self.take.is_some()
    }
}

/// Compiles select/include trees; owns the alias counters of its subqueries.
pub struct ProjectionCompiler<'a> {
    repository: &'a RelationRepository,
    aliases: AliasGenerator,
    filters: FilterCompiler<'a>,
}

impl<'a> ProjectionCompiler<'a> {
    pub fn new(repository: &'a RelationRepository, config: &CompilerConfig) -> Self {
        Self {
            repository,
            aliases: AliasGenerator::new(config.select_alias_prefix.clone()),
            filters: FilterCompiler::new(repository, &config.filter_alias_prefix),
        }
    }

    /// The filter compiler sharing this projection's alias space.
    pub fn filters(&mut self) -> &mut FilterCompiler<'a> {
        &mut self.filters
    }

    pub fn repository(&self) -> &'a RelationRepository {
        self.repository
    }

    /// Reserve a subquery alias.
    pub(crate) fn next_alias(&mut self) -> String {
        self.aliases.next_alias()
    }

    /// Output columns for `table`, qualified with `scope`.
    ///
    /// Without a select tree every column of the table is projected.
    pub fn compile(
        &mut self,
        select: Option<&Value>,
        include: Option<&Value>,
        table: &str,
        scope: &str,
    ) -> CompileResult<Vec<Projection>> {
        let repository = self.repository;
        let info = repository.table(table)?;
        let fields = self.fields(select, include, info, scope, table)?;
        Ok(fields
            .into_iter()
            .map(|(name, expr)| match &expr {
                SqlExpr::Column(column) if column.path.is_empty() && column.name == name => {
                    Projection::new(expr)
                }
                _ => Projection::aliased(expr, name),
            })
            .collect())
    }

    /// Named expressions for every selected field and relation.
    pub(crate) fn fields(
        &mut self,
        select: Option<&Value>,
        include: Option<&Value>,
        table: &TableInfo,
        scope: &str,
        path: &str,
    ) -> CompileResult<Vec<(String, SqlExpr)>> {
        let includes = include_map(include, table, path)?;
        let mut fields = Vec::new();

        match select {
            None => {
                for name in table.schema.field_names() {
                    fields.push((name.to_string(), column(scope, name)));
                }
            }
            Some(Value::Object(map)) => {
                for (key, value) in map {
                    let key_path = join_path(path, key);
                    if let Some(relation) = table.relation(key) {
                        let selection = match value {
                            Value::Bool(false) => continue,
                            Value::Bool(true) => None,
                            Value::Object(_) => Some(value),
                            _ => {
                                return Err(CompileError::malformed(
                                    key_path,
                                    "relation selection must be a boolean or an object",
                                ));
                            }
                        };
                        let options = lookup(&includes, key);
                        let expr = self.relation(relation, selection, options, scope, &key_path)?;
                        fields.push((key.clone(), expr));
                        continue;
                    }

                    let field = table.schema.field(key, path)?;
                    match value {
                        Value::Bool(false) => {}
                        Value::Bool(true) => fields.push((key.clone(), column(scope, key))),
                        Value::Object(sub) if field.is_object() => {
                            let base = ColumnRef::qualified(scope, key.as_str());
                            fields.push((key.clone(), json_fields(sub, field, base, &key_path)?));
                        }
                        _ => {
                            return Err(CompileError::malformed(
                                key_path,
                                "field selection must be a boolean",
                            ));
                        }
                    }
                }
            }
            Some(_) => return Err(CompileError::malformed(path, "select must be an object")),
        }

        // Included relations not named in the select tree.
        for (alias, options) in &includes {
            if fields.iter().any(|(name, _)| name.as_str() == *alias) {
                continue;
            }
            if select
                .and_then(Value::as_object)
                .is_some_and(|map| map.contains_key(*alias))
            {
                continue;
            }
            let key_path = join_path(path, alias);
            let relation = table
                .relation(alias)
                .ok_or_else(|| CompileError::malformed(&key_path, "not a relation"))?;
            let expr = self.relation(relation, None, *options, scope, &key_path)?;
            fields.push((alias.to_string(), expr));
        }

        Ok(fields)
    }

    /// Correlated subquery for one relation, joined to `outer`.
    pub(crate) fn relation(
        &mut self,
        relation: &Relation,
        selection: Option<&Value>,
        include: Option<&Value>,
        outer: &str,
        path: &str,
    ) -> CompileResult<SqlExpr> {
        let repository = self.repository;
        let related = repository.table(&relation.related_table)?;
        let options = IncludeOptions::parse(include, path)?;
        let inner = self.aliases.next_alias();

        let selection = selection.or(options.select);
        let object = SqlExpr::JsonObject(self.fields(selection, options.include, related, &inner, path)?);

        let mut condition = relation.join(&inner, outer);
        if let Some(filter) = options.filter {
            let filter_path = join_path(path, "where");
            if let Some(extra) = self.filters.compile_in(filter, related, Some(&inner), &filter_path)? {
                condition = condition.and_also(extra);
            }
        }
        let order = match options.order {
            Some(order) => compile_order(order, related, Some(&inner), &join_path(path, "order"))?,
            None => Vec::new(),
        };

        let query = if relation.shape.is_singular() {
            SelectStatement::new()
                .column(Projection::new(object))
                .from(FromItem::aliased(&relation.related_table, &inner))
                .where_(condition)
                .order(order)
        } else if options.is_paginated() {
            let mut page = SelectStatement::new()
                .from(FromItem::aliased(&relation.related_table, &inner))
                .where_(condition)
                .order(order.clone());
            if let Some(take) = options.take {
                page = page.limit(take);
            }
            if let Some(skip) = options.skip {
                page = page.offset(skip);
            }
            SelectStatement::new()
                .column(Projection::new(SqlExpr::JsonAgg {
                    value: Box::new(object),
                    order,
                }))
                .from(FromItem::Subquery {
                    query: Box::new(page),
                    alias: inner,
                })
        } else {
            SelectStatement::new()
                .column(Projection::new(SqlExpr::JsonAgg {
                    value: Box::new(object),
                    order,
                }))
                .from(FromItem::aliased(&relation.related_table, &inner))
                .where_(condition)
        };

        Ok(SqlExpr::subquery(query))
    }
}

/// Columns of `table` a projection reads: selected scalars and the join
/// columns of selected relations.
pub fn required_columns(
    select: Option<&Value>,
    include: Option<&Value>,
    table: &TableInfo,
) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    let mut add = |name: &str| {
        if !columns.iter().any(|c| c == name) {
            columns.push(name.to_string());
        }
    };

    match select.and_then(Value::as_object) {
        Some(map) => {
            for (key, value) in map {
                if matches!(value, Value::Bool(false)) {
                    continue;
                }
                match table.relation(key) {
                    Some(relation) => add(&relation.target_column),
                    None => add(key),
                }
            }
        }
        None => {
            for name in table.schema.field_names() {
                add(name);
            }
        }
    }
    if let Some(map) = include.and_then(Value::as_object) {
        for key in map.keys() {
            if let Some(relation) = table.relation(key) {
                add(&relation.target_column);
            }
        }
    }
    columns
}

/// Compile `{ field: "asc" | "desc" }` (or an array of such objects).
pub(crate) fn compile_order(
    value: &Value,
    table: &TableInfo,
    scope: Option<&str>,
    path: &str,
) -> CompileResult<Vec<OrderBy>> {
    let items: Vec<&Map<String, Value>> = match value {
        Value::Object(map) => vec![map],
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_object()
                    .ok_or_else(|| CompileError::malformed(path, "order entries must be objects"))
            })
            .collect::<CompileResult<_>>()?,
        _ => return Err(CompileError::malformed(path, "order must be an object or an array")),
    };

    let mut order = Vec::new();
    for map in items {
        for (key, direction) in map {
            table.schema.field(key, path)?;
            let direction = match direction.as_str() {
                Some(d) if d.eq_ignore_ascii_case("asc") => Direction::Asc,
                Some(d) if d.eq_ignore_ascii_case("desc") => Direction::Desc,
                _ => {
                    return Err(CompileError::malformed(
                        join_path(path, key),
                        "direction must be \"asc\" or \"desc\"",
                    ));
                }
            };
            order.push(OrderBy::new(
                SqlExpr::Column(ColumnRef::maybe_qualified(scope, key.as_str())),
                direction,
            ));
        }
    }
    Ok(order)
}

/// A non-negative integer (`skip`, `take`).
pub(crate) fn parse_count(value: &Value, path: &str) -> CompileResult<u64> {
    value
        .as_u64()
        .ok_or_else(|| CompileError::malformed(path, "expected a non-negative integer"))
}

fn column(scope: &str, name: &str) -> SqlExpr {
    SqlExpr::Column(ColumnRef::qualified(scope, name))
}

fn include_map<'v>(
    include: Option<&'v Value>,
    table: &TableInfo,
    path: &str,
) -> CompileResult<Vec<(&'v str, Option<&'v Value>)>> {
    let Some(include) = include else {
        return Ok(Vec::new());
    };
    let map = include
        .as_object()
        .ok_or_else(|| CompileError::malformed(path, "include must be an object"))?;
    let mut entries = Vec::with_capacity(map.len());
    for (key, value) in map {
        if table.relation(key).is_none() {
            return Err(CompileError::malformed(join_path(path, key), "not a relation"));
        }
        match value {
            Value::Bool(false) => {}
            other => entries.push((key.as_str(), Some(other))),
        }
    }
    Ok(entries)
}

fn lookup<'v>(includes: &[(&'v str, Option<&'v Value>)], alias: &str) -> Option<&'v Value> {
    includes
        .iter()
        .find(|(name, _)| *name == alias)
        .and_then(|(_, value)| *value)
}

fn json_fields(
    select: &Map<String, Value>,
    field: &FieldSchema,
    base: ColumnRef,
    path: &str,
) -> CompileResult<SqlExpr> {
    let schema: Option<&ObjectSchema> = field.as_object();
    let dynamic = field.is_dynamic_object();
    let mut entries = Vec::new();
    for (key, value) in select {
        let key_path = join_path(path, key);
        let child = match schema.and_then(|s| s.get(key)) {
            Some(child) => Some(child),
            None if dynamic => None,
            None => return Err(CompileError::unexpected_field(key_path)),
        };
        let target = base.clone().key(key.as_str());
        match value {
            Value::Bool(false) => {}
            Value::Bool(true) => entries.push((key.clone(), SqlExpr::Column(target))),
            Value::Object(sub) if child.is_some_and(FieldSchema::is_object) => {
                if let Some(child) = child {
                    entries.push((key.clone(), json_fields(sub, child, target, &key_path)?));
                }
            }
            _ => {
                return Err(CompileError::malformed(
                    key_path,
                    "field selection must be a boolean",
                ));
            }
        }
    }
    Ok(SqlExpr::JsonObject(entries))
}
