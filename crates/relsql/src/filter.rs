//! Filter (WHERE) compiler.
//!
//! A filter is a JSON object. Each key is one of:
//! - `AND` / `OR` (an object or an array of objects) or `NOT` (an object);
//! - a relation alias, tested with `EXISTS` against the related table;
//! - a column, compared with a scalar, `null`, an operator object, or (for
//!   object columns) a nested filter over the JSON keys.
//!
//! Whether an object value is a set of operators or a nested filter is decided
//! by the column's schema, not by the shape of the value.
//!
//! ```
//! use relsql::filter::FilterCompiler;
//! use relsql::relation::RelationRepository;
//! use relsql::sql::Render;
//! use serde_json::json;
//!
//! let repo = RelationRepository::from_json(json!({
//!     "items": { "schema": { "properties": {
//!         "id": { "type": "number" },
//!         "name": { "type": "string" }
//!     }}}
//! })).unwrap();
//!
//! let mut filters = FilterCompiler::new(&repo, "W");
//! let condition = filters
//!     .compile(&json!({ "id": { "gt": 3 }, "name": { "startsWith": "a" } }), "items", None)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(condition.to_sql().unwrap(), r#""id" > :0 AND starts_with("name", :1)"#);
//! ```

use crate::alias::AliasGenerator;
use crate::encode::{encode_json, encode_value};
use crate::error::{CompileError, CompileResult, join_path};
use crate::param::SqlParameter;
use crate::relation::{RelationRepository, TableInfo};
use crate::schema::{FieldSchema, ObjectSchema};
use crate::sql::{self, ColumnRef, CompareOp, Condition, FromItem, Projection, SqlExpr};
use serde_json::{Map, Value};

/// Operator keys understood inside a column predicate.
pub const OPERATORS: &[&str] = &[
    "equal",
    "not",
    "gt",
    "gte",
    "lt",
    "lte",
    "isIn",
    "isBetween",
    "isNull",
    "isMissing",
    "startsWith",
    "contains",
];

pub fn is_operator(key: &str) -> bool {
    OPERATORS.contains(&key)
}

/// Compiles filter trees; owns the alias counter of its `EXISTS` subqueries.
pub struct FilterCompiler<'a> {
    repository: &'a RelationRepository,
    aliases: AliasGenerator,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(repository: &'a RelationRepository, alias_prefix: &str) -> Self {
        Self {
            repository,
            aliases: AliasGenerator::new(alias_prefix),
        }
    }

    /// Compile `filter` over `table`.
    ///
    /// Columns are qualified with `scope` when given. Returns `None` for an
    /// empty filter.
    pub fn compile(
        &mut self,
        filter: &Value,
        table: &str,
        scope: Option<&str>,
    ) -> CompileResult<Option<Condition>> {
        let repository = self.repository;
        let info = repository.table(table)?;
        self.compile_in(filter, info, scope, table)
    }

    pub(crate) fn compile_in(
        &mut self,
        filter: &Value,
        table: &TableInfo,
        scope: Option<&str>,
        path: &str,
    ) -> CompileResult<Option<Condition>> {
        let object = filter
            .as_object()
            .ok_or_else(|| CompileError::malformed(path, "filter must be an object"))?;
        let mut conditions = Vec::new();
        for (key, value) in object {
            let key_path = join_path(path, key);
            match key.as_str() {
                "AND" => conditions.extend(self.logical(value, table, scope, &key_path)?),
                "OR" => {
                    let children = self.logical(value, table, scope, &key_path)?;
                    conditions.push(Condition::or(children));
                }
                "NOT" => {
                    if !value.is_object() {
                        return Err(CompileError::malformed(key_path, "NOT expects an object"));
                    }
                    let inner = self
                        .compile_in(value, table, scope, &key_path)?
                        .unwrap_or_else(|| Condition::and(vec![]));
                    conditions.push(inner.negate());
                }
                _ => {
                    if let Some(relation) = table.relation(key) {
                        let outer = scope.unwrap_or(&table.name);
                        let inner = self.aliases.next_alias();
                        let repository = self.repository;
                        let related = repository.table(&relation.related_table)?;
                        let join = relation.join(&inner, outer);
                        let (condition, negated) = match value {
                            Value::Null => (join, true),
                            Value::Object(map) if map.is_empty() => (join, false),
                            Value::Object(_) => {
                                let nested = self.compile_in(value, related, Some(&inner), &key_path)?;
                                match nested {
                                    Some(nested) => (join.and_also(nested), false),
                                    None => (join, false),
                                }
                            }
                            _ => {
                                return Err(CompileError::malformed(
                                    key_path,
                                    "relation filter must be an object or null",
                                ));
                            }
                        };
                        let query = sql::SelectStatement::new()
                            .column(Projection::new(SqlExpr::raw("1")))
                            .from(FromItem::aliased(&relation.related_table, &inner))
                            .where_(condition);
                        conditions.push(if negated {
                            Condition::not_exists(query)
                        } else {
                            Condition::exists(query)
                        });
                    } else {
                        let field = table.schema.field(key, path)?;
                        let column = ColumnRef::maybe_qualified(scope, key.as_str());
                        conditions.extend(field_predicate(value, Some(field), column, &key_path)?);
                    }
                }
            }
        }
        Ok(Condition::all(conditions))
    }

    fn logical(
        &mut self,
        value: &Value,
        table: &TableInfo,
        scope: Option<&str>,
        path: &str,
    ) -> CompileResult<Vec<Condition>> {
        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(_) => vec![value],
            _ => {
                return Err(CompileError::malformed(
                    path,
                    "logical operator expects an object or an array of objects",
                ));
            }
        };
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let item_path = format!("{path}.{i}");
            let condition = self
                .compile_in(item, table, scope, &item_path)?
                .unwrap_or_else(|| Condition::and(vec![]));
            out.push(condition);
        }
        Ok(out)
    }
}

/// Predicates for one column (or JSON key) and its filter value.
fn field_predicate(
    value: &Value,
    field: Option<&FieldSchema>,
    column: ColumnRef,
    path: &str,
) -> CompileResult<Vec<Condition>> {
    match value {
        Value::Null => Ok(vec![Condition::is_null(SqlExpr::Column(column))]),
        Value::Object(map) => object_predicate(map, field, column, path),
        Value::Array(_) if !field.is_some_and(FieldSchema::is_json) && column.path.is_empty() => {
            Err(CompileError::malformed(path, "array value needs an operator"))
        }
        _ => {
            let right = encode_operand(value, field, &column)?;
            Ok(vec![Condition::eq(SqlExpr::Column(column), right)])
        }
    }
}

fn object_predicate(
    map: &Map<String, Value>,
    field: Option<&FieldSchema>,
    column: ColumnRef,
    path: &str,
) -> CompileResult<Vec<Condition>> {
    let nested: Option<&ObjectSchema> = field.and_then(FieldSchema::as_object);
    let dynamic = field.is_none() || field.is_some_and(FieldSchema::is_dynamic_object);

    let mut conditions = Vec::new();
    for (key, value) in map {
        let key_path = join_path(path, key);
        if let Some(child) = nested.and_then(|schema| schema.get(key)) {
            conditions.extend(field_predicate(value, Some(child), column.clone().key(key.as_str()), &key_path)?);
        } else if is_operator(key) {
            conditions.extend(operator(key, value, field, &column, &key_path)?);
        } else if dynamic && nested.is_some() {
            conditions.extend(field_predicate(value, None, column.clone().key(key.as_str()), &key_path)?);
        } else if nested.is_some() {
            return Err(CompileError::unexpected_field(key_path));
        } else {
            return Err(CompileError::malformed(key_path, "unknown operator"));
        }
    }
    Ok(conditions)
}

fn operator(
    name: &str,
    value: &Value,
    field: Option<&FieldSchema>,
    column: &ColumnRef,
    path: &str,
) -> CompileResult<Vec<Condition>> {
    let left = || SqlExpr::Column(column.clone());
    let compare = |op: CompareOp| -> CompileResult<Condition> {
        Ok(Condition::compare(left(), op, encode_operand(value, field, column)?))
    };

    let condition = match name {
        "equal" if value.is_null() => Condition::is_null(left()),
        "equal" => compare(CompareOp::Eq)?,
        "not" if value.is_null() => Condition::is_not_null(left()),
        "not" => compare(CompareOp::Ne)?,
        "gt" => compare(CompareOp::Gt)?,
        "gte" => compare(CompareOp::Gte)?,
        "lt" => compare(CompareOp::Lt)?,
        "lte" => compare(CompareOp::Lte)?,
        "isIn" => {
            let items = value
                .as_array()
                .ok_or_else(|| CompileError::malformed(path, "isIn expects an array"))?;
            let values = items
                .iter()
                .map(|item| encode_operand(item, field, column))
                .collect::<CompileResult<Vec<_>>>()?;
            Condition::InList { expr: left(), values }
        }
        "isBetween" => match value.as_array().map(Vec::as_slice) {
            Some([low, high]) => Condition::Between {
                expr: left(),
                low: encode_operand(low, field, column)?,
                high: encode_operand(high, field, column)?,
            },
            _ => {
                return Err(CompileError::malformed(
                    path,
                    "isBetween expects an array of two values",
                ));
            }
        },
        "isNull" => {
            let flag = expect_bool(value, path)?;
            Condition::NullCheck {
                expr: left(),
                is_null: flag,
            }
        }
        "isMissing" => {
            let flag = expect_bool(value, path)?;
            match column.path.split_last() {
                Some((key, parents)) => {
                    let parent = ColumnRef {
                        qualifier: column.qualifier.clone(),
                        name: column.name.clone(),
                        path: parents.to_vec(),
                    };
                    let has_key = Condition::HasKey {
                        column: parent,
                        key: key.clone(),
                    };
                    if flag { has_key.negate() } else { has_key }
                }
                None => Condition::NullCheck {
                    expr: left(),
                    is_null: flag,
                },
            }
        }
        "startsWith" => {
            let prefix = value
                .as_str()
                .ok_or_else(|| CompileError::malformed(path, "startsWith expects a string"))?;
            Condition::StartsWith {
                expr: text_expr(column),
                prefix: SqlExpr::Param(SqlParameter::new(prefix)),
            }
        }
        "contains" => match value {
            Value::String(needle) => Condition::ContainsText {
                expr: text_expr(column),
                needle: SqlExpr::Param(SqlParameter::new(needle.as_str())),
            },
            Value::Array(_) | Value::Object(_) => {
                Condition::compare(left(), CompareOp::Contains, SqlExpr::Param(encode_json(value)))
            }
            _ => {
                return Err(CompileError::malformed(
                    path,
                    "contains expects a string, an array or an object",
                ));
            }
        },
        _ => return Err(CompileError::malformed(path, "unknown operator")),
    };
    Ok(vec![condition])
}

/// Parameter for a comparison: JSON keys compare as `jsonb`, columns by schema.
fn encode_operand(value: &Value, field: Option<&FieldSchema>, column: &ColumnRef) -> CompileResult<SqlExpr> {
    if value.is_null() {
        return Ok(SqlExpr::Null);
    }
    if !column.path.is_empty() {
        return Ok(SqlExpr::Param(encode_json(value)));
    }
    Ok(SqlExpr::Param(encode_value(value, field)?))
}

fn text_expr(column: &ColumnRef) -> SqlExpr {
    if column.path.is_empty() {
        SqlExpr::Column(column.clone())
    } else {
        SqlExpr::Text(column.clone())
    }
}

fn expect_bool(value: &Value, path: &str) -> CompileResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| CompileError::malformed(path, "expected a boolean"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::TypeHint;
    use crate::sql::Render;
    use serde_json::json;

    fn repository() -> RelationRepository {
        RelationRepository::from_json(json!({
            "table": {
                "schema": { "properties": {
                    "id": { "type": "string", "format": "uuid" },
                    "foo": { "type": "number" },
                    "a": { "type": "number" },
                    "b": { "type": "number" },
                    "name": { "type": "string" },
                    "tags": { "type": "array", "element": { "type": "string" } },
                    "bar": { "type": "object", "properties": {
                        "barBar": { "type": "number", "optional": true },
                        "equal": { "type": "string", "optional": true }
                    }},
                    "extra": { "type": "object", "properties": {}, "definitions": { "extensible": true } }
                }},
                "indexes": [{ "name": "pk", "columns": ["id"], "kind": "Primary" }],
                "relations": [
                    { "alias": "children", "relatedTable": "child", "sourceColumn": "parentId",
                      "sourceIndexKind": "Secondary", "targetColumn": "id", "targetIndexKind": "Primary" }
                ]
            },
            "child": {
                "schema": { "properties": {
                    "id": { "type": "string" },
                    "parentId": { "type": "string" },
                    "score": { "type": "number" }
                }},
                "indexes": [{ "name": "pk", "columns": ["id"], "kind": "Primary" }]
            }
        }))
        .unwrap()
    }

    fn compile(filter: Value) -> CompileResult<(String, Vec<Value>)> {
        let repo = repository();
        let mut filters = FilterCompiler::new(&repo, "W");
        let condition = filters.compile(&filter, "table", None)?.unwrap();
        let compiled = condition.build()?;
        Ok((compiled.sql, compiled.params.into_iter().map(|p| p.value).collect()))
    }

    #[test]
    fn nested_key_null_check() {
        let (sql, params) = compile(json!({ "bar": { "barBar": { "isNull": true } } })).unwrap();
        assert_eq!(sql, r#""bar"['barBar'] IS NULL"#);
        assert!(params.is_empty());
    }

    #[test]
    fn not_group() {
        let id = "6f1c2b3a-8d4e-4f5a-9b6c-7d8e9f0a1b2c";
        let (sql, params) = compile(json!({ "NOT": { "id": id, "foo": 2 } })).unwrap();
        assert_eq!(sql, r#"NOT ("id" = :0 AND "foo" = :1)"#);
        assert_eq!(params, vec![json!(id), json!(2)]);
    }

    #[test]
    fn or_group_with_nested_and() {
        let (sql, _) =
            compile(json!({ "OR": [{ "a": 1 }, { "AND": [{ "b": 2 }, { "b": 3 }] }] })).unwrap();
        assert_eq!(sql, r#"(("a" = :0) OR ("b" = :1 AND "b" = :2))"#);
    }

    #[test]
    fn null_value_is_null_check() {
        let (sql, params) = compile(json!({ "name": null })).unwrap();
        assert_eq!(sql, r#""name" IS NULL"#);
        assert!(params.is_empty());
    }

    #[test]
    fn operators_combine_with_and() {
        let (sql, params) = compile(json!({ "foo": { "gte": 1, "lt": 10, "not": null } })).unwrap();
        assert_eq!(sql, r#""foo" >= :0 AND "foo" < :1 AND "foo" IS NOT NULL"#);
        assert_eq!(params, vec![json!(1), json!(10)]);
    }

    #[test]
    fn in_list_and_between() {
        let (sql, _) = compile(json!({ "a": { "isIn": [1, 2] }, "b": { "isBetween": [0, 5] } })).unwrap();
        assert_eq!(sql, r#""a" IN (:0, :1) AND "b" BETWEEN :2 AND :3"#);

        let err = compile(json!({ "b": { "isBetween": [0] } })).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn string_operators() {
        let (sql, _) = compile(json!({ "name": { "contains": "ab", "startsWith": "x" } })).unwrap();
        assert_eq!(sql, r#"strpos("name", :0) > 0 AND starts_with("name", :1)"#);

        let (sql, values) = compile(json!({ "name": { "contains": "50%_\\" } })).unwrap();
        assert_eq!(sql, r#"strpos("name", :0) > 0"#);
        assert_eq!(values, [json!("50%_\\")]);
    }

    #[test]
    fn json_containment() {
        let repo = repository();
        let mut filters = FilterCompiler::new(&repo, "W");
        let condition = filters
            .compile(&json!({ "tags": { "contains": ["x"] } }), "table", None)
            .unwrap()
            .unwrap();
        let compiled = condition.build().unwrap();
        assert_eq!(compiled.sql, r#""tags" @> :0"#);
        assert_eq!(compiled.params[0].hint, Some(TypeHint::Json));
    }

    #[test]
    fn nested_property_wins_over_operator_name() {
        let (sql, params) = compile(json!({ "bar": { "equal": "x" } })).unwrap();
        assert_eq!(sql, r#""bar"['equal'] = :0"#);
        assert_eq!(params, vec![json!("x")]);
    }

    #[test]
    fn is_missing_on_nested_key() {
        let (sql, _) = compile(json!({ "bar": { "barBar": { "isMissing": true } } })).unwrap();
        assert_eq!(sql, r#"NOT ("bar" ? 'barBar')"#);
    }

    #[test]
    fn dynamic_object_keys_are_paths() {
        let (sql, _) = compile(json!({ "extra": { "color": "red" } })).unwrap();
        assert_eq!(sql, r#""extra"['color'] = :0"#);
    }

    #[test]
    fn relation_exists() {
        let (sql, _) = compile(json!({ "children": {} })).unwrap();
        assert_eq!(
            sql,
            r#"EXISTS (SELECT 1 FROM "child" AS "W0" WHERE "W0"."parentId" = "table"."id")"#
        );

        let (sql, _) = compile(json!({ "children": null })).unwrap();
        assert!(sql.starts_with("NOT EXISTS (SELECT 1"));

        let (sql, params) = compile(json!({ "children": { "score": { "gt": 3 } } })).unwrap();
        assert_eq!(
            sql,
            r#"EXISTS (SELECT 1 FROM "child" AS "W0" WHERE "W0"."parentId" = "table"."id" AND "W0"."score" > :0)"#
        );
        assert_eq!(params, vec![json!(3)]);
    }

    #[test]
    fn malformed_input() {
        assert!(compile(json!({ "foo": { "between": 1 } })).unwrap_err().is_malformed());
        assert!(compile(json!({ "NOT": [1] })).unwrap_err().is_malformed());
        assert!(compile(json!({ "OR": 1 })).unwrap_err().is_malformed());
        assert!(compile(json!({ "children": [] })).unwrap_err().is_malformed());

        let err = compile(json!({ "nope": 1 })).unwrap_err();
        assert_eq!(err.path(), Some("table.nope"));

        let err = compile(json!({ "bar": { "nope": 1 } })).unwrap_err();
        assert_eq!(err.path(), Some("table.bar.nope"));
    }
}
