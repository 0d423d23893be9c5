//! Update compiler.
//!
//! Own columns become one `UPDATE ONLY … SET`. Numeric fields accept an
//! atomic operation (`{ "increment": 1 }`), plain nested objects are patched
//! key by key. Relation entries become later chain elements, in declaration
//! order, each joined against the main element's RETURNING:
//!
//! ```text
//! WITH "R0" AS (UPDATE ONLY "users" SET "name" = :0 WHERE "id" = :1 RETURNING "profileId")
//! UPDATE ONLY "profiles" SET "bio" = :2 FROM "R0" WHERE "profiles"."id" = "R0"."profileId"
//! ```
//!
//! A relation payload holding the link column is a connect and must hold
//! nothing else.

use crate::config::CompilerConfig;
use crate::encode::{encode_json, encode_value};
use crate::error::{CompileError, CompileResult, join_path};
use crate::param::SqlParameter;
use crate::projection::{ProjectionCompiler, required_columns};
use crate::relation::{Relation, RelationRepository, RelationShape};
use crate::schema::{FieldSchema, ObjectSchema};
use crate::sql::{
    self, ArithOp, Assignment, Chain, ColumnRef, Condition, FromItem, JsonPatch, Projection,
    SelectStatement, SqlExpr, Statement,
};
use crate::validate::{RecordValidator, ValidationMode};
use serde_json::{Map, Value};
use tracing::warn;

pub struct UpdateCompiler<'a> {
    repository: &'a RelationRepository,
    validator: &'a dyn RecordValidator,
    config: &'a CompilerConfig,
}

/// A statement deferred until after the main one.
enum Step<'t> {
    /// Point the related rows' foreign key at `value`.
    Connect { relation: &'t Relation, value: SqlExpr },
    /// Update fields of the linked related rows.
    InPlace {
        relation: &'t Relation,
        assignments: Vec<Assignment>,
    },
}

impl<'t> Step<'t> {
    fn relation(&self) -> &'t Relation {
        match self {
            Step::Connect { relation, .. } | Step::InPlace { relation, .. } => relation,
        }
    }
}

impl<'a> UpdateCompiler<'a> {
    pub fn new(
        repository: &'a RelationRepository,
        validator: &'a dyn RecordValidator,
        config: &'a CompilerConfig,
    ) -> Self {
        Self {
            repository,
            validator,
            config,
        }
    }

    pub fn compile(
        &self,
        table: &str,
        data: &Value,
        filter: Option<&Value>,
        select: Option<&Value>,
        include: Option<&Value>,
    ) -> CompileResult<Chain> {
        let info = self.repository.table(table)?;
        let data = data
            .as_object()
            .ok_or_else(|| CompileError::malformed(table, "update data must be an object"))?;

        let mut assignments = Vec::new();
        for (key, value) in data {
            if info.relation(key).is_none() {
                assignments.extend(self.field_assignments(key, value, &info.schema, table, None)?);
            }
        }

        let mut steps = Vec::new();
        for relation in info.relations() {
            let Some(value) = data.get(&relation.alias) else {
                continue;
            };
            let path = join_path(table, &relation.alias);
            let payload = value.as_object().ok_or_else(|| {
                CompileError::malformed(&path, "relation update must be an object")
            })?;
            if payload.is_empty() {
                continue;
            }

            let link = relation.link_column();
            if let Some(fk) = payload.get(link) {
                if payload.len() > 1 {
                    return Err(CompileError::malformed(
                        path,
                        "connect accepts only the foreign key",
                    ));
                }
                if relation.shape == RelationShape::ForeignOwned {
                    self.validator
                        .validate_record(payload, &info.schema, table, ValidationMode::Partial)?;
                    let field = info.schema.field(link, table)?;
                    assignments.push(Assignment::column(link, encode(fk, field)?));
                } else {
                    self.validator.validate_record(
                        payload,
                        &relation.related_schema,
                        &path,
                        ValidationMode::Partial,
                    )?;
                    let field = relation.related_schema.field(link, &path)?;
                    steps.push(Step::Connect {
                        relation,
                        value: encode(fk, field)?,
                    });
                }
                continue;
            }

            let mut related = Vec::new();
            for (key, value) in payload {
                related.extend(self.field_assignments(
                    key,
                    value,
                    &relation.related_schema,
                    &path,
                    Some(&relation.related_table),
                )?);
            }
            if !related.is_empty() {
                steps.push(Step::InPlace {
                    relation,
                    assignments: related,
                });
            }
        }

        let projected = select.is_some() || include.is_some();
        let mut projections = ProjectionCompiler::new(self.repository, self.config);
        let condition = match filter {
            Some(filter) => projections.filters().compile(filter, table, None)?,
            None => None,
        };

        let mut carried: Vec<String> = Vec::new();
        for step in &steps {
            push_unique(&mut carried, &step.relation().target_column);
        }
        if projected && !steps.is_empty() {
            for column in required_columns(select, include, info) {
                push_unique(&mut carried, &column);
            }
        }

        let returning: Vec<Projection> = if steps.is_empty() {
            if projected {
                projections.compile(select, include, table, table)?
            } else {
                Vec::new()
            }
        } else {
            carried
                .iter()
                .map(|c| Projection::column(None, c.as_str()))
                .collect()
        };

        let main: Statement = if assignments.is_empty() {
            warn!(
                target: "relsql.compile",
                table,
                "update has no own columns, compiling a SELECT"
            );
            let columns = if returning.is_empty() {
                vec![Projection::new(SqlExpr::raw("1"))]
            } else {
                returning
            };
            SelectStatement::new()
                .columns(columns)
                .from(FromItem::table(table))
                .where_opt(condition)
                .into()
        } else {
            sql::update(table)
                .assignments(assignments)
                .where_opt(condition)
                .returning(returning)
                .into()
        };

        // Relation steps and the final SELECT all read from the main element.
        let mut chain = Chain::new(self.config.cte_prefix.as_str());
        let main = chain.push(main);

        let has_steps = !steps.is_empty();
        for step in steps {
            let relation = step.relation();
            let join = Condition::eq(
                SqlExpr::qualified(&relation.related_table, &relation.source_column),
                SqlExpr::reference(main.as_str(), relation.target_column.as_str()),
            );
            let statement = sql::update(&relation.related_table)
                .from(main.as_str())
                .where_(join);
            let statement = match step {
                Step::Connect { relation, value } => {
                    statement.set(Assignment::column(relation.source_column.as_str(), value))
                }
                Step::InPlace { assignments, .. } => statement.assignments(assignments),
            };
            chain.push(statement);
        }

        if has_steps && projected {
            let columns = projections.compile(select, include, table, &main)?;
            chain.push(
                SelectStatement::new()
                    .columns(columns)
                    .from(FromItem::table(main.as_str())),
            );
        }
        Ok(chain)
    }

    /// Assignments for one non-relation field.
    ///
    /// `qualifier` qualifies reads of the current value, for statements that
    /// also read `FROM` another chain element.
    fn field_assignments(
        &self,
        key: &str,
        value: &Value,
        schema: &ObjectSchema,
        path: &str,
        qualifier: Option<&str>,
    ) -> CompileResult<Vec<Assignment>> {
        let field = schema.field(key, path)?;
        let key_path = join_path(path, key);

        if field.is_number() && value.is_object() {
            let (op, operand) = atomic(value, field, &key_path)?;
            let expr = SqlExpr::Operation {
                target: ColumnRef::maybe_qualified(qualifier, key),
                op,
                operand,
                cast: numeric_cast(field),
            };
            return Ok(vec![Assignment::column(key, expr)]);
        }

        if let (Some(nested), Value::Object(entries)) = (field.as_object(), value) {
            if field.is_plain_object() {
                return self.patch(key, entries, nested, &key_path, qualifier);
            }
        }

        self.validate_one(key, value, schema, path)?;
        Ok(vec![Assignment::column(key, encode(value, field)?)])
    }

    /// Key-by-key patch of a JSON object column.
    fn patch(
        &self,
        column: &str,
        entries: &Map<String, Value>,
        schema: &ObjectSchema,
        path: &str,
        qualifier: Option<&str>,
    ) -> CompileResult<Vec<Assignment>> {
        let mut patch = JsonPatch::new(column).qualified(qualifier);
        for (key, value) in entries {
            let field = schema.field(key, path)?;
            let expr = if field.is_number() && value.is_object() {
                let (op, operand) = atomic(value, field, &join_path(path, key))?;
                SqlExpr::Operation {
                    target: ColumnRef::maybe_qualified(qualifier, column).key(key.as_str()),
                    op,
                    operand,
                    cast: numeric_cast(field),
                }
            } else {
                self.validate_one(key, value, schema, path)?;
                if value.is_null() {
                    SqlExpr::Null
                } else {
                    SqlExpr::Param(encode_json(value))
                }
            };
            patch.set(key.as_str(), expr);
        }
        if patch.is_empty() {
            return Ok(Vec::new());
        }
        Ok(patch.into_assignments(schema))
    }

    fn validate_one(
        &self,
        key: &str,
        value: &Value,
        schema: &ObjectSchema,
        path: &str,
    ) -> CompileResult<()> {
        let mut single = Map::new();
        single.insert(key.to_string(), value.clone());
        self.validator
            .validate_record(&single, schema, path, ValidationMode::Partial)
    }
}

/// Parse `{ "increment" | "decrement" | "multiply" | "divide": n }`.
fn atomic(value: &Value, field: &FieldSchema, path: &str) -> CompileResult<(ArithOp, SqlParameter)> {
    let Some((name, operand)) = value
        .as_object()
        .filter(|map| map.len() == 1)
        .and_then(|map| map.iter().next())
    else {
        return Err(CompileError::malformed(
            path,
            "atomic update names exactly one of increment, decrement, multiply, divide",
        ));
    };
    let op = match name.as_str() {
        "increment" => ArithOp::Add,
        "decrement" => ArithOp::Sub,
        "multiply" => ArithOp::Mul,
        "divide" => ArithOp::Div,
        _ => {
            return Err(CompileError::malformed(
                join_path(path, name),
                "invalid atomic operation",
            ));
        }
    };
    let integral = operand.is_i64() || operand.is_u64();
    if !operand.is_number() || (field.is_integer() && !integral) {
        return Err(CompileError::invalid_value(
            join_path(path, name),
            format!("expected a {} operand", numeric_cast(field)),
        ));
    }
    Ok((op, SqlParameter::new(operand.clone())))
}

fn numeric_cast(field: &FieldSchema) -> &'static str {
    if field.is_integer() { "bigint" } else { "numeric" }
}

fn encode(value: &Value, field: &FieldSchema) -> CompileResult<SqlExpr> {
    if value.is_null() {
        Ok(SqlExpr::Null)
    } else {
        Ok(SqlExpr::Param(encode_value(value, Some(field))?))
    }
}

fn push_unique(columns: &mut Vec<String>, column: &str) {
    if !columns.iter().any(|c| c == column) {
        columns.push(column.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::Render;
    use crate::validate::SchemaValidator;
    use serde_json::json;

    fn repository() -> RelationRepository {
        RelationRepository::from_json(json!({
            "users": {
                "schema": { "properties": {
                    "id": { "type": "string" },
                    "name": { "type": "string" },
                    "age": { "type": "number", "format": "integer", "optional": true },
                    "profileId": { "type": "string", "optional": true, "nullable": true },
                    "meta": { "type": "object", "properties": {
                        "a": { "type": "number" },
                        "b": { "type": "string" }
                    }},
                    "settings": { "type": "object", "properties": {
                        "theme": { "type": "string" },
                        "volume": { "type": "number", "optional": true }
                    }}
                }},
                "indexes": [{ "name": "pk", "columns": ["id"], "kind": "Primary" }],
                "relations": [
                    { "alias": "posts", "relatedTable": "posts", "sourceColumn": "userId",
                      "sourceIndexKind": "Secondary", "targetColumn": "id", "targetIndexKind": "Primary" },
                    { "alias": "profile", "relatedTable": "profiles", "sourceColumn": "id",
                      "sourceIndexKind": "Primary", "targetColumn": "profileId", "targetIndexKind": "Secondary" }
                ]
            },
            "posts": {
                "schema": { "properties": {
                    "id": { "type": "string" },
                    "userId": { "type": "string" },
                    "title": { "type": "string" }
                }},
                "indexes": [{ "name": "pk", "columns": ["id"], "kind": "Primary" }]
            },
            "profiles": {
                "schema": { "properties": { "id": { "type": "string" }, "bio": { "type": "string" } } },
                "indexes": [{ "name": "pk", "columns": ["id"], "kind": "Primary" }]
            }
        }))
        .unwrap()
    }

    fn compile(
        data: Value,
        filter: Option<Value>,
        select: Option<Value>,
    ) -> CompileResult<(String, Vec<Value>)> {
        let repo = repository();
        let config = CompilerConfig::default();
        let compiler = UpdateCompiler::new(&repo, &SchemaValidator, &config);
        let chain = compiler.compile("users", &data, filter.as_ref(), select.as_ref(), None)?;
        let compiled = chain.build()?;
        let values = compiled.values().into_iter().cloned().collect();
        Ok((compiled.sql, values))
    }

    #[test]
    fn own_columns_with_filter() {
        let (sql, values) =
            compile(json!({ "name": "Bob" }), Some(json!({ "id": "u1" })), None).unwrap();
        assert_eq!(sql, r#"UPDATE ONLY "users" SET "name" = :0 WHERE "id" = :1"#);
        assert_eq!(values, [json!("Bob"), json!("u1")]);
    }

    #[test]
    fn atomic_operations() {
        let (sql, values) = compile(json!({ "age": { "increment": 1 } }), None, None).unwrap();
        assert_eq!(sql, r#"UPDATE ONLY "users" SET "age" = ("age" + (:0))"#);
        assert_eq!(values, [json!(1)]);

        let (sql, _) = compile(json!({ "meta": { "a": { "multiply": 2 } } }), None, None).unwrap();
        assert_eq!(
            sql,
            r#"UPDATE ONLY "users" SET "meta"['a'] = (("meta"->>'a')::numeric * (:0)::numeric)::text::jsonb"#
        );
    }

    #[test]
    fn invalid_atomic_operations() {
        let err = compile(json!({ "age": { "increment": 1, "decrement": 2 } }), None, None).unwrap_err();
        assert_eq!(err.path(), Some("users.age"));

        let err = compile(json!({ "age": { "plus": 1 } }), None, None).unwrap_err();
        assert!(err.is_malformed());
        assert_eq!(err.path(), Some("users.age.plus"));

        let err = compile(json!({ "age": { "increment": 1.5 } }), None, None).unwrap_err();
        assert!(matches!(err, CompileError::InvalidValue { .. }));
    }

    #[test]
    fn nested_patches() {
        let (sql, _) = compile(json!({ "meta": { "b": "x" } }), None, None).unwrap();
        assert_eq!(sql, r#"UPDATE ONLY "users" SET "meta"['b'] = :0"#);

        let (sql, _) = compile(json!({ "settings": { "theme": "dark" } }), None, None).unwrap();
        assert_eq!(
            sql,
            r#"UPDATE ONLY "users" SET "settings" = COALESCE("settings", '{}'::jsonb) || jsonb_build_object('theme', (:0)::jsonb)"#
        );
    }

    #[test]
    fn foreign_key_connect_is_written_in_place() {
        let (sql, values) = compile(
            json!({ "profile": { "profileId": "p2" } }),
            Some(json!({ "id": "u1" })),
            None,
        )
        .unwrap();
        assert_eq!(sql, r#"UPDATE ONLY "users" SET "profileId" = :0 WHERE "id" = :1"#);
        assert_eq!(values, [json!("p2"), json!("u1")]);

        let (sql, values) = compile(json!({ "profile": { "profileId": null } }), None, None).unwrap();
        assert_eq!(sql, r#"UPDATE ONLY "users" SET "profileId" = null"#);
        assert!(values.is_empty());
    }

    #[test]
    fn related_fields_update_through_chain() {
        let (sql, values) = compile(
            json!({ "name": "Bob", "profile": { "bio": "hi" } }),
            Some(json!({ "id": "u1" })),
            None,
        )
        .unwrap();
        assert_eq!(
            sql,
            r#"WITH "R0" AS (UPDATE ONLY "users" SET "name" = :0 WHERE "id" = :1 RETURNING "profileId") UPDATE ONLY "profiles" SET "bio" = :2 FROM "R0" WHERE "profiles"."id" = "R0"."profileId""#
        );
        assert_eq!(values, [json!("Bob"), json!("u1"), json!("hi")]);
    }

    #[test]
    fn inverse_connect_targets_related_table() {
        let (sql, _) = compile(
            json!({ "posts": { "userId": "u2" } }),
            Some(json!({ "id": "u1" })),
            None,
        )
        .unwrap();
        assert_eq!(
            sql,
            r#"WITH "R0" AS (SELECT "id" FROM "users" WHERE "id" = :0) UPDATE ONLY "posts" SET "userId" = :1 FROM "R0" WHERE "posts"."userId" = "R0"."id""#
        );
    }

    #[test]
    fn select_after_relation_steps() {
        let (sql, _) = compile(
            json!({ "name": "Bob", "profile": { "bio": "hi" } }),
            None,
            Some(json!({ "name": true, "profile": { "bio": true } })),
        )
        .unwrap();
        assert_eq!(
            sql,
            concat!(
                r#"WITH "R0" AS (UPDATE ONLY "users" SET "name" = :0 RETURNING "profileId", "name"), "#,
                r#""R1" AS (UPDATE ONLY "profiles" SET "bio" = :1 FROM "R0" WHERE "profiles"."id" = "R0"."profileId") "#,
                r#"SELECT "R0"."name", (SELECT json_build_object('bio', "S0"."bio") FROM "profiles" AS "S0" WHERE "S0"."id" = "R0"."profileId") AS "profile" FROM "R0""#
            )
        );
    }

    #[test]
    fn relation_steps_join_the_main_statement() {
        let (sql, values) = compile(
            json!({ "posts": { "title": "x" }, "profile": { "bio": "b" } }),
            Some(json!({ "id": "u1" })),
            Some(json!({ "id": true })),
        )
        .unwrap();
        assert_eq!(
            sql,
            concat!(
                r#"WITH "R0" AS (SELECT "id", "profileId" FROM "users" WHERE "id" = :0), "#,
                r#""R1" AS (UPDATE ONLY "posts" SET "title" = :1 FROM "R0" WHERE "posts"."userId" = "R0"."id"), "#,
                r#""R2" AS (UPDATE ONLY "profiles" SET "bio" = :2 FROM "R0" WHERE "profiles"."id" = "R0"."profileId") "#,
                r#"SELECT "R0"."id" FROM "R0""#
            )
        );
        assert_eq!(values, [json!("u1"), json!("x"), json!("b")]);
    }

    #[test]
    fn select_without_steps_uses_returning() {
        let (sql, _) = compile(json!({ "name": "Bob" }), None, Some(json!({ "id": true }))).unwrap();
        assert_eq!(sql, r#"UPDATE ONLY "users" SET "name" = :0 RETURNING "users"."id""#);
    }

    #[test]
    fn empty_update_degrades_to_select() {
        let (sql, _) = compile(json!({}), Some(json!({ "id": "u1" })), Some(json!({ "id": true }))).unwrap();
        assert_eq!(sql, r#"SELECT "users"."id" FROM "users" WHERE "id" = :0"#);

        let (sql, _) = compile(json!({ "name": "Bob", "profile": {} }), None, None).unwrap();
        assert_eq!(sql, r#"UPDATE ONLY "users" SET "name" = :0"#);
    }

    #[test]
    fn malformed_relation_payloads() {
        let err = compile(json!({ "profile": "p2" }), None, None).unwrap_err();
        assert_eq!(err.path(), Some("users.profile"));

        let err = compile(json!({ "profile": { "profileId": "p2", "bio": "x" } }), None, None).unwrap_err();
        assert!(err.is_malformed());

        let err = compile(json!({ "profile": { "nope": 1 } }), None, None).unwrap_err();
        assert!(err.is_malformed());

        let err = compile(json!({ "nope": 1 }), None, None).unwrap_err();
        assert_eq!(err.path(), Some("users.nope"));
    }
}
