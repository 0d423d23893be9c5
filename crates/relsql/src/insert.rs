//! Insert compiler.
//!
//! An insert payload holds the row's own columns plus relation entries:
//! - plural-inverse relation: an array of child rows, one `INSERT … SELECT`
//!   per non-empty element, linked to the parent through its RETURNING;
//! - unique-inverse relation: one child row, inserted the same way;
//! - foreign-owned relation: either `{ <fk>: value }` (connect, written into
//!   the parent row and validated with it) or a related row created in a CTE
//!   before the parent. A payload holding the foreign key and other fields is
//!   malformed.
//!
//! Rows created inside the chain are only visible through RETURNING, so a
//! selected relation that was created here is read back from its CTEs.

use crate::config::CompilerConfig;
use crate::encode::encode_value;
use crate::error::{CompileError, CompileResult, join_path};
use crate::projection::{IncludeOptions, ProjectionCompiler, compile_order, required_columns};
use crate::relation::{Relation, RelationRepository, RelationShape, TableInfo};
use crate::schema::ObjectSchema;
use crate::sql::{self, Chain, FromItem, Projection, Record, SelectStatement, SqlExpr};
use crate::validate::{RecordValidator, ValidationMode};
use serde_json::{Map, Value};
use std::borrow::Cow;

pub struct InsertCompiler<'a> {
    repository: &'a RelationRepository,
    validator: &'a dyn RecordValidator,
    config: &'a CompilerConfig,
}

/// Chain elements created for one relation alias.
struct Created<'t> {
    relation: &'t Relation,
    ctes: Vec<String>,
}

impl<'a> InsertCompiler<'a> {
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
        select: Option<&Value>,
        include: Option<&Value>,
    ) -> CompileResult<Chain> {
        let info = self.repository.table(table)?;
        let data = data
            .as_object()
            .ok_or_else(|| CompileError::malformed(table, "insert data must be an object"))?;

        let mut own = Map::new();
        let mut relations = Vec::new();
        for (key, value) in data {
            match info.relation(key) {
                Some(relation) => relations.push((relation, value)),
                None => {
                    own.insert(key.clone(), value.clone());
                }
            }
        }

        let mut chain = Chain::new(self.config.cte_prefix.as_str());
        let mut created: Vec<Created<'_>> = Vec::new();
        let mut links = Record::new();

        // Foreign-owned relations are resolved before the parent row exists.
        for &(relation, value) in relations
            .iter()
            .filter(|(r, _)| r.shape == RelationShape::ForeignOwned)
        {
            let path = join_path(table, &relation.alias);
            let Some(payload) = relation_object(value, &path)? else {
                continue;
            };
            if own.contains_key(&relation.target_column) || links.contains(&relation.target_column) {
                return Err(CompileError::malformed(
                    join_path(table, &relation.target_column),
                    "foreign key is set more than once",
                ));
            }
            if let Some(fk) = payload.get(&relation.target_column) {
                if payload.len() > 1 {
                    return Err(CompileError::malformed(
                        path,
                        "connect accepts only the foreign key",
                    ));
                }
                own.insert(relation.target_column.clone(), fk.clone());
                continue;
            }

            self.validator
                .validate_record(payload, &relation.related_schema, &path, ValidationMode::Full)?;
            let selected = is_selected(select, include, &relation.alias);
            let returning = if selected {
                vec![Projection::new(SqlExpr::raw("*"))]
            } else {
                vec![Projection::column(None, relation.source_column.as_str())]
            };
            let statement = sql::insert(&relation.related_table)
                .record(encode_record(payload, &relation.related_schema, &path)?)
                .returning(returning);
            let cte = chain.push(statement);
            links.set(
                relation.target_column.clone(),
                SqlExpr::reference(cte.clone(), relation.source_column.clone()),
            );
            created.push(Created {
                relation,
                ctes: vec![cte],
            });
        }

        // Link columns filled from created rows may be required.
        let linked: Vec<&str> = links.iter().map(|(column, _)| column).collect();
        let own_schema = with_optional(&info.schema, &linked);
        self.validator
            .validate_record(&own, &own_schema, table, ValidationMode::Full)?;
        let mut record = encode_record(&own, &info.schema, table)?;
        for (column, value) in links.iter() {
            record.set(column, value.clone());
        }

        // Children of inverse relations, inserted after the parent.
        let parent_alias = chain.next_alias();
        let mut children = Vec::new();
        for &(relation, value) in relations.iter().filter(|(r, _)| r.shape.is_inverse()) {
            let path = join_path(table, &relation.alias);
            let rows: Vec<(String, &Map<String, Value>)> = match relation.shape {
                RelationShape::PluralInverse => {
                    let items = value.as_array().ok_or_else(|| {
                        CompileError::malformed(&path, "plural relation expects an array")
                    })?;
                    let mut rows = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        let item_path = format!("{path}.{i}");
                        if let Some(row) = relation_object(item, &item_path)? {
                            rows.push((item_path, row));
                        }
                    }
                    rows
                }
                _ => relation_object(value, &path)?
                    .map(|row| vec![(path.clone(), row)])
                    .unwrap_or_default(),
            };
            if rows.is_empty() {
                continue;
            }

            let schema = with_optional(&relation.related_schema, &[relation.source_column.as_str()]);
            let selected = is_selected(select, include, &relation.alias);
            for (row_path, row) in rows {
                if row.contains_key(&relation.source_column) {
                    return Err(CompileError::malformed(
                        join_path(&row_path, &relation.source_column),
                        "set from the parent row",
                    ));
                }
                self.validator
                    .validate_record(row, &schema, &row_path, ValidationMode::Full)?;
                let mut child = encode_record(row, &relation.related_schema, &row_path)?;
                child.set(
                    relation.source_column.clone(),
                    SqlExpr::reference(parent_alias.clone(), relation.target_column.clone()),
                );
                let mut statement = sql::insert(&relation.related_table).record(child);
                if selected {
                    statement = statement.returning([Projection::new(SqlExpr::raw("*"))]);
                }
                children.push((relation, statement));
            }
        }

        let mut parent = sql::insert(table).record(record);
        let single = chain.is_empty() && children.is_empty();
        let mut projections = ProjectionCompiler::new(self.repository, self.config);

        if single {
            if select.is_some() || include.is_some() {
                parent = parent.returning(projections.compile(select, include, table, table)?);
            }
            chain.push(parent);
            return Ok(chain);
        }

        let mut returned: Vec<String> = Vec::new();
        for (relation, _) in &children {
            push_unique(&mut returned, &relation.target_column);
        }
        if select.is_some() || include.is_some() {
            for column in required_columns(select, include, info) {
                push_unique(&mut returned, &column);
            }
        }
        parent = parent.returning(returned.iter().map(|c| Projection::column(None, c.as_str())));
        chain.push(parent);

        for (relation, statement) in children {
            let cte = chain.push(statement);
            match created.iter_mut().find(|c| c.relation.alias == relation.alias) {
                Some(entry) => entry.ctes.push(cte),
                None => created.push(Created {
                    relation,
                    ctes: vec![cte],
                }),
            }
        }

        if select.is_some() || include.is_some() {
            let query = terminal_select(
                &mut projections,
                info,
                &parent_alias,
                &created,
                select,
                include,
            )?;
            chain.push(query);
        }
        Ok(chain)
    }
}

/// `SELECT … FROM "<parent>"`, reading created relations from their CTEs.
fn terminal_select(
    projections: &mut ProjectionCompiler<'_>,
    table: &TableInfo,
    parent: &str,
    created: &[Created<'_>],
    select: Option<&Value>,
    include: Option<&Value>,
) -> CompileResult<SelectStatement> {
    let is_created = |key: &str| created.iter().any(|c| c.relation.alias == key);
    let without_created = |tree: Option<&Value>| -> Option<Value> {
        tree.map(|value| match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter(|(key, _)| !is_created(key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            ),
            other => other.clone(),
        })
    };

    let rest_select = without_created(select);
    let rest_include = without_created(include);
    let mut columns = projections.compile(
        rest_select.as_ref(),
        rest_include.as_ref(),
        &table.name,
        parent,
    )?;

    let entry = |tree: Option<&Value>, key: &str| -> Option<Value> {
        tree.and_then(Value::as_object)
            .and_then(|map| map.get(key))
            .cloned()
    };
    for relation in created {
        let alias = relation.relation.alias.as_str();
        if !is_selected(select, include, alias) {
            continue;
        }
        let selection = entry(select, alias).filter(Value::is_object);
        let options = entry(include, alias);
        let path = join_path(&table.name, alias);
        let expr = materialized(projections, relation, selection.as_ref(), options.as_ref(), &path)?;
        columns.push(Projection::aliased(expr, alias));
    }

    Ok(SelectStatement::new()
        .columns(columns)
        .from(FromItem::table(parent)))
}

/// Aggregate a relation's rows from the CTEs that created them.
fn materialized(
    projections: &mut ProjectionCompiler<'_>,
    created: &Created<'_>,
    selection: Option<&Value>,
    include: Option<&Value>,
    path: &str,
) -> CompileResult<SqlExpr> {
    let relation = created.relation;
    let options = IncludeOptions::parse(include, path)?;
    let alias = projections.next_alias();
    let related = projections.repository().table(&relation.related_table)?;

    let object = SqlExpr::JsonObject(projections.fields(
        selection.or(options.select),
        options.include,
        related,
        &alias,
        path,
    )?);
    let from = match created.ctes.as_slice() {
        [single] => FromItem::aliased(single.as_str(), alias.as_str()),
        many => FromItem::UnionAll {
            sources: many.to_vec(),
            alias: alias.clone(),
        },
    };
    let filter = match options.filter {
        Some(filter) => projections
            .filters()
            .compile_in(filter, related, Some(&alias), &join_path(path, "where"))?,
        None => None,
    };

    if relation.shape.is_singular() {
        let query = SelectStatement::new()
            .column(Projection::new(object))
            .from(from)
            .where_opt(filter);
        return Ok(SqlExpr::subquery(query));
    }

    let order = match options.order {
        Some(order) => compile_order(order, related, Some(&alias), &join_path(path, "order"))?,
        None => Vec::new(),
    };
    let aggregate = Projection::new(SqlExpr::JsonAgg {
        value: Box::new(object),
        order: order.clone(),
    });
    let query = if options.is_paginated() {
        let mut page = SelectStatement::new().from(from).where_opt(filter).order(order);
        if let Some(take) = options.take {
            page = page.limit(take);
        }
        if let Some(skip) = options.skip {
            page = page.offset(skip);
        }
        SelectStatement::new().column(aggregate).from(FromItem::Subquery {
            query: Box::new(page),
            alias,
        })
    } else {
        SelectStatement::new().column(aggregate).from(from).where_opt(filter)
    };
    Ok(SqlExpr::subquery(query))
}

/// Encode a validated record: `null` is inlined, everything else bound by schema.
pub(crate) fn encode_record(
    data: &Map<String, Value>,
    schema: &ObjectSchema,
    path: &str,
) -> CompileResult<Record> {
    let mut record = Record::new();
    for (key, value) in data {
        let field = schema.field(key, path)?;
        let expr = if value.is_null() {
            SqlExpr::Null
        } else {
            SqlExpr::Param(encode_value(value, Some(field))?)
        };
        record.set(key.clone(), expr);
    }
    Ok(record)
}

/// A relation payload: `None` for `null` or `{}`, malformed for anything but an object.
pub(crate) fn relation_object<'v>(
    value: &'v Value,
    path: &str,
) -> CompileResult<Option<&'v Map<String, Value>>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) if map.is_empty() => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        _ => Err(CompileError::malformed(path, "relation payload must be an object")),
    }
}

/// `schema` with `columns` made optional, for link columns the chain fills in.
fn with_optional<'s>(schema: &'s ObjectSchema, columns: &[&str]) -> Cow<'s, ObjectSchema> {
    if columns.is_empty() {
        return Cow::Borrowed(schema);
    }
    let mut schema = schema.clone();
    for column in columns {
        if let Some(field) = schema.properties.get_mut(*column) {
            field.optional = true;
        }
    }
    Cow::Owned(schema)
}

fn is_selected(select: Option<&Value>, include: Option<&Value>, alias: &str) -> bool {
    let named = |tree: Option<&Value>| {
        tree.and_then(Value::as_object)
            .and_then(|map| map.get(alias))
            .is_some_and(|v| !matches!(v, Value::Bool(false)))
    };
    named(select) || named(include)
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
                    "profileId": { "type": "string", "optional": true }
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

    fn compile(data: Value, select: Option<Value>) -> CompileResult<(String, Vec<Value>)> {
        let repo = repository();
        let config = CompilerConfig::default();
        let compiler = InsertCompiler::new(&repo, &SchemaValidator, &config);
        let chain = compiler.compile("users", &data, select.as_ref(), None)?;
        let compiled = chain.build()?;
        let values = compiled.values().into_iter().cloned().collect();
        Ok((compiled.sql, values))
    }

    #[test]
    fn own_columns() {
        let (sql, values) = compile(json!({ "id": "u1", "name": "Ann" }), None).unwrap();
        assert_eq!(sql, r#"INSERT INTO "users" ("id","name") VALUES (:0,:1)"#);
        assert_eq!(values, [json!("u1"), json!("Ann")]);
    }

    #[test]
    fn children_follow_parent() {
        let (sql, values) = compile(
            json!({ "id": "u1", "name": "Ann", "posts": [{ "id": "p1", "title": "A" }, {}] }),
            None,
        )
        .unwrap();
        assert_eq!(
            sql,
            r#"WITH "R0" AS (INSERT INTO "users" ("id","name") VALUES (:0,:1) RETURNING "id") INSERT INTO "posts" ("id","title","userId") SELECT :2, :3, "R0"."id" FROM "R0""#
        );
        assert_eq!(values.len(), 4);
    }

    #[test]
    fn empty_children_are_elided() {
        let (sql, _) = compile(json!({ "id": "u1", "name": "Ann", "posts": [{}, {}] }), None).unwrap();
        assert_eq!(sql, r#"INSERT INTO "users" ("id","name") VALUES (:0,:1)"#);

        let (sql, _) = compile(json!({ "id": "u1", "name": "Ann", "posts": [] }), None).unwrap();
        assert_eq!(sql, r#"INSERT INTO "users" ("id","name") VALUES (:0,:1)"#);
    }

    #[test]
    fn foreign_owned_row_is_created_first() {
        let (sql, _) = compile(
            json!({ "id": "u1", "name": "Ann", "profile": { "id": "pr1", "bio": "hi" } }),
            None,
        )
        .unwrap();
        assert_eq!(
            sql,
            r#"WITH "R0" AS (INSERT INTO "profiles" ("id","bio") VALUES (:0,:1) RETURNING "id") INSERT INTO "users" ("id","name","profileId") SELECT :2, :3, "R0"."id" FROM "R0""#
        );
    }

    #[test]
    fn foreign_owned_connect() {
        let (sql, values) = compile(
            json!({ "id": "u1", "name": "Ann", "profile": { "profileId": "pr1" } }),
            None,
        )
        .unwrap();
        assert_eq!(sql, r#"INSERT INTO "users" ("id","name","profileId") VALUES (:0,:1,:2)"#);
        assert_eq!(values[2], json!("pr1"));

        let err = compile(
            json!({ "id": "u1", "name": "Ann", "profile": { "profileId": "pr1", "bio": "x" } }),
            None,
        )
        .unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn single_statement_select_uses_returning() {
        let (sql, _) = compile(json!({ "id": "u1", "name": "Ann" }), Some(json!({ "id": true }))).unwrap();
        assert_eq!(
            sql,
            r#"INSERT INTO "users" ("id","name") VALUES (:0,:1) RETURNING "users"."id""#
        );
    }

    #[test]
    fn created_children_are_read_from_their_ctes() {
        let (sql, values) = compile(
            json!({
                "id": "u1",
                "name": "Ann",
                "posts": [{ "id": "p1", "title": "A" }, { "id": "p2", "title": "B" }]
            }),
            Some(json!({ "name": true, "posts": { "title": true } })),
        )
        .unwrap();
        assert_eq!(
            sql,
            concat!(
                r#"WITH "R0" AS (INSERT INTO "users" ("id","name") VALUES (:0,:1) RETURNING "id", "name"), "#,
                r#""R1" AS (INSERT INTO "posts" ("id","title","userId") SELECT :2, :3, "R0"."id" FROM "R0" RETURNING *), "#,
                r#""R2" AS (INSERT INTO "posts" ("id","title","userId") SELECT :4, :5, "R0"."id" FROM "R0" RETURNING *) "#,
                r#"SELECT "R0"."name", (SELECT COALESCE(json_agg(json_build_object('title', "S0"."title")), '[]'::json) "#,
                r#"FROM (SELECT * FROM "R1" UNION ALL SELECT * FROM "R2") AS "S0") AS "posts" FROM "R0""#
            )
        );
        assert_eq!(values.len(), 6);
    }

    #[test]
    fn created_children_honor_include_pagination() {
        let repo = repository();
        let config = CompilerConfig::default();
        let compiler = InsertCompiler::new(&repo, &SchemaValidator, &config);
        let data = json!({
            "id": "u1",
            "name": "Ann",
            "posts": [{ "id": "p1", "title": "A" }, { "id": "p2", "title": "B" }]
        });
        let select = json!({ "name": true, "posts": { "title": true } });
        let include = json!({ "posts": { "order": { "title": "desc" }, "take": 1 } });
        let compiled = compiler
            .compile("users", &data, Some(&select), Some(&include))
            .unwrap()
            .build()
            .unwrap();

        assert!(compiled.sql.ends_with(concat!(
            r#"SELECT "R0"."name", (SELECT COALESCE(json_agg(json_build_object('title', "S0"."title") ORDER BY "S0"."title" DESC), '[]'::json) "#,
            r#"FROM (SELECT * FROM (SELECT * FROM "R1" UNION ALL SELECT * FROM "R2") AS "S0" ORDER BY "S0"."title" DESC LIMIT :6) AS "S0") AS "posts" FROM "R0""#
        )), "{}", compiled.sql);
        assert_eq!(compiled.values().last(), Some(&&json!(1)));
    }

    #[test]
    fn connect_foreign_key_is_validated() {
        let err = compile(json!({ "id": "u1", "name": "Ann", "profile": { "profileId": 42 } }), None)
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidValue { .. }));
        assert_eq!(err.path(), Some("users.profileId"));

        let err = compile(json!({ "id": "u1", "name": "Ann", "profile": { "profileId": null } }), None)
            .unwrap_err();
        assert_eq!(err.path(), Some("users.profileId"));

        let err = compile(
            json!({ "id": "u1", "name": "Ann", "profileId": "pr1", "profile": { "profileId": "pr2" } }),
            None,
        )
        .unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn malformed_payloads() {
        let err = compile(json!({ "id": "u1", "name": "Ann", "posts": {} }), None).unwrap_err();
        assert_eq!(err.path(), Some("users.posts"));

        let err = compile(json!({ "id": "u1", "name": "Ann", "nope": 1 }), None).unwrap_err();
        assert!(err.is_malformed());

        let err = compile(
            json!({ "id": "u1", "name": "Ann", "posts": [{ "id": "p1", "title": "A", "userId": "u2" }] }),
            None,
        )
        .unwrap_err();
        assert_eq!(err.path(), Some("users.posts.0.userId"));

        let err = compile(json!({ "id": "u1" }), None).unwrap_err();
        assert!(matches!(err, CompileError::InvalidValue { .. }));
        assert_eq!(err.path(), Some("users.name"));
    }
}
