//! Tests for the statement builder.

use super::*;
use crate::config::PlaceholderStyle;
use crate::param::SqlParameter;
use serde_json::json;

#[test]
fn test_insert_record() {
    let record = Record::new()
        .with("foo", SqlExpr::value(123))
        .with("bar", SqlExpr::value(true))
        .with("baz", SqlExpr::value("abc"))
        .with("xyz", SqlExpr::Null);
    let compiled = insert("table").record(record).build().unwrap();

    assert_eq!(
        compiled.sql,
        r#"INSERT INTO "table" ("foo","bar","baz","xyz") VALUES (:0,:1,:2,null)"#
    );
    assert_eq!(compiled.values(), vec![&json!(123), &json!(true), &json!("abc")]);
}

#[test]
fn test_raw_value_binds_one_parameter() {
    let record = Record::new()
        .with("meta", SqlExpr::raw_value(json!({ "a": { "b": 1 } })))
        .with("tags", SqlExpr::raw_value(json!(["x", "y"])));
    let compiled = insert("t").record(record).build().unwrap();

    assert_eq!(compiled.sql, r#"INSERT INTO "t" ("meta","tags") VALUES (:0,:1)"#);
    assert_eq!(
        compiled.values(),
        vec![&json!({ "a": { "b": 1 } }), &json!(["x", "y"])]
    );
}

#[test]
fn test_insert_empty_record_uses_defaults() {
    let sql = insert("t").record(Record::new()).to_sql().unwrap();
    assert_eq!(sql, r#"INSERT INTO "t" DEFAULT VALUES"#);
}

#[test]
fn test_missing_table_or_record_is_structural() {
    let err = InsertStatement::new().record(Record::new()).build().unwrap_err();
    assert!(err.is_structural());

    let err = insert("t").build().unwrap_err();
    assert!(err.is_structural());

    let err = update("t").build().unwrap_err();
    assert!(err.is_structural());

    let err = Chain::new("R").build().unwrap_err();
    assert!(err.is_structural());
}

#[test]
fn test_dollar_placeholders() {
    let compiled = update("users")
        .record(Record::new().with("name", SqlExpr::value("ann")))
        .where_(Condition::eq(SqlExpr::column("id"), SqlExpr::value(7)))
        .build_with(PlaceholderStyle::Dollar)
        .unwrap();
    assert_eq!(compiled.sql, r#"UPDATE ONLY "users" SET "name" = $1 WHERE "id" = $2"#);
    assert_eq!(compiled.params_ref().len(), 2);
}

#[test]
fn test_raw_operation_on_plain_column() {
    let op = SqlExpr::Operation {
        target: ColumnRef::new("count"),
        op: ArithOp::Add,
        operand: SqlParameter::new(2),
        cast: "bigint",
    };
    let sql = update("t")
        .set(Assignment::column("count", op))
        .to_sql()
        .unwrap();
    assert_eq!(sql, r#"UPDATE ONLY "t" SET "count" = ("count" + (:0))"#);
}

#[test]
fn test_raw_operation_on_json_key() {
    let op = SqlExpr::Operation {
        target: ColumnRef::new("stats").key("score"),
        op: ArithOp::Mul,
        operand: SqlParameter::new(1.5),
        cast: "numeric",
    };
    let sql = update("t")
        .set(Assignment::new(ColumnRef::new("stats").key("score"), op))
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        r#"UPDATE ONLY "t" SET "stats"['score'] = (("stats"->>'score')::numeric * (:0)::numeric)::text::jsonb"#
    );
}

#[test]
fn test_reference_consumes_no_parameter() {
    let compiled = insert("child")
        .record(
            Record::new()
                .with("name", SqlExpr::value("x"))
                .with("parentId", SqlExpr::reference("R0", "id")),
        )
        .build()
        .unwrap();
    assert_eq!(
        compiled.sql,
        r#"INSERT INTO "child" ("name","parentId") SELECT :0, "R0"."id" FROM "R0""#
    );
    assert_eq!(compiled.params.len(), 1);
}

#[test]
fn test_condition_grouping() {
    let condition = Condition::or(vec![
        Condition::eq(SqlExpr::column("a"), SqlExpr::value(1)),
        Condition::and(vec![
            Condition::eq(SqlExpr::column("b"), SqlExpr::value(2)),
            Condition::eq(SqlExpr::column("b"), SqlExpr::value(3)),
        ]),
    ]);
    let compiled = condition.build().unwrap();
    assert_eq!(compiled.sql, r#"(("a" = :0) OR ("b" = :1 AND "b" = :2))"#);

    let negated = Condition::and(vec![
        Condition::eq(SqlExpr::column("id"), SqlExpr::value(1)),
        Condition::eq(SqlExpr::column("foo"), SqlExpr::value(2)),
    ])
    .negate();
    assert_eq!(negated.to_sql().unwrap(), r#"NOT ("id" = :0 AND "foo" = :1)"#);
}

#[test]
fn test_nested_and_is_flattened() {
    let condition = Condition::raw("a").and_also(Condition::and(vec![
        Condition::raw("b"),
        Condition::and(vec![Condition::raw("c")]),
    ]));
    assert_eq!(condition.to_sql().unwrap(), "a AND b AND c");
    assert_eq!(Condition::and(vec![]).to_sql().unwrap(), "TRUE");
}

#[test]
fn test_empty_in_list_is_false() {
    let condition = Condition::InList {
        expr: SqlExpr::column("id"),
        values: vec![],
    };
    assert_eq!(condition.to_sql().unwrap(), "FALSE");
}

#[test]
fn test_json_key_access() {
    let condition = Condition::is_null(SqlExpr::Column(ColumnRef::new("bar").key("barBar")));
    assert_eq!(condition.to_sql().unwrap(), r#""bar"['barBar'] IS NULL"#);
}

#[test]
fn test_select_with_pagination_and_order() {
    let query = select("users")
        .column(Projection::column(Some("users"), "id"))
        .order_by(OrderBy::new(SqlExpr::column("name"), Direction::Desc))
        .limit(5)
        .offset(10);
    assert_eq!(
        query.to_sql().unwrap(),
        r#"SELECT "users"."id" FROM "users" ORDER BY "name" DESC LIMIT :0 OFFSET :1"#
    );
}

#[test]
fn test_json_aggregate_defaults_to_empty_array() {
    let agg = SqlExpr::JsonAgg {
        value: Box::new(SqlExpr::JsonObject(vec![(
            "id".to_string(),
            SqlExpr::qualified("S0", "id"),
        )])),
        order: vec![],
    };
    assert_eq!(
        agg.to_sql().unwrap(),
        r#"COALESCE(json_agg(json_build_object('id', "S0"."id")), '[]'::json)"#
    );
}

#[test]
fn test_chain_numbers_parameters_globally() {
    let mut chain = Chain::new("R");
    let first = chain.push(
        update("a")
            .record(Record::new().with("x", SqlExpr::value(1)))
            .where_(Condition::eq(SqlExpr::column("id"), SqlExpr::value(2)))
            .returning([Projection::column(None, "id")]),
    );
    chain.push(
        update("b")
            .record(Record::new().with("y", SqlExpr::value(3)))
            .from(first.clone())
            .where_(Condition::eq(
                SqlExpr::qualified("b", "aId"),
                SqlExpr::reference(first, "id"),
            )),
    );

    let compiled = chain.build().unwrap();
    assert_eq!(
        compiled.sql,
        r#"WITH "R0" AS (UPDATE ONLY "a" SET "x" = :0 WHERE "id" = :1 RETURNING "id") UPDATE ONLY "b" SET "y" = :2 FROM "R0" WHERE "b"."aId" = "R0"."id""#
    );
    assert_eq!(compiled.params.len(), 3);
}

#[test]
fn test_render_is_idempotent() {
    let query = select("t").where_(Condition::eq(SqlExpr::column("a"), SqlExpr::value("x")));
    assert_eq!(query.build().unwrap(), query.build().unwrap());
}

#[test]
fn test_patch_modes() {
    use crate::schema::{FieldSchema, ObjectSchema};

    let strict = ObjectSchema::new()
        .with_field("a", FieldSchema::number())
        .with_field("b", FieldSchema::number());
    let mut patch = JsonPatch::new("meta");
    patch.set("a", SqlExpr::Param(SqlParameter::json(1)));
    assert_eq!(patch.mode(&strict), PatchMode::Subscript);
    let sql = update("t")
        .assignments(patch.into_assignments(&strict))
        .to_sql()
        .unwrap();
    assert_eq!(sql, r#"UPDATE ONLY "t" SET "meta"['a'] = :0"#);

    let loose = ObjectSchema::new()
        .with_field("a", FieldSchema::number())
        .with_field("b", FieldSchema::number().optional());
    let mut patch = JsonPatch::new("meta");
    patch.set("a", SqlExpr::Param(SqlParameter::json(1)));
    assert_eq!(patch.mode(&loose), PatchMode::Merge);
    let sql = update("t")
        .assignments(patch.into_assignments(&loose))
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        r#"UPDATE ONLY "t" SET "meta" = COALESCE("meta", '{}'::jsonb) || jsonb_build_object('a', (:0)::jsonb)"#
    );
}

#[test]
fn test_patch_null_is_json_null() {
    let schema = crate::schema::ObjectSchema::new()
        .with_field("a", crate::schema::FieldSchema::number().nullable());
    let mut patch = JsonPatch::new("meta");
    patch.set("a", SqlExpr::Null);
    let sql = update("t")
        .assignments(patch.into_assignments(&schema))
        .to_sql()
        .unwrap();
    assert_eq!(sql, r#"UPDATE ONLY "t" SET "meta"['a'] = 'null'::jsonb"#);
}

#[test]
fn test_delete_with_returning() {
    let sql = delete("t")
        .where_opt(Some(Condition::eq(SqlExpr::column("id"), SqlExpr::value(1))))
        .returning([Projection::column(Some("t"), "id")])
        .to_sql()
        .unwrap();
    assert_eq!(sql, r#"DELETE FROM "t" WHERE "id" = :0 RETURNING "t"."id""#);
}
