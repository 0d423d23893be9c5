//! # relsql
//!
//! Compiles schema-aware query descriptions into parameterized PostgreSQL.
//!
//! A [`RelationRepository`] describes tables, their JSON-schema-like row
//! types and the relations between them. [`QueryCompiler`] turns insert,
//! update, select, delete and count descriptions against it into SQL text plus
//! an ordered parameter list:
//!
//! ```
//! use relsql::{QueryCompiler, RelationRepository, UpdateQuery};
//! use serde_json::json;
//!
//! let repository = RelationRepository::from_json(json!({
//!     "users": {
//!         "schema": { "properties": {
//!             "id": { "type": "string" },
//!             "visits": { "type": "number", "format": "integer" }
//!         }},
//!         "indexes": [{ "name": "users_pkey", "columns": ["id"], "kind": "Primary" }]
//!     }
//! }))?;
//!
//! let compiler = QueryCompiler::new(&repository);
//! let query = UpdateQuery::new(json!({ "visits": { "increment": 1 } }))
//!     .filter(json!({ "id": "u1" }));
//! let compiled = compiler.update("users", &query)?;
//! assert_eq!(
//!     compiled.sql,
//!     r#"UPDATE ONLY "users" SET "visits" = ("visits" + (:0)) WHERE "id" = :1"#
//! );
//! assert_eq!(compiled.params.len(), 2);
//! # Ok::<(), relsql::CompileError>(())
//! ```
//!
//! Relation payloads nest: an insert may create child rows, an update may
//! connect rows or update linked ones. Dependent statements are chained as
//! `WITH "R0" AS (…), "R1" AS (…) …` with one parameter numbering across the
//! whole chain. The [`sql`] module is the statement builder underneath and
//! can be used on its own.
//!
//! Compilation emits `tracing` events on the `relsql.compile` and
//! `relsql.sql` targets; no subscriber is installed.

mod alias;

#[cfg(feature = "check")]
pub mod check;
pub mod config;
pub mod encode;
pub mod error;
pub mod filter;
pub mod ident;
pub mod insert;
pub mod param;
pub mod projection;
pub mod query;
pub mod relation;
pub mod schema;
pub mod sql;
pub mod update;
pub mod validate;

pub use config::{CompilerConfig, PlaceholderStyle};
pub use error::{CompileError, CompileResult};
pub use param::{SqlParameter, TypeHint};
pub use query::{CountQuery, DeleteQuery, InsertQuery, QueryCompiler, SelectQuery, UpdateQuery};
pub use relation::{
    IndexDefinition, IndexKind, Relation, RelationDefinition, RelationRepository, RelationShape,
    TableDefinition,
};
pub use schema::{FieldKind, FieldSchema, ObjectSchema};
pub use sql::{CompiledQuery, Render};
pub use validate::{RecordValidator, SchemaValidator, ValidationMode};

#[cfg(feature = "check")]
pub use check::{SqlSummary, check_sql};
