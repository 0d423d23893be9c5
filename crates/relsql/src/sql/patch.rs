//! Partial updates of JSON object columns.
//!
//! A patch touches some keys of one `jsonb` column. It renders either as one
//! subscript assignment per key (`"col"['k'] = :N`) or, when the nested schema
//! has optional keys and only some of them are touched, as a single merge
//! (`"col" = COALESCE("col", '{}'::jsonb) || jsonb_build_object(…)`). The merge
//! keeps untouched keys and works when the stored value lacks a key entirely.

use super::expr::{ColumnRef, SqlExpr};
use super::record::Assignment;
use crate::schema::ObjectSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    Subscript,
    Merge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonPatch {
    column: String,
    qualifier: Option<String>,
    entries: Vec<(String, SqlExpr)>,
}

impl JsonPatch {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            qualifier: None,
            entries: Vec::new(),
        }
    }

    /// Qualify reads of the stored value (needed inside `UPDATE … FROM`).
    pub fn qualified(mut self, qualifier: Option<&str>) -> Self {
        self.qualifier = qualifier.map(str::to_string);
        self
    }

    /// Set `key` to `value`. A `null` value stores JSON `null`.
    pub fn set(&mut self, key: impl Into<String>, value: SqlExpr) {
        let value = match value {
            SqlExpr::Null => SqlExpr::raw("'null'::jsonb"),
            other => other,
        };
        self.entries.push((key.into(), value));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn mode(&self, schema: &ObjectSchema) -> PatchMode {
        let partial = self.entries.len() < schema.properties.len();
        if partial && schema.has_optional_properties() {
            PatchMode::Merge
        } else {
            PatchMode::Subscript
        }
    }

    pub fn into_assignments(self, schema: &ObjectSchema) -> Vec<Assignment> {
        match self.mode(schema) {
            PatchMode::Subscript => {
                let column = self.column;
                self.entries
                    .into_iter()
                    .map(|(key, value)| Assignment::new(ColumnRef::new(column.clone()).key(key), value))
                    .collect()
            }
            PatchMode::Merge => {
                let entries = self
                    .entries
                    .into_iter()
                    .map(|(key, value)| match value {
                        SqlExpr::Param(param) => (key, SqlExpr::Param(param).cast("jsonb")),
                        other => (key, other),
                    })
                    .collect();
                vec![Assignment::new(
                    ColumnRef::new(self.column.clone()),
                    SqlExpr::JsonbMerge {
                        target: ColumnRef::maybe_qualified(self.qualifier.as_deref(), self.column),
                        entries,
                    },
                )]
            }
        }
    }
}
