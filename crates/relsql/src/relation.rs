//! Relation repository.
//!
//! Table definitions (schema, indexes, relations) come from the metadata layer.
//! The repository checks them once and classifies every relation by which side
//! stores the foreign key:
//!
//! | target index (this table) | source index (related table) | shape |
//! |---------------------------|------------------------------|-------|
//! | Secondary or Unique       | Primary                      | [`RelationShape::ForeignOwned`] |
//! | Primary                   | Unique                       | [`RelationShape::UniqueInverse`] |
//! | Primary                   | Secondary                    | [`RelationShape::PluralInverse`] |
//!
//! The repository is read-only after construction and can be shared by any
//! number of concurrent compilations.

use crate::error::{CompileError, CompileResult};
use crate::schema::ObjectSchema;
use crate::sql::{Condition, SqlExpr};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    #[serde(alias = "primary")]
    Primary,
    #[serde(alias = "secondary")]
    Secondary,
    #[serde(alias = "unique")]
    Unique,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub columns: Vec<String>,
    pub kind: IndexKind,
}

/// A relation as declared; "target" is this table's side, "source" the related table's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDefinition {
    pub alias: String,
    pub related_table: String,
    pub source_column: String,
    pub source_index_kind: IndexKind,
    pub target_column: String,
    pub target_index_kind: IndexKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    #[serde(default)]
    pub name: String,
    pub schema: ObjectSchema,
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
    #[serde(default)]
    pub relations: Vec<RelationDefinition>,
}

/// Which side physically stores the foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationShape {
    /// This table holds the foreign key; at most one related row.
    ForeignOwned,
    /// The related table holds a unique key back to this table; at most one related row.
    UniqueInverse,
    /// The related table holds a non-unique key back to this table; any number of rows.
    PluralInverse,
}

impl RelationShape {
    pub fn classify(target: IndexKind, source: IndexKind) -> Option<Self> {
        match (target, source) {
            (IndexKind::Secondary | IndexKind::Unique, IndexKind::Primary) => {
                Some(RelationShape::ForeignOwned)
            }
            (IndexKind::Primary, IndexKind::Unique) => Some(RelationShape::UniqueInverse),
            (IndexKind::Primary, IndexKind::Secondary) => Some(RelationShape::PluralInverse),
            _ => None,
        }
    }

    pub fn is_singular(self) -> bool {
        !matches!(self, RelationShape::PluralInverse)
    }

    pub fn is_inverse(self) -> bool {
        !matches!(self, RelationShape::ForeignOwned)
    }
}

/// A resolved relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub alias: String,
    pub related_table: String,
    pub related_schema: ObjectSchema,
    /// Column on the related table.
    pub source_column: String,
    /// Column on this table.
    pub target_column: String,
    pub shape: RelationShape,
}

impl Relation {
    /// The foreign-key column a connect payload supplies.
    ///
    /// Foreign-owned relations write this table's column, inverse relations
    /// the related table's.
    pub fn link_column(&self) -> &str {
        match self.shape {
            RelationShape::ForeignOwned => &self.target_column,
            RelationShape::UniqueInverse | RelationShape::PluralInverse => &self.source_column,
        }
    }

    /// `"inner"."sourceColumn" = "outer"."targetColumn"`
    pub fn join(&self, inner: &str, outer: &str) -> Condition {
        Condition::eq(
            SqlExpr::qualified(inner, &self.source_column),
            SqlExpr::qualified(outer, &self.target_column),
        )
    }
}

/// A table with its resolved relations.
#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub name: String,
    pub schema: ObjectSchema,
    pub primary_key: Option<String>,
    relations: Vec<Relation>,
}

impl TableInfo {
    /// Relations in declaration order.
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn relation(&self, alias: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.alias == alias)
    }

    /// The single primary-key column, required by statements that link children.
    pub fn primary_key(&self) -> CompileResult<&str> {
        self.primary_key.as_deref().ok_or_else(|| {
            CompileError::structural(format!("table '{}' has no primary key", self.name))
        })
    }
}

/// Read-only lookup of tables and their relations.
#[derive(Debug, Clone, Default)]
pub struct RelationRepository {
    tables: BTreeMap<String, TableInfo>,
}

impl RelationRepository {
    /// Check and classify `tables`.
    pub fn new(tables: Vec<TableDefinition>) -> CompileResult<Self> {
        let schemas: BTreeMap<&str, &TableDefinition> =
            tables.iter().map(|t| (t.name.as_str(), t)).collect();

        let mut resolved = BTreeMap::new();
        for table in &tables {
            if table.name.is_empty() {
                return Err(CompileError::structural("table definition without a name"));
            }
            let primary_key = primary_key(table)?;
            let mut relations = Vec::with_capacity(table.relations.len());
            for def in &table.relations {
                let relation = resolve_relation(table, def, &schemas)?;
                if relations.iter().any(|r: &Relation| r.alias == relation.alias) {
                    return Err(CompileError::invalid_relation(
                        &table.name,
                        &def.alias,
                        "duplicate alias",
                    ));
                }
                relations.push(relation);
            }
            resolved.insert(
                table.name.clone(),
                TableInfo {
                    name: table.name.clone(),
                    schema: table.schema.clone(),
                    primary_key,
                    relations,
                },
            );
        }

        Ok(Self { tables: resolved })
    }

    /// Load `{ "<table>": { schema, indexes, relations } }`.
    pub fn from_json(value: Value) -> CompileResult<Self> {
        let map: BTreeMap<String, TableDefinition> = serde_json::from_value(value)
            .map_err(|e| CompileError::malformed("", format!("invalid table definitions: {e}")))?;
        let tables = map
            .into_iter()
            .map(|(name, mut table)| {
                table.name = name;
                table
            })
            .collect();
        Self::new(tables)
    }

    pub fn table(&self, name: &str) -> CompileResult<&TableInfo> {
        self.tables
            .get(name)
            .ok_or_else(|| CompileError::UnknownTable(name.to_string()))
    }

    /// Relations of `table`, in declaration order.
    pub fn resolve(&self, table: &str) -> CompileResult<&[Relation]> {
        Ok(self.table(table)?.relations())
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

fn primary_key(table: &TableDefinition) -> CompileResult<Option<String>> {
    let mut primaries = table.indexes.iter().filter(|i| i.kind == IndexKind::Primary);
    let Some(primary) = primaries.next() else {
        return Ok(None);
    };
    if primaries.next().is_some() {
        return Err(CompileError::structural(format!(
            "table '{}' declares more than one primary index",
            table.name
        )));
    }
    match primary.columns.as_slice() {
        [column] => Ok(Some(column.clone())),
        _ => Err(CompileError::structural(format!(
            "primary index '{}' of table '{}' must have exactly one column",
            primary.name, table.name
        ))),
    }
}

fn resolve_relation(
    table: &TableDefinition,
    def: &RelationDefinition,
    tables: &BTreeMap<&str, &TableDefinition>,
) -> CompileResult<Relation> {
    let invalid = |message: String| CompileError::invalid_relation(&table.name, &def.alias, message);

    let related = tables
        .get(def.related_table.as_str())
        .ok_or_else(|| invalid(format!("unknown related table '{}'", def.related_table)))?;
    let shape = RelationShape::classify(def.target_index_kind, def.source_index_kind).ok_or_else(|| {
        invalid(format!(
            "index kinds {:?} -> {:?} don't describe a relation",
            def.target_index_kind, def.source_index_kind
        ))
    })?;
    if table.schema.get(&def.alias).is_some() {
        return Err(invalid("alias shadows a column".to_string()));
    }
    if table.schema.get(&def.target_column).is_none() {
        return Err(invalid(format!("unknown column '{}'", def.target_column)));
    }
    if related.schema.get(&def.source_column).is_none() {
        return Err(invalid(format!(
            "unknown column '{}.{}'",
            def.related_table, def.source_column
        )));
    }

    Ok(Relation {
        alias: def.alias.clone(),
        related_table: def.related_table.clone(),
        related_schema: related.schema.clone(),
        source_column: def.source_column.clone(),
        target_column: def.target_column.clone(),
        shape,
    })
}
