use super::expr::{ColumnRef, SqlExpr};
use serde_json::{Map, Value};

/// Ordered column assignments of an INSERT or UPDATE.
///
/// Keys keep insertion order; setting an existing key replaces its value in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    entries: Vec<(String, SqlExpr)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from JSON values; `null` is inlined, every other value is bound.
    pub fn from_values(values: &Map<String, Value>) -> Self {
        let mut record = Self::new();
        for (column, value) in values {
            record.set(column.clone(), SqlExpr::value(value.clone()));
        }
        record
    }

    pub fn set(&mut self, column: impl Into<String>, value: SqlExpr) {
        let column = column.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    /// Set `column` unless `value` is absent.
    pub fn set_opt(&mut self, column: impl Into<String>, value: Option<SqlExpr>) {
        if let Some(value) = value {
            self.set(column, value);
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: SqlExpr) -> Self {
        self.set(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&SqlExpr> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlExpr)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Chain elements referenced by any value, in first-use order.
    pub(crate) fn sources(&self) -> Vec<&str> {
        let mut sources = Vec::new();
        for (_, value) in &self.entries {
            value.collect_sources(&mut sources);
        }
        sources
    }
}

impl From<Vec<(String, SqlExpr)>> for Record {
    fn from(entries: Vec<(String, SqlExpr)>) -> Self {
        let mut record = Record::new();
        for (column, value) in entries {
            record.set(column, value);
        }
        record
    }
}

/// One `SET` assignment of an UPDATE; the target may address a JSON key.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub target: ColumnRef,
    pub value: SqlExpr,
}

impl Assignment {
    pub fn new(target: ColumnRef, value: SqlExpr) -> Self {
        Self { target, value }
    }

    pub fn column(name: impl Into<String>, value: SqlExpr) -> Self {
        Self::new(ColumnRef::new(name), value)
    }
}
