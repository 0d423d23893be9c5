//! Error types for relsql

use thiserror::Error;

/// Result type alias for compilation
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors raised while compiling a query description into SQL.
///
/// Every error is produced before any SQL text is returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Malformed input: unexpected field, invalid operator, wrong relation shape.
    #[error("Malformed input at '{path}': {message}")]
    Malformed { path: String, message: String },

    /// A value rejected by the record validator.
    #[error("Invalid value at '{path}': {message}")]
    InvalidValue { path: String, message: String },

    /// Builder misuse (missing table, missing record, empty SET).
    #[error("Structural error: {0}")]
    Structural(String),

    /// A runtime value whose parameter type can't be detected.
    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),

    /// Table missing from the relation repository.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Relation metadata that doesn't classify into a known shape.
    #[error("Invalid relation '{table}.{alias}': {message}")]
    InvalidRelation {
        table: String,
        alias: String,
        message: String,
    },
}

impl CompileError {
    /// Create a malformed input error for a dotted path
    pub fn malformed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid value error for a dotted path
    pub fn invalid_value(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a structural (programmer) error
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural(message.into())
    }

    /// Create an unsupported value error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedValue(message.into())
    }

    /// Create an invalid relation error
    pub fn invalid_relation(
        table: impl Into<String>,
        alias: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidRelation {
            table: table.into(),
            alias: alias.into(),
            message: message.into(),
        }
    }

    /// Unexpected key at `path`.
    pub fn unexpected_field(path: impl Into<String>) -> Self {
        Self::malformed(path, "unexpected field")
    }

    /// Check if this is a malformed input error
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }

    /// Check if this is a structural error
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Structural(_))
    }

    /// The offending dotted path, when the error has one.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Malformed { path, .. } | Self::InvalidValue { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Join a parent path and a field name with a dot.
pub(crate) fn join_path(parent: &str, field: &str) -> String {
    if parent.is_empty() {
        field.to_string()
    } else {
        format!("{parent}.{field}")
    }
}
