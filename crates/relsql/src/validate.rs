//! Record validation against a schema.
//!
//! Compilers call a [`RecordValidator`] on every record they are about to turn
//! into SQL. [`SchemaValidator`] is the default: it checks JSON types, string
//! formats and required fields. Hosts with their own validation plug in a
//! different implementation through
//! [`QueryCompiler::with_validator`](crate::query::QueryCompiler::with_validator).

use crate::error::{CompileError, CompileResult, join_path};
use crate::schema::{FieldKind, FieldSchema, NumberFormat, ObjectSchema, StringFormat};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// How much of a record must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Insert: required fields must be present.
    Full,
    /// Update: any subset of fields, atomic operators allowed on numbers.
    Partial,
}

/// A pluggable record validation hook.
pub trait RecordValidator: Send + Sync {
    /// Validate `record` against `schema`; `path` is the dotted location used in errors.
    fn validate_record(
        &self,
        record: &Map<String, Value>,
        schema: &ObjectSchema,
        path: &str,
        mode: ValidationMode,
    ) -> CompileResult<()>;
}

/// Default validator driven by the schema model.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl RecordValidator for SchemaValidator {
    fn validate_record(
        &self,
        record: &Map<String, Value>,
        schema: &ObjectSchema,
        path: &str,
        mode: ValidationMode,
    ) -> CompileResult<()> {
        validate_object(record, schema, false, path, mode)
    }
}

fn validate_object(
    record: &Map<String, Value>,
    schema: &ObjectSchema,
    extensible: bool,
    path: &str,
    mode: ValidationMode,
) -> CompileResult<()> {
    for (key, value) in record {
        let field_path = join_path(path, key);
        match schema.get(key) {
            Some(field) => validate_field(value, field, &field_path, mode)?,
            None if extensible => {}
            None => return Err(CompileError::unexpected_field(field_path)),
        }
    }

    if mode == ValidationMode::Full {
        for (name, field) in &schema.properties {
            let required = !field.optional && field.definitions.default.is_none();
            if required && !record.contains_key(name) {
                return Err(CompileError::invalid_value(
                    join_path(path, name),
                    "missing required field",
                ));
            }
        }
    }

    Ok(())
}

fn validate_field(
    value: &Value,
    field: &FieldSchema,
    path: &str,
    mode: ValidationMode,
) -> CompileResult<()> {
    if value.is_null() {
        if field.nullable {
            return Ok(());
        }
        return Err(CompileError::invalid_value(path, "null is not allowed"));
    }

    let mismatch = || {
        CompileError::invalid_value(path, format!("expected {}, got {value}", field.kind_name()))
    };

    match &field.kind {
        FieldKind::Boolean => value.as_bool().map(|_| ()).ok_or_else(mismatch),
        FieldKind::Number { format } => match value {
            Value::Number(n) => {
                let integral = n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0);
                if *format == Some(NumberFormat::Integer) && !integral {
                    return Err(CompileError::invalid_value(path, "expected an integer"));
                }
                Ok(())
            }
            // Atomic operators are checked by the update compiler.
            Value::Object(_) if mode == ValidationMode::Partial => Ok(()),
            _ => Err(mismatch()),
        },
        FieldKind::String { format } => {
            let text = value.as_str().ok_or_else(mismatch)?;
            match format {
                Some(format) if !is_valid_format(*format, text) => Err(CompileError::invalid_value(
                    path,
                    format!("invalid {format:?} string '{text}'"),
                )),
                _ => Ok(()),
            }
        }
        FieldKind::Object(schema) => {
            let record = value.as_object().ok_or_else(mismatch)?;
            validate_object(record, schema, field.definitions.extensible, path, mode)
        }
        FieldKind::Array { element } => {
            let items = value.as_array().ok_or_else(mismatch)?;
            for (i, item) in items.iter().enumerate() {
                validate_field(item, element, &format!("{path}.{i}"), ValidationMode::Full)?;
            }
            Ok(())
        }
        FieldKind::Union { elements } => {
            if elements
                .iter()
                .any(|alt| validate_field(value, alt, path, mode).is_ok())
            {
                Ok(())
            } else {
                Err(CompileError::invalid_value(
                    path,
                    "value doesn't match any union alternative",
                ))
            }
        }
    }
}

fn is_valid_format(format: StringFormat, text: &str) -> bool {
    match format {
        StringFormat::Uuid => is_uuid(text),
        StringFormat::Date => parse_date(text).is_ok(),
        StringFormat::DateTime => parse_date_time(text).is_ok(),
        StringFormat::Time => parse_time(text).is_ok(),
        StringFormat::Email => is_email(text),
        StringFormat::Url => is_url(text),
        StringFormat::Other => true,
    }
}

/// Best-effort email validation.
pub fn is_email(s: &str) -> bool {
    static EMAIL_RE: OnceLock<Option<regex::Regex>> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| regex::Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(s))
}

pub fn is_url(s: &str) -> bool {
    url::Url::parse(s).is_ok()
}

pub fn is_uuid(s: &str) -> bool {
    uuid::Uuid::parse_str(s).is_ok()
}

pub fn parse_uuid(s: &str) -> Result<uuid::Uuid, uuid::Error> {
    uuid::Uuid::parse_str(s)
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
}

/// Parse a `HH:MM[:SS[.fff]]` time.
pub fn parse_time(s: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f").or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
}

/// Parse an RFC 3339 timestamp; a timestamp without offset is taken as UTC.
pub fn parse_date_time(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").map(|ts| ts.and_utc()))
}
