//! Value encoder: turns validated field values into bound parameters.

use crate::error::{CompileError, CompileResult};
use crate::param::{SqlParameter, TypeHint};
use crate::schema::{FieldKind, FieldSchema, StringFormat};
use crate::validate::{is_uuid, parse_date, parse_date_time};
use chrono::NaiveTime;
use serde_json::Value;

/// Encode `value` as a parameter, using `schema` for the type hint when given.
///
/// `null` is never encoded: the builder inlines it as a literal.
pub fn encode_value(value: &Value, schema: Option<&FieldSchema>) -> CompileResult<SqlParameter> {
    let Some(schema) = schema else {
        return detect_parameter(value);
    };
    if value.is_null() {
        return Err(CompileError::unsupported("null can't be bound as a parameter"));
    }

    let param = match &schema.kind {
        FieldKind::String { format } => match format.and_then(format_hint) {
            Some(hint) => SqlParameter::hinted(value.clone(), hint),
            None => SqlParameter::new(value.clone()),
        },
        FieldKind::Boolean | FieldKind::Number { .. } => SqlParameter::new(value.clone()),
        FieldKind::Object(_) | FieldKind::Array { .. } => SqlParameter::json(value.clone()),
        FieldKind::Union { .. } => return detect_parameter(value),
    };
    Ok(param)
}

/// Encode `value` as a `jsonb` parameter (JSON path targets, opaque objects).
pub fn encode_json(value: &Value) -> SqlParameter {
    SqlParameter::json(value.clone())
}

/// Detect a parameter type from the runtime value alone.
pub fn detect_parameter(value: &Value) -> CompileResult<SqlParameter> {
    let param = match value {
        Value::Null => {
            return Err(CompileError::unsupported(
                "can't detect a parameter type for null",
            ));
        }
        Value::Bool(_) | Value::Number(_) => SqlParameter::new(value.clone()),
        Value::String(s) => match detect_string_hint(s) {
            Some(hint) => SqlParameter::hinted(value.clone(), hint),
            None => SqlParameter::new(value.clone()),
        },
        Value::Array(_) | Value::Object(_) => SqlParameter::json(value.clone()),
    };
    Ok(param)
}

fn format_hint(format: StringFormat) -> Option<TypeHint> {
    match format {
        StringFormat::Uuid => Some(TypeHint::Uuid),
        StringFormat::Date => Some(TypeHint::Date),
        StringFormat::DateTime => Some(TypeHint::Timestamp),
        StringFormat::Time => Some(TypeHint::Time),
        StringFormat::Email | StringFormat::Url | StringFormat::Other => None,
    }
}

fn detect_string_hint(s: &str) -> Option<TypeHint> {
    if is_uuid(s) && s.len() == 36 {
        Some(TypeHint::Uuid)
    } else if s.contains('T') && parse_date_time(s).is_ok() {
        Some(TypeHint::Timestamp)
    } else if parse_date(s).is_ok() {
        Some(TypeHint::Date)
    } else if NaiveTime::parse_from_str(s, "%H:%M:%S%.f").is_ok() {
        Some(TypeHint::Time)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StringFormat;
    use serde_json::json;

    #[test]
    fn schema_formats_become_hints() {
        let uuid = FieldSchema::formatted(StringFormat::Uuid);
        let param = encode_value(&json!("6f1c2b3a-8d4e-4f5a-9b6c-7d8e9f0a1b2c"), Some(&uuid)).unwrap();
        assert_eq!(param.hint, Some(TypeHint::Uuid));

        let date = FieldSchema::formatted(StringFormat::DateTime);
        let param = encode_value(&json!("2024-01-01T00:00:00Z"), Some(&date)).unwrap();
        assert_eq!(param.hint, Some(TypeHint::Timestamp));

        let plain = encode_value(&json!("abc"), Some(&FieldSchema::string())).unwrap();
        assert_eq!(plain.hint, None);
    }

    #[test]
    fn objects_and_arrays_are_json() {
        let schema = FieldSchema::array(FieldSchema::number());
        let param = encode_value(&json!([1, 2]), Some(&schema)).unwrap();
        assert_eq!(param, SqlParameter::json(json!([1, 2])));
    }

    #[test]
    fn detects_types_without_schema() {
        assert_eq!(detect_parameter(&json!(1)).unwrap().hint, None);
        assert_eq!(
            detect_parameter(&json!("2024-05-01")).unwrap().hint,
            Some(TypeHint::Date)
        );
        assert_eq!(
            detect_parameter(&json!("2024-05-01T10:00:00Z")).unwrap().hint,
            Some(TypeHint::Timestamp)
        );
        assert_eq!(
            detect_parameter(&json!("12:30:00")).unwrap().hint,
            Some(TypeHint::Time)
        );
        assert_eq!(detect_parameter(&json!("hello")).unwrap().hint, None);
        assert_eq!(
            detect_parameter(&json!({ "a": 1 })).unwrap().hint,
            Some(TypeHint::Json)
        );
    }

    #[test]
    fn null_is_unsupported() {
        assert!(matches!(
            detect_parameter(&Value::Null),
            Err(CompileError::UnsupportedValue(_))
        ));
        assert!(encode_value(&Value::Null, Some(&FieldSchema::string())).is_err());
    }
}
