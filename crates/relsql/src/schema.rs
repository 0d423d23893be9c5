//! Row schema model.
//!
//! A table row is described by an [`ObjectSchema`], a map of field name to
//! [`FieldSchema`]. Field kinds are a closed enum ([`FieldKind`]) so every
//! compiler matches them exhaustively.
//!
//! Schemas deserialize from the JSON shape produced by the metadata layer:
//!
//! ```
//! use relsql::schema::{ObjectSchema, StringFormat};
//!
//! let schema: ObjectSchema = serde_json::from_value(serde_json::json!({
//!     "properties": {
//!         "id": { "type": "string", "format": "uuid" },
//!         "age": { "type": "number", "format": "integer", "optional": true },
//!         "meta": { "type": "object", "properties": {}, "definitions": { "extensible": true } }
//!     }
//! })).unwrap();
//!
//! assert_eq!(schema.get("id").unwrap().string_format(), Some(StringFormat::Uuid));
//! assert!(schema.get("meta").unwrap().is_dynamic_object());
//! ```

use crate::error::{CompileError, CompileResult, join_path};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema of an object (a table row or a nested JSON object).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectSchema {
    #[serde(default)]
    pub properties: BTreeMap<String, FieldSchema>,
}

impl ObjectSchema {
    /// Create an empty object schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field (builder style).
    pub fn with_field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.properties.get(name)
    }

    /// Look up a field, failing closed with the dotted `path` of the offending key.
    pub fn field(&self, name: &str, parent_path: &str) -> CompileResult<&FieldSchema> {
        self.properties
            .get(name)
            .ok_or_else(|| CompileError::unexpected_field(join_path(parent_path, name)))
    }

    /// Whether any property is optional.
    pub fn has_optional_properties(&self) -> bool {
        self.properties.values().any(|field| field.optional)
    }

    /// Field names in schema order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }
}

/// Per-field definitions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldDefinitions {
    /// Default value applied by the database or the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Dynamic object: keys outside `properties` are allowed.
    #[serde(default)]
    pub extensible: bool,
}

/// Format hint for number fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NumberFormat {
    Integer,
    Decimal,
    #[serde(other)]
    Other,
}

/// Format hint for string fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StringFormat {
    Uuid,
    Date,
    DateTime,
    Time,
    Email,
    Url,
    #[serde(other)]
    Other,
}

/// The kind of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    Object(ObjectSchema),
    Array {
        element: Box<FieldSchema>,
    },
    Union {
        elements: Vec<FieldSchema>,
    },
    Boolean,
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<NumberFormat>,
    },
    String {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<StringFormat>,
    },
}

/// Schema of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub definitions: FieldDefinitions,
}

impl FieldSchema {
    fn of(kind: FieldKind) -> Self {
        Self {
            kind,
            optional: false,
            nullable: false,
            definitions: FieldDefinitions::default(),
        }
    }

    pub fn boolean() -> Self {
        Self::of(FieldKind::Boolean)
    }

    pub fn number() -> Self {
        Self::of(FieldKind::Number { format: None })
    }

    pub fn integer() -> Self {
        Self::of(FieldKind::Number {
            format: Some(NumberFormat::Integer),
        })
    }

    pub fn decimal() -> Self {
        Self::of(FieldKind::Number {
            format: Some(NumberFormat::Decimal),
        })
    }

    pub fn string() -> Self {
        Self::of(FieldKind::String { format: None })
    }

    /// String field with a format hint (`uuid`, `date`, …).
    pub fn formatted(format: StringFormat) -> Self {
        Self::of(FieldKind::String {
            format: Some(format),
        })
    }

    pub fn object(schema: ObjectSchema) -> Self {
        Self::of(FieldKind::Object(schema))
    }

    pub fn array(element: FieldSchema) -> Self {
        Self::of(FieldKind::Array {
            element: Box::new(element),
        })
    }

    pub fn union(elements: Vec<FieldSchema>) -> Self {
        Self::of(FieldKind::Union { elements })
    }

    /// Mark the field optional (may be absent).
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Mark the field nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark an object field as dynamic.
    pub fn extensible(mut self) -> Self {
        self.definitions.extensible = true;
        self
    }

    /// Attach a default value.
    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.definitions.default = Some(value);
        self
    }

    /// Nested object schema, if this is an object field.
    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match &self.kind {
            FieldKind::Object(schema) => Some(schema),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, FieldKind::Object(_))
    }

    /// Object whose keys aren't fixed by the schema.
    pub fn is_dynamic_object(&self) -> bool {
        self.is_object() && self.definitions.extensible
    }

    /// Object with a fixed key set that can be patched key by key.
    pub fn is_plain_object(&self) -> bool {
        self.is_object() && !self.definitions.extensible && !self.nullable
    }

    pub fn is_number(&self) -> bool {
        matches!(self.kind, FieldKind::Number { .. })
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::Number {
                format: Some(NumberFormat::Integer)
            }
        )
    }

    pub fn is_string(&self) -> bool {
        matches!(self.kind, FieldKind::String { .. })
    }

    /// Array and object fields are stored as JSON.
    pub fn is_json(&self) -> bool {
        matches!(self.kind, FieldKind::Object(_) | FieldKind::Array { .. })
    }

    pub fn string_format(&self) -> Option<StringFormat> {
        match self.kind {
            FieldKind::String { format } => format,
            _ => None,
        }
    }

    /// Short name of the kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            FieldKind::Object(_) => "object",
            FieldKind::Array { .. } => "array",
            FieldKind::Union { .. } => "union",
            FieldKind::Boolean => "boolean",
            FieldKind::Number { .. } => "number",
            FieldKind::String { .. } => "string",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_nested_schema() {
        let schema: ObjectSchema = serde_json::from_value(json!({
            "properties": {
                "id": { "type": "string", "format": "uuid" },
                "created": { "type": "string", "format": "date-time", "optional": true },
                "tags": { "type": "array", "element": { "type": "string" } },
                "flag": { "type": "boolean", "nullable": true },
                "bar": {
                    "type": "object",
                    "properties": {
                        "barBar": { "type": "number", "format": "integer" }
                    }
                }
            }
        }))
        .unwrap();

        assert_eq!(
            schema.get("created").unwrap().string_format(),
            Some(StringFormat::DateTime)
        );
        assert!(schema.get("created").unwrap().optional);
        assert!(schema.get("flag").unwrap().nullable);
        assert!(schema.get("tags").unwrap().is_json());

        let bar = schema.get("bar").unwrap();
        assert!(bar.is_plain_object());
        assert!(bar.as_object().unwrap().get("barBar").unwrap().is_integer());
    }

    #[test]
    fn unknown_formats_are_tolerated() {
        let field: FieldSchema =
            serde_json::from_value(json!({ "type": "string", "format": "hostname" })).unwrap();
        assert_eq!(field.string_format(), Some(StringFormat::Other));
    }

    #[test]
    fn builder_matches_deserialized_form() {
        let built = ObjectSchema::new()
            .with_field("id", FieldSchema::formatted(StringFormat::Uuid))
            .with_field("count", FieldSchema::integer().optional());

        let parsed: ObjectSchema = serde_json::from_value(json!({
            "properties": {
                "id": { "type": "string", "format": "uuid" },
                "count": { "type": "number", "format": "integer", "optional": true }
            }
        }))
        .unwrap();

        assert_eq!(built, parsed);
        assert!(built.has_optional_properties());
    }

    #[test]
    fn missing_field_reports_path() {
        let schema = ObjectSchema::new().with_field("id", FieldSchema::string());
        let err = schema.field("nope", "table").unwrap_err();
        assert_eq!(err.path(), Some("table.nope"));
    }
}
