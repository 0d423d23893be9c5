//! Bound parameters.
//!
//! A [`SqlParameter`] is a JSON value plus an optional backend type hint. Hints
//! come from the field schema (see [`crate::encode`]) or from runtime detection.
//!
//! `SqlParameter` implements [`ToSql`] so that queries rendered with
//! [`PlaceholderStyle::Dollar`](crate::config::PlaceholderStyle::Dollar) can be
//! handed to `tokio-postgres` directly.

use crate::validate::{parse_date, parse_date_time, parse_time, parse_uuid};
use bytes::BytesMut;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::str::FromStr;
use tokio_postgres::types::{IsNull, ToSql, Type};

/// Backend type hint attached to a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeHint {
    Uuid,
    Date,
    Time,
    Timestamp,
    Json,
}

impl TypeHint {
    /// The SQL type name used when a cast is rendered.
    pub fn sql_type(self) -> &'static str {
        match self {
            TypeHint::Uuid => "uuid",
            TypeHint::Date => "date",
            TypeHint::Time => "time",
            TypeHint::Timestamp => "timestamptz",
            TypeHint::Json => "jsonb",
        }
    }
}

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlParameter {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<TypeHint>,
}

impl SqlParameter {
    /// Parameter without a type hint.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            hint: None,
        }
    }

    /// Parameter with a type hint.
    pub fn hinted(value: impl Into<Value>, hint: TypeHint) -> Self {
        Self {
            value: value.into(),
            hint: Some(hint),
        }
    }

    /// JSON parameter (objects, arrays and JSON path values).
    pub fn json(value: impl Into<Value>) -> Self {
        Self::hinted(value, TypeHint::Json)
    }

    fn encode_plain(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match &self.value {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql_checked(ty, out),
            Value::Number(n) => encode_number(n, ty, out),
            Value::String(s) => match *ty {
                Type::UUID => parse_uuid(s)?.to_sql_checked(ty, out),
                Type::JSON | Type::JSONB => self.value.to_sql_checked(ty, out),
                _ => s.as_str().to_sql_checked(ty, out),
            },
            Value::Array(_) | Value::Object(_) => self.value.to_sql_checked(ty, out),
        }
    }
}

impl From<Value> for SqlParameter {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

fn encode_number(
    n: &serde_json::Number,
    ty: &Type,
    out: &mut BytesMut,
) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
    match *ty {
        Type::INT2 => {
            let v = n.as_i64().ok_or("expected an integer")?;
            i16::try_from(v)?.to_sql_checked(ty, out)
        }
        Type::INT4 => {
            let v = n.as_i64().ok_or("expected an integer")?;
            i32::try_from(v)?.to_sql_checked(ty, out)
        }
        Type::INT8 => n
            .as_i64()
            .ok_or("expected an integer")?
            .to_sql_checked(ty, out),
        Type::FLOAT4 => (n.as_f64().ok_or("expected a number")? as f32).to_sql_checked(ty, out),
        Type::FLOAT8 => n.as_f64().ok_or("expected a number")?.to_sql_checked(ty, out),
        Type::NUMERIC => {
            let text = n.to_string();
            let decimal = Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text))?;
            decimal.to_sql_checked(ty, out)
        }
        Type::JSON | Type::JSONB => Value::Number(n.clone()).to_sql_checked(ty, out),
        _ => Err(format!("cannot bind number to column type {ty}").into()),
    }
}

impl ToSql for SqlParameter {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        if self.value.is_null() {
            return Ok(IsNull::Yes);
        }

        let text = self.value.as_str();
        match (self.hint, text) {
            (Some(TypeHint::Json), _) => self.value.to_sql_checked(ty, out),
            (Some(TypeHint::Uuid), Some(s)) => parse_uuid(s)?.to_sql_checked(ty, out),
            (Some(TypeHint::Date), Some(s)) => parse_date(s)?.to_sql_checked(ty, out),
            (Some(TypeHint::Time), Some(s)) => parse_time(s)?.to_sql_checked(ty, out),
            (Some(TypeHint::Timestamp), Some(s)) => {
                let ts = parse_date_time(s)?;
                if *ty == Type::TIMESTAMP {
                    ts.naive_utc().to_sql_checked(ty, out)
                } else {
                    ts.to_sql_checked(ty, out)
                }
            }
            (Some(hint), None) => {
                Err(format!("{hint:?} parameter must be a string, got {}", self.value).into())
            }
            (None, _) => self.encode_plain(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // The concrete check happens per value in `to_sql`.
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

/// An ordered list of parameters, numbered in push order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamList {
    params: Vec<SqlParameter>,
}

impl ParamList {
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Add a parameter and return its 0-based index.
    pub fn push(&mut self, param: SqlParameter) -> usize {
        self.params.push(param);
        self.params.len() - 1
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SqlParameter> {
        self.params.iter()
    }

    pub fn into_vec(self) -> Vec<SqlParameter> {
        self.params
    }
}
