//! Dynamically typed values.
//!
//! [`Value`] is used both for bind parameters going to the driver and for the
//! cells of rows coming back from it.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error as StdError;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, Kind, ToSql, Type};
use tokio_postgres::Row;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Numeric(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
    Array(Vec<Value>),
    /// A column whose type could not be decoded; holds the type name.
    Unknown(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short type name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int16(_) => "int2",
            Value::Int32(_) => "int4",
            Value::Int64(_) => "int8",
            Value::Float32(_) => "float4",
            Value::Float64(_) => "float8",
            Value::Numeric(_) => "numeric",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytea",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::DateTime(_) => "timestamp",
            Value::TimestampTz(_) => "timestamptz",
            Value::Uuid(_) => "uuid",
            Value::Json(_) => "jsonb",
            Value::Array(_) => "array",
            Value::Unknown(_) => "unknown",
        }
    }

    pub fn display(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int16(i) => i.to_string(),
            Value::Int32(i) => i.to_string(),
            Value::Int64(i) => i.to_string(),
            Value::Float32(f) => f.to_string(),
            Value::Float64(f) => f.to_string(),
            Value::Numeric(d) => d.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => format!("[{} bytes]", b.len()),
            Value::Date(d) => d.to_string(),
            Value::Time(t) => t.to_string(),
            Value::DateTime(dt) => dt.to_string(),
            Value::TimestampTz(dt) => dt.to_string(),
            Value::Uuid(u) => u.to_string(),
            Value::Json(j) => j.to_string(),
            Value::Array(arr) => {
                let items: Vec<String> = arr.iter().map(|v| v.display()).collect();
                format!("{{{}}}", items.join(", "))
            }
            Value::Unknown(s) => format!("<{}>", s),
        }
    }

    /// JSON view of the value, shaped so serde models can deserialize it.
    ///
    /// Temporal values use ISO 8601 text, numerics keep their exact digits as
    /// text and bytes become an array of numbers. An undecoded cell has no
    /// JSON form and becomes `null`; model construction rejects it first.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int16(i) => serde_json::json!(*i),
            Value::Int32(i) => serde_json::json!(*i),
            Value::Int64(i) => serde_json::json!(*i),
            Value::Float32(f) => serde_json::json!(*f),
            Value::Float64(f) => serde_json::json!(*f),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::json!(b),
            Value::DateTime(dt) => {
                serde_json::Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            Value::TimestampTz(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Value::Json(j) => j.clone(),
            Value::Array(arr) => serde_json::Value::Array(arr.iter().map(Value::to_json).collect()),
            Value::Unknown(_) => serde_json::Value::Null,
            other => serde_json::Value::String(other.display()),
        }
    }

    /// Build a value from JSON. Integers become `Int64`, other numbers
    /// `Float64`, and objects stay JSON.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int64(i),
                None => Value::Float64(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            obj @ serde_json::Value::Object(_) => Value::Json(obj),
        }
    }

    /// Type name of the first undecoded cell in this value, if any.
    pub fn undecoded(&self) -> Option<&str> {
        match self {
            Value::Unknown(name) => Some(name),
            Value::Array(items) => items.iter().find_map(Value::undecoded),
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from_json)
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    String => Text,
    &str => Text,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    DateTime<Utc> => TimestampTz,
    Uuid => Uuid,
    Decimal => Numeric,
    serde_json::Value => Json,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

type BoxError = Box<dyn StdError + Sync + Send>;

fn mismatch(value: &Value, ty: &Type) -> BoxError {
    format!("cannot bind a {} value to a parameter of type {}", value.kind(), ty).into()
}

/// Integers follow the parameter type the server inferred, so an `Int64`
/// bound against an `int4` column is sent as four bytes.
fn int_to_sql(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::OID => u32::try_from(v)?.to_sql(ty, out),
        Type::NUMERIC => Decimal::from(v).to_sql(ty, out),
        _ => v.to_sql_checked(ty, out),
    }
}

fn float_to_sql(v: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from(v)?.to_sql(ty, out),
        _ => v.to_sql_checked(ty, out),
    }
}

/// Text is parsed when the parameter has a typed form, which is how dates
/// and ids arrive from JSON statements. Text-like parameters take it as is.
fn text_to_sql(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::DATE => s.parse::<NaiveDate>()?.to_sql(ty, out),
        Type::TIME => s.parse::<NaiveTime>()?.to_sql(ty, out),
        Type::TIMESTAMP => s.parse::<NaiveDateTime>()?.to_sql(ty, out),
        Type::TIMESTAMPTZ => s.parse::<DateTime<Utc>>()?.to_sql(ty, out),
        Type::UUID => s.parse::<Uuid>()?.to_sql(ty, out),
        Type::NUMERIC => s.parse::<Decimal>()?.to_sql(ty, out),
        _ => s.to_sql_checked(ty, out),
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql_checked(ty, out),
            Value::Int16(i) => int_to_sql(i64::from(*i), ty, out),
            Value::Int32(i) => int_to_sql(i64::from(*i), ty, out),
            Value::Int64(i) => int_to_sql(*i, ty, out),
            Value::Float32(f) => float_to_sql(f64::from(*f), ty, out),
            Value::Float64(f) => float_to_sql(*f, ty, out),
            Value::Numeric(d) => d.to_sql_checked(ty, out),
            Value::Text(s) => text_to_sql(s, ty, out),
            Value::Bytes(b) => b.as_slice().to_sql_checked(ty, out),
            Value::Date(d) => d.to_sql_checked(ty, out),
            Value::Time(t) => t.to_sql_checked(ty, out),
            Value::DateTime(dt) => dt.to_sql_checked(ty, out),
            Value::TimestampTz(dt) => dt.to_sql_checked(ty, out),
            Value::Uuid(u) => u.to_sql_checked(ty, out),
            Value::Json(j) => j.to_sql_checked(ty, out),
            Value::Array(items) => match ty.kind() {
                Kind::Array(_) => items.as_slice().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Unknown(name) => {
                Err(format!("cannot bind an undecoded {} value", name).into())
            }
        }
    }

    // Every variant checks the concrete parameter type in `to_sql`.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Read one cell. `Ok(None)` is SQL NULL; a decode failure keeps the type name.
fn cell<'a, T: FromSql<'a>>(row: &'a Row, idx: usize, wrap: impl FnOnce(T) -> Value) -> Value {
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => wrap(v),
        Ok(None) => Value::Null,
        Err(_) => Value::Unknown(row.columns()[idx].type_().name().to_string()),
    }
}

fn array_cell<'a, T: FromSql<'a>>(row: &'a Row, idx: usize, wrap: fn(T) -> Value) -> Value {
    cell::<Vec<Option<T>>>(row, idx, |items| {
        Value::Array(
            items
                .into_iter()
                .map(|item| item.map(wrap).unwrap_or(Value::Null))
                .collect(),
        )
    })
}

/// Extract a cell from a driver row based on its column type.
pub(crate) fn extract_value(row: &Row, idx: usize, pg_type: &Type) -> Value {
    match *pg_type {
        Type::BOOL => cell(row, idx, Value::Bool),
        Type::INT2 => cell(row, idx, Value::Int16),
        Type::INT4 => cell(row, idx, Value::Int32),
        Type::INT8 => cell(row, idx, Value::Int64),
        Type::OID => cell::<u32>(row, idx, |v| Value::Int64(i64::from(v))),
        Type::FLOAT4 => cell(row, idx, Value::Float32),
        Type::FLOAT8 => cell(row, idx, Value::Float64),
        Type::NUMERIC => cell(row, idx, Value::Numeric),
        Type::TEXT | Type::VARCHAR | Type::NAME | Type::CHAR | Type::BPCHAR => {
            cell(row, idx, Value::Text)
        }
        Type::BYTEA => cell(row, idx, Value::Bytes),
        Type::DATE => cell(row, idx, Value::Date),
        Type::TIME => cell(row, idx, Value::Time),
        Type::TIMESTAMP => cell(row, idx, Value::DateTime),
        Type::TIMESTAMPTZ => cell(row, idx, Value::TimestampTz),
        Type::UUID => cell(row, idx, Value::Uuid),
        Type::JSON | Type::JSONB => cell(row, idx, Value::Json),
        Type::BOOL_ARRAY => array_cell(row, idx, Value::Bool),
        Type::INT2_ARRAY => array_cell(row, idx, Value::Int16),
        Type::INT4_ARRAY => array_cell(row, idx, Value::Int32),
        Type::INT8_ARRAY => array_cell(row, idx, Value::Int64),
        Type::FLOAT4_ARRAY => array_cell(row, idx, Value::Float32),
        Type::FLOAT8_ARRAY => array_cell(row, idx, Value::Float64),
        Type::NUMERIC_ARRAY => array_cell(row, idx, Value::Numeric),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => array_cell(row, idx, Value::Text),
        Type::UUID_ARRAY => array_cell(row, idx, Value::Uuid),
        Type::JSONB_ARRAY => array_cell(row, idx, Value::Json),
        _ => cell(row, idx, Value::Text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.display(), "NULL");
        assert_eq!(Value::Bool(true).display(), "true");
        assert_eq!(Value::Int64(9_999_999).display(), "9999999");
        assert_eq!(Value::Bytes(vec![1, 2, 3]).display(), "[3 bytes]");
        let arr = Value::Array(vec![Value::Int32(1), Value::Int32(2)]);
        assert_eq!(arr.display(), "{1, 2}");
    }

    #[test]
    fn test_to_json_shapes() {
        assert_eq!(Value::Int32(42).to_json(), serde_json::json!(42));
        assert_eq!(Value::Bytes(vec![1, 2]).to_json(), serde_json::json!([1, 2]));
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(
            Value::DateTime(dt).to_json(),
            serde_json::json!("2024-03-01T10:30:00")
        );
    }

    #[test]
    fn test_from_json_numbers() {
        assert_eq!(Value::from_json(serde_json::json!(7)), Value::Int64(7));
        assert_eq!(Value::from_json(serde_json::json!(1.5)), Value::Float64(1.5));
        assert_eq!(
            Value::from_json(serde_json::json!({"a": 1})),
            Value::Json(serde_json::json!({"a": 1}))
        );
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }

    #[test]
    fn test_int_coerces_to_parameter_type() {
        let mut buf = BytesMut::new();
        Value::Int64(7).to_sql(&Type::INT4, &mut buf).unwrap();
        assert_eq!(buf.len(), 4);

        let mut buf = BytesMut::new();
        Value::Int32(7).to_sql(&Type::INT8, &mut buf).unwrap();
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn test_int_overflow_is_rejected() {
        let mut buf = BytesMut::new();
        assert!(Value::Int64(i64::MAX).to_sql(&Type::INT2, &mut buf).is_err());
    }

    #[test]
    fn test_array_requires_array_type() {
        let mut buf = BytesMut::new();
        let arr = Value::Array(vec![Value::Int32(1)]);
        assert!(arr.to_sql(&Type::INT4, &mut buf).is_err());
        assert!(arr.to_sql(&Type::INT4_ARRAY, &mut buf).is_ok());
    }

    #[test]
    fn test_null_binds_as_null() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            Value::Null.to_sql(&Type::TEXT, &mut buf).unwrap(),
            IsNull::Yes
        ));
    }

    fn bind(value: Value, ty: &Type) -> Result<BytesMut, BoxError> {
        let mut buf = BytesMut::new();
        value.to_sql_checked(ty, &mut buf)?;
        Ok(buf)
    }

    #[test]
    fn test_mismatched_parameter_type_is_rejected() {
        assert!(bind(Value::Text("1234".into()), &Type::INT4).is_err());
        assert!(bind(Value::Int64(5), &Type::TEXT).is_err());
        assert!(bind(Value::Bool(true), &Type::INT8).is_err());
        assert!(bind(Value::Date(NaiveDate::MIN), &Type::TEXT).is_err());
        assert!(bind(Value::Array(vec![Value::Text("x".into())]), &Type::INT4_ARRAY).is_err());
        assert!(bind(Value::Unknown("inet".into()), &Type::TEXT).is_err());
    }

    #[test]
    fn test_text_parses_into_typed_parameters() {
        assert_eq!(bind(Value::Text("2024-03-01".into()), &Type::DATE).unwrap().len(), 4);
        assert_eq!(
            bind(Value::Text("2024-03-01T10:30:00".into()), &Type::TIMESTAMP).unwrap().len(),
            8
        );
        assert_eq!(
            bind(Value::Text(Uuid::nil().to_string()), &Type::UUID).unwrap().len(),
            16
        );
        assert!(bind(Value::Text("12.50".into()), &Type::NUMERIC).is_ok());
        assert!(bind(Value::Text("not a date".into()), &Type::DATE).is_err());
        assert_eq!(bind(Value::Text("abc".into()), &Type::VARCHAR).unwrap()[..], b"abc"[..]);
    }

    #[test]
    fn test_numbers_bind_to_numeric() {
        assert!(bind(Value::Float64(1.5), &Type::NUMERIC).is_ok());
        assert!(bind(Value::Numeric(Decimal::new(15, 1)), &Type::NUMERIC).is_ok());
        assert!(bind(Value::Numeric(Decimal::new(15, 1)), &Type::FLOAT8).is_err());
        assert!(bind(Value::Int64(3), &Type::NUMERIC).is_ok());
        assert!(bind(Value::Float64(f64::NAN), &Type::NUMERIC).is_err());
    }

    #[test]
    fn test_undecoded_is_found_in_arrays() {
        assert_eq!(Value::Unknown("inet".into()).undecoded(), Some("inet"));
        let arr = Value::Array(vec![Value::Int32(1), Value::Unknown("cidr".into())]);
        assert_eq!(arr.undecoded(), Some("cidr"));
        assert_eq!(Value::Int32(1).undecoded(), None);
        assert_eq!(Value::Unknown("inet".into()).to_json(), serde_json::Value::Null);
    }
}
