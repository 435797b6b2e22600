//! Row → caller type conversion.
//!
//! A [`Selector`] says how a row becomes a `T`; the functions here apply it
//! with many, optional or scalar cardinality. The selector's variant is
//! matched once per call, never per row, and row content never decides the
//! branch.

use serde::de::DeserializeOwned;
use std::fmt;

use crate::error::{Error, MultipleRowsError, Result};
use crate::record::Record;
use crate::value::Value;

/// A typed model built from a row's named fields.
///
/// Any `DeserializeOwned` type can be a model; field names are matched
/// against column names. `validate` runs after construction and its error
/// message is surfaced as [`Error::ModelConstruction`].
pub trait Model: DeserializeOwned {
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

type MapFn<I, T> = Box<dyn Fn(I) -> Result<T> + Send + Sync>;

/// How each row is converted.
pub enum Selector<T = Record> {
    /// Rows are returned unchanged.
    Raw(fn(Record) -> T),
    /// One model instance per row.
    Model(fn(Record) -> Result<T>),
    /// An arbitrary conversion per row.
    Map(MapFn<Record, T>),
}

impl Selector<Record> {
    pub fn raw() -> Self {
        Selector::Raw(std::convert::identity)
    }
}

impl Default for Selector<Record> {
    fn default() -> Self {
        Selector::raw()
    }
}

impl<T: Model> Selector<T> {
    pub fn model() -> Self {
        Selector::Model(construct_model::<T>)
    }
}

impl<T> Selector<T> {
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(Record) -> T + Send + Sync + 'static,
    {
        Selector::Map(Box::new(move |record| Ok(f(record))))
    }

    pub fn try_map<F>(f: F) -> Self
    where
        F: Fn(Record) -> Result<T> + Send + Sync + 'static,
    {
        Selector::Map(Box::new(f))
    }

    fn apply(&self, record: Record) -> Result<T> {
        match self {
            Selector::Raw(f) => Ok(f(record)),
            Selector::Model(f) => f(record),
            Selector::Map(f) => f(record),
        }
    }
}

impl<T> fmt::Debug for Selector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Raw(_) => write!(f, "Selector::Raw"),
            Selector::Model(_) => write!(f, "Selector::Model<{}>", std::any::type_name::<T>()),
            Selector::Map(_) => write!(f, "Selector::Map"),
        }
    }
}

/// How a single scalar value is converted.
pub enum ScalarSelector<T = Value> {
    Raw(fn(Value) -> T),
    /// Deserialize the value's JSON form into `T`.
    Decode(fn(Value) -> Result<T>),
    Map(MapFn<Value, T>),
}

impl ScalarSelector<Value> {
    pub fn raw() -> Self {
        ScalarSelector::Raw(std::convert::identity)
    }
}

impl Default for ScalarSelector<Value> {
    fn default() -> Self {
        ScalarSelector::raw()
    }
}

impl<T: DeserializeOwned> ScalarSelector<T> {
    pub fn decode() -> Self {
        ScalarSelector::Decode(decode_value::<T>)
    }
}

impl<T> ScalarSelector<T> {
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(Value) -> T + Send + Sync + 'static,
    {
        ScalarSelector::Map(Box::new(move |value| Ok(f(value))))
    }

    pub fn try_map<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<T> + Send + Sync + 'static,
    {
        ScalarSelector::Map(Box::new(f))
    }
}

impl<T> fmt::Debug for ScalarSelector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarSelector::Raw(_) => write!(f, "ScalarSelector::Raw"),
            ScalarSelector::Decode(_) => {
                write!(f, "ScalarSelector::Decode<{}>", std::any::type_name::<T>())
            }
            ScalarSelector::Map(_) => write!(f, "ScalarSelector::Map"),
        }
    }
}

fn construct_model<M: Model>(record: Record) -> Result<M> {
    let model_error = |message: String| Error::ModelConstruction {
        model: std::any::type_name::<M>(),
        message,
    };
    if let Some((column, ty)) = record
        .iter()
        .find_map(|(name, value)| value.undecoded().map(|ty| (name, ty)))
    {
        return Err(model_error(format!(
            "column {} has type {} which could not be decoded",
            column, ty
        )));
    }
    let fields = serde_json::Value::Object(record.to_json());
    let model: M = serde_json::from_value(fields).map_err(|e| model_error(e.to_string()))?;
    model.validate().map_err(model_error)?;
    Ok(model)
}

fn decode_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    let decode_error = |message: String| Error::ModelConstruction {
        model: std::any::type_name::<T>(),
        message,
    };
    if let Some(ty) = value.undecoded() {
        return Err(decode_error(format!("type {} could not be decoded", ty)));
    }
    serde_json::from_value(value.to_json()).map_err(|e| decode_error(e.to_string()))
}

/// Map every row, in order.
pub fn map_many<T>(rows: Vec<Record>, selector: &Selector<T>) -> Result<Vec<T>> {
    match selector {
        Selector::Raw(f) => Ok(rows.into_iter().map(f).collect()),
        Selector::Model(f) => rows.into_iter().map(f).collect(),
        Selector::Map(f) => rows.into_iter().map(|row| f(row)).collect(),
    }
}

/// Map zero or one row. More than one row is a [`MultipleRowsError`]
/// carrying `sql` and every row.
pub fn map_optional<T>(sql: &str, mut rows: Vec<Record>, selector: &Selector<T>) -> Result<Option<T>> {
    match rows.len() {
        0 => Ok(None),
        1 => match rows.pop() {
            Some(row) => selector.apply(row).map(Some),
            None => Ok(None),
        },
        n => {
            tracing::warn!(rows = n, sql = %sql, "expected at most one row");
            Err(MultipleRowsError {
                sql: sql.to_string(),
                rows,
            }
            .into())
        }
    }
}

/// Map a single already-extracted value. Both an absent value and SQL NULL
/// map to `None`.
pub fn map_scalar<T>(value: Option<Value>, selector: &ScalarSelector<T>) -> Result<Option<T>> {
    let value = match value {
        Some(Value::Null) | None => return Ok(None),
        Some(value) => value,
    };
    match selector {
        ScalarSelector::Raw(f) => Ok(Some(f(value))),
        ScalarSelector::Decode(f) => f(value).map(Some),
        ScalarSelector::Map(f) => f(value).map(Some),
    }
}
