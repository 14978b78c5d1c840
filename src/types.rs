use std::hash::{Hash, Hasher};

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Values that can be stored in a database row or used as query parameters.
///
/// The same enum flows through binding, cache keys and cached rows:
/// ```rust
/// use reactive_query_loader::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValues::Bool(value) => Some(*value),
            RowValues::Int(1) => Some(true),
            RowValues::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            // Try "YYYY-MM-DD HH:MM:SS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            // Try "YYYY-MM-DD HH:MM:SS.SSS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Identity comparison used by cache keys.
    ///
    /// Floats compare by bit pattern so that the relation stays reflexive
    /// (`NaN` equals itself) and agrees with [`RowValues::key_hash`].
    #[must_use]
    pub fn key_eq(&self, other: &RowValues) -> bool {
        match (self, other) {
            (RowValues::Float(a), RowValues::Float(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }

    /// Hash consistent with [`RowValues::key_eq`].
    pub fn key_hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            RowValues::Int(i) => i.hash(state),
            RowValues::Float(f) => f.to_bits().hash(state),
            RowValues::Text(s) => s.hash(state),
            RowValues::Bool(b) => b.hash(state),
            RowValues::Timestamp(dt) => dt.hash(state),
            RowValues::Null => {}
            // serde_json renders object keys in a stable order
            RowValues::JSON(v) => v.to_string().hash(state),
            RowValues::Blob(bytes) => bytes.hash(state),
        }
    }
}

/// Declared SQL type of a bound parameter.
///
/// Binding coerces the supplied [`RowValues`] into this type; a value that
/// cannot be represented fails the bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SqlType {
    /// Bind the value as supplied.
    #[default]
    Inferred,
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
    Json,
    Blob,
}

impl SqlType {
    /// Coerce `value` into this SQL type.
    ///
    /// # Errors
    ///
    /// Returns a description of the mismatch when the value cannot be converted.
    pub fn coerce(self, value: &RowValues) -> Result<RowValues, String> {
        if value.is_null() || self == SqlType::Inferred {
            return Ok(value.clone());
        }
        let mismatch = || format!("cannot bind {value:?} as {self:?}");
        match (self, value) {
            (SqlType::Integer, RowValues::Int(_)) => Ok(value.clone()),
            (SqlType::Integer, RowValues::Bool(b)) => Ok(RowValues::Int(i64::from(*b))),
            #[allow(clippy::cast_possible_truncation)]
            (SqlType::Integer, RowValues::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
                Ok(RowValues::Int(*f as i64))
            }
            (SqlType::Integer, RowValues::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(RowValues::Int)
                .map_err(|e| format!("{}: {e}", mismatch())),
            (SqlType::Float, RowValues::Float(_)) => Ok(value.clone()),
            #[allow(clippy::cast_precision_loss)]
            (SqlType::Float, RowValues::Int(i)) => Ok(RowValues::Float(*i as f64)),
            (SqlType::Float, RowValues::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(RowValues::Float)
                .map_err(|e| format!("{}: {e}", mismatch())),
            (SqlType::Text, RowValues::Text(_)) => Ok(value.clone()),
            (SqlType::Text, RowValues::Int(i)) => Ok(RowValues::Text(i.to_string())),
            (SqlType::Text, RowValues::Float(f)) => Ok(RowValues::Text(f.to_string())),
            (SqlType::Text, RowValues::Bool(b)) => Ok(RowValues::Text(b.to_string())),
            (SqlType::Text, RowValues::Timestamp(dt)) => {
                Ok(RowValues::Text(dt.format("%F %T%.f").to_string()))
            }
            (SqlType::Text, RowValues::JSON(v)) => Ok(RowValues::Text(v.to_string())),
            (SqlType::Boolean, RowValues::Text(s)) => match s.trim().to_ascii_lowercase().as_str()
            {
                "true" | "t" | "1" => Ok(RowValues::Bool(true)),
                "false" | "f" | "0" => Ok(RowValues::Bool(false)),
                _ => Err(mismatch()),
            },
            (SqlType::Boolean, other) => other.as_bool().map(RowValues::Bool).ok_or_else(mismatch),
            (SqlType::Timestamp, other) => other
                .as_timestamp()
                .map(RowValues::Timestamp)
                .ok_or_else(mismatch),
            (SqlType::Json, RowValues::JSON(_)) => Ok(value.clone()),
            (SqlType::Json, RowValues::Text(s)) => serde_json::from_str(s)
                .map(RowValues::JSON)
                .map_err(|e| format!("{}: {e}", mismatch())),
            (SqlType::Blob, RowValues::Blob(_)) => Ok(value.clone()),
            _ => Err(mismatch()),
        }
    }
}

/// A parameter value together with its declared SQL type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub value: RowValues,
    pub sql_type: SqlType,
}

impl TypedValue {
    #[must_use]
    pub fn new(value: RowValues, sql_type: SqlType) -> Self {
        Self { value, sql_type }
    }

    /// A value bound without coercion.
    #[must_use]
    pub fn inferred(value: RowValues) -> Self {
        Self::new(value, SqlType::Inferred)
    }
}

impl From<RowValues> for TypedValue {
    fn from(value: RowValues) -> Self {
        TypedValue::inferred(value)
    }
}

/// The database backends this crate can execute against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum DatabaseType {
    /// `PostgreSQL` database
    #[cfg(feature = "postgres")]
    Postgres,
    /// `SQLite` database
    #[cfg(feature = "sqlite")]
    Sqlite,
}
