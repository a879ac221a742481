//! Scalar values, rows and TDengine field types.
//!
//! [`Value`] is what callers hand in and what queries hand back. [`Row`] is an
//! ordered record keyed by field name with case-insensitive lookup, used both
//! for insert input and for `select` output. [`FieldType`] is the declared
//! type of a column or tag as reported by `DESCRIBE`.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;

use crate::error::TaosError;

/// Key carrying the target table in a multi-table batch row.
pub const TABLE_KEY: &str = "table";

/// Key carrying the target supertable in a multi-table batch row.
pub const STABLE_KEY: &str = "stable";

/// TDengine field data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Timestamp,
    Bool,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    TinyIntUnsigned,
    SmallIntUnsigned,
    IntUnsigned,
    BigIntUnsigned,
    Float,
    Double,
    /// `BINARY` is an alias of `VARCHAR` on 3.x servers.
    VarChar,
    NChar,
    Json,
    VarBinary,
    Geometry,
}

impl FieldType {
    /// Returns the type name as `DESCRIBE` prints it.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::Bool => "BOOL",
            FieldType::TinyInt => "TINYINT",
            FieldType::SmallInt => "SMALLINT",
            FieldType::Int => "INT",
            FieldType::BigInt => "BIGINT",
            FieldType::TinyIntUnsigned => "TINYINT UNSIGNED",
            FieldType::SmallIntUnsigned => "SMALLINT UNSIGNED",
            FieldType::IntUnsigned => "INT UNSIGNED",
            FieldType::BigIntUnsigned => "BIGINT UNSIGNED",
            FieldType::Float => "FLOAT",
            FieldType::Double => "DOUBLE",
            FieldType::VarChar => "VARCHAR",
            FieldType::NChar => "NCHAR",
            FieldType::Json => "JSON",
            FieldType::VarBinary => "VARBINARY",
            FieldType::Geometry => "GEOMETRY",
        }
    }

    /// Returns true if literals of this type must be quoted in SQL text.
    pub fn is_quoted(&self) -> bool {
        matches!(
            self,
            FieldType::Timestamp
                | FieldType::VarChar
                | FieldType::NChar
                | FieldType::Json
                | FieldType::VarBinary
                | FieldType::Geometry
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = TaosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        // Older servers print the length inline, e.g. `NCHAR(20)`.
        let base = normalized.split('(').next().unwrap_or_default().trim();
        Ok(match base {
            "TIMESTAMP" => FieldType::Timestamp,
            "BOOL" => FieldType::Bool,
            "TINYINT" => FieldType::TinyInt,
            "SMALLINT" => FieldType::SmallInt,
            "INT" => FieldType::Int,
            "BIGINT" => FieldType::BigInt,
            "TINYINT UNSIGNED" => FieldType::TinyIntUnsigned,
            "SMALLINT UNSIGNED" => FieldType::SmallIntUnsigned,
            "INT UNSIGNED" => FieldType::IntUnsigned,
            "BIGINT UNSIGNED" => FieldType::BigIntUnsigned,
            "FLOAT" => FieldType::Float,
            "DOUBLE" => FieldType::Double,
            "BINARY" | "VARCHAR" => FieldType::VarChar,
            "NCHAR" => FieldType::NChar,
            "JSON" => FieldType::Json,
            "VARBINARY" => FieldType::VarBinary,
            "GEOMETRY" => FieldType::Geometry,
            _ => {
                return Err(TaosError::conversion(format!(
                    "Unsupported field type: {}",
                    s
                )));
            }
        })
    }
}

/// A scalar value going into or coming out of TDengine.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    UTinyInt(u8),
    USmallInt(u16),
    UInt(u32),
    UBigInt(u64),
    Float(f32),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value as a signed integer if it is any integer variant
    /// that fits.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::TinyInt(v) => Some(v.into()),
            Value::SmallInt(v) => Some(v.into()),
            Value::Int(v) => Some(v.into()),
            Value::BigInt(v) => Some(v),
            Value::UTinyInt(v) => Some(v.into()),
            Value::USmallInt(v) => Some(v.into()),
            Value::UInt(v) => Some(v.into()),
            Value::UBigInt(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Returns the value as an unsigned integer if it is a non-negative
    /// integer.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UBigInt(v) => Some(v),
            _ => self.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(v) => Some(v.into()),
            Value::Double(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::TinyInt(v) => write!(f, "{}", v),
            Value::SmallInt(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::UTinyInt(v) => write!(f, "{}", v),
            Value::USmallInt(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::UBigInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Bytes(v) => f.write_str(&String::from_utf8_lossy(v)),
            Value::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.3f")),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar!(
    bool => Bool,
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    u8 => UTinyInt,
    u16 => USmallInt,
    u32 => UInt,
    u64 => UBigInt,
    f32 => Float,
    f64 => Double,
    String => Text,
    Vec<u8> => Bytes,
    NaiveDateTime => Timestamp,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Ordered record of named values.
///
/// Lookups ignore ASCII case, matching how TDengine folds identifiers.
/// Setting a field that already exists replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Row::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a field, replacing an existing one with the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx].1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Returns the value of a field, or `None` if the row does not carry it.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.position(name).map(|idx| &self.entries[idx].1)
    }

    /// Returns the value of a field if present and not NULL.
    pub fn get_present(&self, name: &str) -> Option<&Value> {
        self.get(name).filter(|v| !v.is_null())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.position(name).map(|idx| self.entries.remove(idx).1)
    }

    /// Returns the `table` metadata key of a multi-table batch row.
    pub fn table(&self) -> Option<&str> {
        self.get(TABLE_KEY).and_then(Value::as_str)
    }

    /// Returns the `stable` metadata key of a multi-table batch row.
    pub fn stable(&self) -> Option<&str> {
        self.get(STABLE_KEY).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the field values in insertion order.
    pub fn into_values(self) -> Vec<Value> {
        self.entries.into_iter().map(|(_, v)| v).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.set(k, v);
        }
        row
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
