//! Typed bind parameters for prepared inserts.
//!
//! A [`Row`] carries loosely typed [`Value`]s. Before a prepared insert runs,
//! every ordinary column of the target supertable is coerced to its declared
//! [`FieldType`], in column order, producing one [`BindValue`] per
//! placeholder. The driver adapter then maps each variant to its typed bind
//! call.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::{Result, TaosError};
use crate::schema::StableDescriptor;
use crate::types::{FieldType, Row, Value};

/// A parameter coerced to the declared type of its column.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    /// SQL NULL for a column of the given type.
    Null(FieldType),
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
    /// Milliseconds since the Unix epoch, already shifted by the timezone
    /// offset.
    Timestamp(i64),
    VarChar(String),
    NChar(String),
    Json(String),
    VarBinary(Vec<u8>),
    Geometry(Vec<u8>),
}

impl BindValue {
    /// Returns the column type this value binds as.
    pub fn ty(&self) -> FieldType {
        match self {
            BindValue::Null(ty) => *ty,
            BindValue::Bool(_) => FieldType::Bool,
            BindValue::TinyInt(_) => FieldType::TinyInt,
            BindValue::SmallInt(_) => FieldType::SmallInt,
            BindValue::Int(_) => FieldType::Int,
            BindValue::BigInt(_) => FieldType::BigInt,
            BindValue::UTinyInt(_) => FieldType::TinyIntUnsigned,
            BindValue::USmallInt(_) => FieldType::SmallIntUnsigned,
            BindValue::UInt(_) => FieldType::IntUnsigned,
            BindValue::UBigInt(_) => FieldType::BigIntUnsigned,
            BindValue::Float(_) => FieldType::Float,
            BindValue::Double(_) => FieldType::Double,
            BindValue::Timestamp(_) => FieldType::Timestamp,
            BindValue::VarChar(_) => FieldType::VarChar,
            BindValue::NChar(_) => FieldType::NChar,
            BindValue::Json(_) => FieldType::Json,
            BindValue::VarBinary(_) => FieldType::VarBinary,
            BindValue::Geometry(_) => FieldType::Geometry,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BindValue::Null(_))
    }
}

/// Coerces the ordinary columns of `row` into bind parameters.
///
/// Fields are taken in descriptor order regardless of the row's key order.
/// Absent or NULL values bind as typed NULL; tag fields and unknown keys are
/// ignored.
pub fn bind_row(desc: &StableDescriptor, row: &Row, tz_offset: i32) -> Result<Vec<BindValue>> {
    desc.column_fields()
        .map(|field| match row.get_present(&field.name) {
            None => Ok(BindValue::Null(field.ty)),
            Some(value) => coerce(&field.name, field.ty, value, tz_offset),
        })
        .collect()
}

/// Binds every row; see [`bind_row`].
pub fn bind_rows(desc: &StableDescriptor, rows: &[Row], tz_offset: i32) -> Result<Vec<Vec<BindValue>>> {
    rows.iter().map(|row| bind_row(desc, row, tz_offset)).collect()
}

/// Parses a text timestamp, picking the format from the string length.
///
/// | length | format                     |
/// |--------|----------------------------|
/// | 10     | `%Y-%m-%d`                 |
/// | 13     | `%Y-%m-%d %H`              |
/// | 16     | `%Y-%m-%d %H:%M`           |
/// | 19     | `%Y-%m-%d %H:%M:%S`        |
/// | 21–26  | `%Y-%m-%d %H:%M:%S%.f`     |
///
/// # Errors
/// `TimestampFormat` for any other length or a string that does not match.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let parsed = match s.len() {
        10 => NaiveDate::parse_from_str(s, "%Y-%m-%d").map(|d| d.and_time(Default::default())),
        // chrono refuses a datetime without minutes, so complete it first.
        13 => NaiveDateTime::parse_from_str(&format!("{}:00", s), "%Y-%m-%d %H:%M"),
        16 => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"),
        19 => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"),
        21..=26 => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"),
        _ => return Err(TaosError::timestamp_format(s)),
    };
    parsed.map_err(|_| TaosError::timestamp_format(s))
}

/// Converts a local date-time to epoch milliseconds after subtracting
/// `tz_offset` hours.
///
/// # Errors
/// `Conversion` if the shifted date-time leaves chrono's representable range.
pub fn shifted_millis(dt: NaiveDateTime, tz_offset: i32) -> Result<i64> {
    Duration::try_hours(tz_offset.into())
        .and_then(|offset| dt.checked_sub_signed(offset))
        .map(|shifted| shifted.and_utc().timestamp_millis())
        .ok_or_else(|| {
            TaosError::conversion(format!(
                "timestamp {} shifted by {} hours is out of range",
                dt, tz_offset
            ))
        })
}

fn coerce(name: &str, ty: FieldType, value: &Value, tz_offset: i32) -> Result<BindValue> {
    let out_of_range = || {
        TaosError::conversion(format!("field '{}': {:?} does not fit {}", name, value, ty))
    };
    let signed = || value.as_i64().ok_or_else(out_of_range);
    let unsigned = || value.as_u64().ok_or_else(out_of_range);

    Ok(match ty {
        FieldType::Timestamp => match value {
            Value::Timestamp(dt) => BindValue::Timestamp(shifted_millis(*dt, tz_offset)?),
            Value::Text(s) => BindValue::Timestamp(shifted_millis(parse_timestamp(s)?, tz_offset)?),
            // Integers are absolute epoch milliseconds.
            _ => BindValue::Timestamp(signed()?),
        },
        FieldType::Bool => match value {
            Value::Bool(b) => BindValue::Bool(*b),
            _ => BindValue::Bool(signed()? != 0),
        },
        FieldType::TinyInt => BindValue::TinyInt(signed()?.try_into().map_err(|_| out_of_range())?),
        FieldType::SmallInt => BindValue::SmallInt(signed()?.try_into().map_err(|_| out_of_range())?),
        FieldType::Int => BindValue::Int(signed()?.try_into().map_err(|_| out_of_range())?),
        FieldType::BigInt => BindValue::BigInt(signed()?),
        FieldType::TinyIntUnsigned => BindValue::UTinyInt(unsigned()?.try_into().map_err(|_| out_of_range())?),
        FieldType::SmallIntUnsigned => BindValue::USmallInt(unsigned()?.try_into().map_err(|_| out_of_range())?),
        FieldType::IntUnsigned => BindValue::UInt(unsigned()?.try_into().map_err(|_| out_of_range())?),
        FieldType::BigIntUnsigned => BindValue::UBigInt(unsigned()?),
        FieldType::Float => BindValue::Float(value.as_f64().ok_or_else(out_of_range)? as f32),
        FieldType::Double => BindValue::Double(value.as_f64().ok_or_else(out_of_range)?),
        FieldType::VarChar => BindValue::VarChar(text(value)),
        FieldType::NChar => BindValue::NChar(text(value)),
        FieldType::Json => BindValue::Json(text(value)),
        FieldType::VarBinary => BindValue::VarBinary(bytes(value)),
        FieldType::Geometry => BindValue::Geometry(bytes(value)),
    })
}

fn text(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

fn bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::Bytes(b) => b.clone(),
        other => text(other).into_bytes(),
    }
}
