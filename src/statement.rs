//! Column-wise parameter binding for the TDengine `Stmt` API.
//!
//! Prepared inserts bind whole columns at once. [`columns_from_rows`]
//! transposes row-major [`BindValue`]s into one typed `ColumnView` per
//! placeholder.

use taos_client::sync::ColumnView;

use crate::bind::BindValue;
use crate::error::{Result, TaosError};
use crate::types::FieldType;

/// Transposes bound rows into typed column views.
///
/// # Errors
/// Returns `Conversion` when rows have different widths or a column mixes
/// types (typed NULLs match any row of their declared type).
pub fn columns_from_rows(rows: &[Vec<BindValue>]) -> Result<Vec<ColumnView>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let width = first.len();
    if let Some(row) = rows.iter().find(|row| row.len() != width) {
        return Err(TaosError::conversion(format!(
            "Cannot bind rows of different widths: {} and {}",
            width,
            row.len()
        )));
    }

    (0..width)
        .map(|col| {
            let ty = column_type(rows, col)?;
            column_view(ty, rows.iter().map(|row| &row[col]), col)
        })
        .collect()
}

/// Declared type of a column: the first row's type, checked against the rest.
fn column_type(rows: &[Vec<BindValue>], col: usize) -> Result<FieldType> {
    let ty = rows[0][col].ty();
    match rows.iter().map(|row| row[col].ty()).find(|t| *t != ty) {
        Some(other) => Err(TaosError::conversion(format!(
            "Column {} mixes {} and {} values",
            col, ty, other
        ))),
        None => Ok(ty),
    }
}

macro_rules! collect_column {
    ($values:expr, $variant:ident) => {
        $values
            .map(|v| match v {
                BindValue::$variant(x) => Some(x.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
    };
}

fn column_view<'a>(
    ty: FieldType,
    values: impl Iterator<Item = &'a BindValue>,
    col: usize,
) -> Result<ColumnView> {
    let view = match ty {
        FieldType::Bool => ColumnView::from_bools(collect_column!(values, Bool)),
        FieldType::TinyInt => ColumnView::from_tiny_ints(collect_column!(values, TinyInt)),
        FieldType::SmallInt => ColumnView::from_small_ints(collect_column!(values, SmallInt)),
        FieldType::Int => ColumnView::from_ints(collect_column!(values, Int)),
        FieldType::BigInt => ColumnView::from_big_ints(collect_column!(values, BigInt)),
        FieldType::TinyIntUnsigned => {
            ColumnView::from_unsigned_tiny_ints(collect_column!(values, UTinyInt))
        }
        FieldType::SmallIntUnsigned => {
            ColumnView::from_unsigned_small_ints(collect_column!(values, USmallInt))
        }
        FieldType::IntUnsigned => ColumnView::from_unsigned_ints(collect_column!(values, UInt)),
        FieldType::BigIntUnsigned => {
            ColumnView::from_unsigned_big_ints(collect_column!(values, UBigInt))
        }
        FieldType::Float => ColumnView::from_floats(collect_column!(values, Float)),
        FieldType::Double => ColumnView::from_doubles(collect_column!(values, Double)),
        FieldType::Timestamp => {
            ColumnView::from_millis_timestamp(collect_column!(values, Timestamp))
        }
        FieldType::VarChar => {
            let values = collect_column!(values, VarChar);
            ColumnView::from_varchar::<String, Option<String>, _, _>(values)
        }
        FieldType::NChar => {
            let values = collect_column!(values, NChar);
            ColumnView::from_nchar::<String, Option<String>, _, _>(values)
        }
        // JSON is only valid as a tag, which is never bound; send it as text
        FieldType::Json => {
            let values = collect_column!(values, Json);
            ColumnView::from_nchar::<String, Option<String>, _, _>(values)
        }
        FieldType::VarBinary => {
            let values = collect_column!(values, VarBinary);
            ColumnView::from_bytes::<Vec<u8>, Option<Vec<u8>>, _, _>(values)
        }
        FieldType::Geometry => {
            let values = collect_column!(values, Geometry);
            ColumnView::from_bytes::<Vec<u8>, Option<Vec<u8>>, _, _>(values)
        }
    };
    tracing::trace!(column = col, ty = %ty, rows = view.len(), "Bound column");
    Ok(view)
}
