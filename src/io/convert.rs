//! Arrow to [`Value`] conversion.

use crate::value::{RowRecord, Value};
use anyhow::{Context, Result, bail};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Decimal128Type, Float32Type, Float64Type, Int8Type,
    Int16Type, Int32Type, Int64Type, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt8Type,
    UInt16Type, UInt32Type, UInt64Type,
};
use arrow::record_batch::RecordBatch;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// A batch with dictionary columns unpacked, ready for row access.
#[derive(Debug, Clone)]
pub struct RowBatch {
    names: Vec<String>,
    columns: Vec<ArrayRef>,
    num_rows: usize,
}

impl RowBatch {
    /// # Errors
    /// Returns an error if a dictionary column cannot be unpacked.
    pub fn try_new(batch: &RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let mut names = Vec::with_capacity(batch.num_columns());
        let mut columns = Vec::with_capacity(batch.num_columns());
        for (field, column) in schema.fields().iter().zip(batch.columns()) {
            let column = match column.data_type() {
                DataType::Dictionary(_, value_type) => cast(column, value_type)
                    .with_context(|| format!("unpack dictionary column `{}`", field.name()))?,
                _ => ArrayRef::clone(column),
            };
            names.push(field.name().clone());
            columns.push(column);
        }
        Ok(Self {
            names,
            columns,
            num_rows: batch.num_rows(),
        })
    }

    #[must_use]
    pub const fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Build the record for `row`.
    ///
    /// # Errors
    /// Returns an error if a column has a type without a [`Value`] mapping.
    pub fn row(&self, row: usize) -> Result<RowRecord> {
        let mut record = RowRecord::with_capacity(self.columns.len());
        for (name, column) in self.names.iter().zip(&self.columns) {
            let value = value_at(column.as_ref(), row)
                .with_context(|| format!("column `{name}` row {row}"))?;
            record.push(name.clone(), value);
        }
        Ok(record)
    }
}

fn timestamp_micros(unit: TimeUnit, raw: i64) -> i64 {
    match unit {
        TimeUnit::Second => raw.saturating_mul(1_000_000),
        TimeUnit::Millisecond => raw.saturating_mul(1_000),
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    }
}

/// Read one cell of `array` as a [`Value`].
///
/// # Errors
/// Returns an error for Arrow types that have no [`Value`] counterpart, or
/// unsigned 64-bit values that do not fit an `i64`.
pub fn value_at(array: &dyn Array, row: usize) -> Result<Value> {
    if array.is_null(row) {
        return Ok(Value::Null);
    }
    let value = match array.data_type() {
        DataType::Null => Value::Null,
        DataType::Boolean => Value::Boolean(array.as_boolean().value(row)),
        DataType::Int8 => Value::Int(i32::from(array.as_primitive::<Int8Type>().value(row))),
        DataType::Int16 => Value::Int(i32::from(array.as_primitive::<Int16Type>().value(row))),
        DataType::Int32 => Value::Int(array.as_primitive::<Int32Type>().value(row)),
        DataType::Int64 => Value::Long(array.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => Value::Int(i32::from(array.as_primitive::<UInt8Type>().value(row))),
        DataType::UInt16 => {
            Value::Int(i32::from(array.as_primitive::<UInt16Type>().value(row)))
        }
        DataType::UInt32 => {
            Value::Long(i64::from(array.as_primitive::<UInt32Type>().value(row)))
        }
        DataType::UInt64 => {
            let v = array.as_primitive::<UInt64Type>().value(row);
            Value::Long(i64::try_from(v).with_context(|| format!("{v} overflows i64"))?)
        }
        DataType::Float32 => Value::Float(array.as_primitive::<Float32Type>().value(row)),
        DataType::Float64 => Value::Double(array.as_primitive::<Float64Type>().value(row)),
        DataType::Utf8 => Value::String(array.as_string::<i32>().value(row).to_owned()),
        DataType::LargeUtf8 => Value::String(array.as_string::<i64>().value(row).to_owned()),
        DataType::Utf8View => Value::String(array.as_string_view().value(row).to_owned()),
        DataType::Binary => Value::Binary(array.as_binary::<i32>().value(row).to_vec()),
        DataType::LargeBinary => Value::Binary(array.as_binary::<i64>().value(row).to_vec()),
        DataType::BinaryView => Value::Binary(array.as_binary_view().value(row).to_vec()),
        DataType::FixedSizeBinary(_) => {
            Value::Binary(array.as_fixed_size_binary().value(row).to_vec())
        }
        DataType::Date32 => Value::Date(array.as_primitive::<Date32Type>().value(row)),
        DataType::Date64 => {
            let millis = array.as_primitive::<Date64Type>().value(row);
            let days = i32::try_from(millis.div_euclid(MILLIS_PER_DAY))
                .with_context(|| format!("date64 {millis} out of range"))?;
            Value::Date(days)
        }
        DataType::Timestamp(unit, _) => {
            let raw = match unit {
                TimeUnit::Second => array.as_primitive::<TimestampSecondType>().value(row),
                TimeUnit::Millisecond => {
                    array.as_primitive::<TimestampMillisecondType>().value(row)
                }
                TimeUnit::Microsecond => {
                    array.as_primitive::<TimestampMicrosecondType>().value(row)
                }
                TimeUnit::Nanosecond => array.as_primitive::<TimestampNanosecondType>().value(row),
            };
            Value::Timestamp(timestamp_micros(*unit, raw))
        }
        DataType::Decimal128(_, scale) => Value::Decimal {
            unscaled: array.as_primitive::<Decimal128Type>().value(row),
            scale: *scale,
        },
        DataType::List(_) => list_values(&array.as_list::<i32>().value(row))?,
        DataType::LargeList(_) => list_values(&array.as_list::<i64>().value(row))?,
        DataType::FixedSizeList(_, _) => list_values(&array.as_fixed_size_list().value(row))?,
        DataType::Struct(fields) => {
            let s = array.as_struct();
            let mut record = RowRecord::with_capacity(fields.len());
            for (field, child) in fields.iter().zip(s.columns()) {
                record.push(field.name().clone(), value_at(child.as_ref(), row)?);
            }
            Value::Record(record)
        }
        DataType::Map(_, _) => {
            let entries = array.as_map().value(row);
            let keys = entries.column(0);
            let values = entries.column(1);
            let mut items = Vec::with_capacity(entries.len());
            for i in 0..entries.len() {
                let mut pair = RowRecord::with_capacity(2);
                pair.push("key", value_at(keys.as_ref(), i)?);
                pair.push("value", value_at(values.as_ref(), i)?);
                items.push(Value::Record(pair));
            }
            Value::List(items)
        }
        DataType::Dictionary(_, value_type) => {
            let unpacked = cast(&array.slice(row, 1), value_type)?;
            value_at(unpacked.as_ref(), 0)?
        }
        other => bail!("unsupported column type {other}"),
    };
    Ok(value)
}

fn list_values(items: &ArrayRef) -> Result<Value> {
    (0..items.len())
        .map(|i| value_at(items.as_ref(), i))
        .collect::<Result<Vec<_>>>()
        .map(Value::List)
}
