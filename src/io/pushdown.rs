//! Residual filters evaluated by the Parquet reader.
//!
//! [`compile_row_filter`] turns a [`Filter`] into a Parquet [`RowFilter`]
//! whose predicate only decodes the referenced columns. Rows for which the
//! predicate is false or null are never materialized.

use crate::filter::{CompareOp, Filter};
use crate::value::Value;
use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Date32Array, Decimal128Array, Float32Array,
    Float64Array, Int32Array, Int64Array, Scalar, StringArray, TimestampMicrosecondArray,
    new_null_array,
};
use arrow::compute::kernels::boolean::{and_kleene, is_not_null, is_null, not, or_kleene};
use arrow::compute::kernels::cmp;
use arrow::compute::{CastOptions, cast_with_options, prep_null_mask_filter};
use arrow::datatypes::{DataType, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::{ArrowPredicate, ArrowPredicateFn, RowFilter};
use parquet::schema::types::SchemaDescriptor;
use std::sync::Arc;

/// Compile `filter` against a file's schemas.
///
/// # Errors
/// Returns an error if the filter references a column missing from the file,
/// a nested column, or a literal that cannot be cast to its column's type.
pub fn compile_row_filter(
    filter: &Filter,
    arrow_schema: &Schema,
    parquet_schema: &SchemaDescriptor,
) -> Result<RowFilter> {
    let mut roots = Vec::new();
    for column in filter.columns() {
        if column.contains('.') {
            bail!("nested column `{column}` cannot be pushed down");
        }
        let (idx, field) = arrow_schema
            .column_with_name(column)
            .with_context(|| format!("column `{column}` not found in file"))?;
        check_literals(filter, column, field.data_type())?;
        roots.push(idx);
    }
    let mask = ProjectionMask::roots(parquet_schema, roots);
    let filter = filter.clone();
    let predicate = ArrowPredicateFn::new(mask, move |batch: RecordBatch| {
        evaluate(&filter, &batch).map(|selected| null_as_false(&selected))
    });
    let predicates: Vec<Box<dyn ArrowPredicate>> = vec![Box::new(predicate)];
    Ok(RowFilter::new(predicates))
}

/// Map null (unknown) results to false. Arrays without a null buffer, such
/// as the result of a predicate on a non-nullable column, pass through as is.
fn null_as_false(selected: &BooleanArray) -> BooleanArray {
    if selected.null_count() == 0 {
        selected.clone()
    } else {
        prep_null_mask_filter(selected)
    }
}

/// Reject literals that can never compare against `data_type`.
fn check_literals(filter: &Filter, column: &str, data_type: &DataType) -> Result<()> {
    let mut result = Ok(());
    visit_literals(filter, column, &mut |value| {
        if result.is_ok() {
            result = literal_array(value, data_type)
                .map(|_| ())
                .with_context(|| format!("literal {value} does not fit column `{column}`"));
        }
    });
    result
}

fn visit_literals(filter: &Filter, column: &str, f: &mut impl FnMut(&Value)) {
    match filter {
        Filter::Compare { column: c, value, .. } if c == column => f(value),
        Filter::In { column: c, values } if c == column => values.iter().for_each(&mut *f),
        Filter::And(a, b) | Filter::Or(a, b) => {
            visit_literals(a, column, f);
            visit_literals(b, column, f);
        }
        Filter::Not(inner) => visit_literals(inner, column, f),
        _ => {}
    }
}

/// One-element array holding `value`, cast to `data_type`. Casts are strict:
/// a literal that does not convert is an error rather than a null.
fn literal_array(value: &Value, data_type: &DataType) -> Result<ArrayRef, ArrowError> {
    let raw: ArrayRef = match value {
        Value::Null => return Ok(new_null_array(data_type, 1)),
        Value::Boolean(v) => Arc::new(BooleanArray::from(vec![*v])),
        Value::Int(v) => Arc::new(Int32Array::from(vec![*v])),
        Value::Long(v) => Arc::new(Int64Array::from(vec![*v])),
        Value::Float(v) => Arc::new(Float32Array::from(vec![*v])),
        Value::Double(v) => Arc::new(Float64Array::from(vec![*v])),
        Value::String(v) => Arc::new(StringArray::from(vec![v.as_str()])),
        Value::Binary(v) => Arc::new(BinaryArray::from_vec(vec![v.as_slice()])),
        Value::Date(v) => Arc::new(Date32Array::from(vec![*v])),
        Value::Timestamp(v) => Arc::new(TimestampMicrosecondArray::from(vec![*v])),
        Value::Decimal { unscaled, scale } => Arc::new(
            Decimal128Array::from(vec![*unscaled]).with_precision_and_scale(38, *scale)?,
        ),
        Value::List(_) | Value::Record(_) => {
            return Err(ArrowError::NotYetImplemented(format!(
                "nested literal {value} in filter"
            )));
        }
    };
    if raw.data_type() == data_type {
        return Ok(raw);
    }
    let strict = CastOptions {
        safe: false,
        ..CastOptions::default()
    };
    cast_with_options(&raw, data_type, &strict)
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef, ArrowError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ArrowError::SchemaError(format!("column `{name}` missing from batch")))
}

fn compare(array: &ArrayRef, op: CompareOp, value: &Value) -> Result<BooleanArray, ArrowError> {
    let literal = Scalar::new(literal_array(value, array.data_type())?);
    match op {
        CompareOp::Eq => cmp::eq(array, &literal),
        CompareOp::NotEq => cmp::neq(array, &literal),
        CompareOp::Lt => cmp::lt(array, &literal),
        CompareOp::LtEq => cmp::lt_eq(array, &literal),
        CompareOp::Gt => cmp::gt(array, &literal),
        CompareOp::GtEq => cmp::gt_eq(array, &literal),
    }
}

/// Evaluate `filter` over `batch`; null means "unknown".
fn evaluate(filter: &Filter, batch: &RecordBatch) -> Result<BooleanArray, ArrowError> {
    match filter {
        Filter::Noop => Ok(BooleanArray::from(vec![true; batch.num_rows()])),
        Filter::Literal(v) => Ok(BooleanArray::from(vec![*v; batch.num_rows()])),
        Filter::Compare { column: name, op, value } => compare(column(batch, name)?, *op, value),
        Filter::In { column: name, values } => {
            let array = column(batch, name)?;
            let mut acc = BooleanArray::from(vec![false; batch.num_rows()]);
            for value in values {
                acc = or_kleene(&acc, &compare(array, CompareOp::Eq, value)?)?;
            }
            Ok(acc)
        }
        Filter::IsNull(name) => is_null(column(batch, name)?.as_ref()),
        Filter::IsNotNull(name) => is_not_null(column(batch, name)?.as_ref()),
        Filter::And(a, b) => and_kleene(&evaluate(a, batch)?, &evaluate(b, batch)?),
        Filter::Or(a, b) => or_kleene(&evaluate(a, batch)?, &evaluate(b, batch)?),
        Filter::Not(inner) => not(&evaluate(inner, batch)?),
    }
}
